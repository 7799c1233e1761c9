//! 通知中继 - 把设备通知转发到聊天 webhook
//!
//! # 数据流
//! ```text
//! 事件源 → RelayService → MessageFormatter → DeduplicationGate → DeliveryClient → webhook
//! 连通性监视 → RecoveryCoordinator → DeliveryClient（重发）/ PersistentStore（读取、清空待重发）
//! ```
//!
//! # 使用示例
//! ```ignore
//! use std::sync::Arc;
//! use trust_relay::relay::*;
//!
//! let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
//! let delivery = DeliveryClient::new(Arc::new(LogOnlyTransport), store.clone());
//! let labels = AppLabels::new(Box::new(InstalledApps::default()));
//! let service = RelayService::new(labels, delivery.clone(), store.clone());
//!
//! service.on_start();
//! service.on_event(&RawEvent::new("com.kakao.talk", "홍길동", vec!["안녕".into()], 0));
//! ```

pub mod event;
pub mod formatter;
pub mod deduplicator;
pub mod label;
pub mod store;
pub mod webhook;
pub mod delivery;
pub mod service;
pub mod recovery;

pub use event::{CanonicalMessage, RawEvent};
pub use formatter::{normalize_whitespace, MessageFormatter, EMPTY_PLACEHOLDER};
pub use deduplicator::DeduplicationGate;
pub use label::{AppLabels, InstalledApps, LabelResolver};
pub use store::{JsonFileStore, MemoryStore, PersistentStore};
pub use webhook::{DeliveryError, DiscordWebhook, LogOnlyTransport, TransportFuture, WebhookTransport};
pub use delivery::{DeliveryClient, DeliveryHandle, DeliveryOutcome, DeliveryRecord, RetryPolicy};
pub use service::{EventOutcome, LifecycleState, RelayService};
pub use recovery::{ConnectivityTransition, RecoveryCoordinator};
