//! Trust Relay - 把设备通知转发到聊天 webhook，带去重、重试和断网恢复

pub mod cli;
pub mod config;
pub mod relay;

pub use config::RelayConfig;
pub use relay::{
    AppLabels, CanonicalMessage, ConnectivityTransition, DeduplicationGate, DeliveryClient,
    DeliveryOutcome, EventOutcome, JsonFileStore, MemoryStore, MessageFormatter, PersistentStore,
    RawEvent, RecoveryCoordinator, RelayService, RetryPolicy, WebhookTransport,
};
