//! CLI command handling

pub mod output;
pub mod pending;
pub mod run;
pub mod send;
pub mod status;

pub use output::*;
pub use pending::*;
pub use run::*;
pub use send::*;
pub use status::*;

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::relay::{
    AppLabels, DeliveryClient, DiscordWebhook, InstalledApps, JsonFileStore, LogOnlyTransport,
    MemoryStore, PersistentStore, RecoveryCoordinator, RelayService, RetryPolicy, WebhookTransport,
};

/// 组装好的中继组件
pub struct RelayStack {
    pub store: Arc<dyn PersistentStore>,
    pub delivery: DeliveryClient,
    pub service: RelayService,
    pub recovery: RecoveryCoordinator,
}

impl RelayStack {
    /// 根据配置组装；dry-run 时不发网络请求、不写状态文件
    pub fn from_config(config: &RelayConfig, dry_run: bool) -> Result<Self> {
        if dry_run {
            return Ok(Self::new(config, Arc::new(LogOnlyTransport), Arc::new(MemoryStore::new())));
        }

        config.validate()?;
        let transport = DiscordWebhook::new(&config.webhook_url, &config.username, config.timeout())
            .map_err(|e| anyhow!(e))?;
        let store = JsonFileStore::in_dir(&config.data_dir);

        Ok(Self::new(config, Arc::new(transport), Arc::new(store)))
    }

    /// 用指定的传输和存储组装
    pub fn new(
        config: &RelayConfig,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let policy = RetryPolicy::default().with_attempt_timeout(config.timeout());
        let delivery = DeliveryClient::new(transport, store.clone()).with_policy(policy);

        let labels = AppLabels::new(Box::new(InstalledApps::new(config.installed_apps.clone())))
            .with_overrides(config.app_name_overrides.clone());
        let service = RelayService::new(labels, delivery.clone(), store.clone())
            .with_ignored_labels(config.ignored_labels.iter().cloned());
        let recovery = RecoveryCoordinator::new(delivery.clone(), store.clone());

        Self {
            store,
            delivery,
            service,
            recovery,
        }
    }
}
