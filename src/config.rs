//! 配置 - `~/.config/trust-relay/config.json`
//!
//! 所有字段都有默认值，配置文件不存在时使用默认配置。
//! 环境变量 `TRUST_WEBHOOK_URL` 覆盖文件中的 `webhook_url`。

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::relay::service::DEFAULT_IGNORED_LABELS;

/// webhook 地址环境变量
pub const WEBHOOK_URL_ENV: &str = "TRUST_WEBHOOK_URL";

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("trust-relay")
}

/// 中继配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 投递目标 webhook
    pub webhook_url: String,
    /// webhook 中显示的 bot 名
    pub username: String,
    /// 单次投递超时（秒）
    pub timeout_secs: u64,
    /// 状态文件目录
    pub data_dir: PathBuf,
    /// 忽略的发送方名称
    pub ignored_labels: Vec<String>,
    /// 追加到内置覆盖表的包名 → 应用名
    pub app_name_overrides: HashMap<String, String>,
    /// 已安装应用的包名 → 应用名
    pub installed_apps: HashMap<String, String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            username: "TrustBot".to_string(),
            timeout_secs: 10,
            data_dir: default_config_dir(),
            ignored_labels: DEFAULT_IGNORED_LABELS.iter().map(|s| s.to_string()).collect(),
            app_name_overrides: HashMap::new(),
            installed_apps: HashMap::new(),
        }
    }
}

impl RelayConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.json")
    }

    /// 加载配置（文件 + 环境变量）
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = Self::from_file(&path)?;

        if let Ok(url) = std::env::var(WEBHOOK_URL_ENV) {
            if !url.trim().is_empty() {
                debug!("Using webhook url from {}", WEBHOOK_URL_ENV);
                config.webhook_url = url;
            }
        }

        Ok(config)
    }

    /// 只从文件加载，文件不存在时返回默认配置
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// 投递前的校验
    pub fn validate(&self) -> Result<()> {
        let url = self.webhook_url.trim();
        if url.is_empty() {
            bail!(
                "webhook_url is not configured. Set it in {} or via {}",
                Self::default_path().display(),
                WEBHOOK_URL_ENV
            );
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            bail!("webhook_url must be an http(s) URL: {}", url);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
