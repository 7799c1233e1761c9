//! 应用名解析 - 包名 → 可读名称
//!
//! 解析链：平台解析器 → 静态覆盖表 → 原始包名。任何失败都不会中断流程。

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tracing::warn;

/// 平台无法给出名称时使用的覆盖表
pub const DEFAULT_APP_NAME_OVERRIDES: &[(&str, &str)] = &[
    ("com.google.android.gm", "Gmail"),
    ("com.kakao.talk", "카카오톡"),
    ("com.google.android.youtube", "YouTube"),
    ("com.discord", "Discord"),
    ("viva.republica.toss", "Toss"),
];

/// 平台应用名解析器（由宿主实现）
pub trait LabelResolver: Send + Sync {
    fn resolve(&self, package_id: &str) -> Result<String>;
}

/// 基于已安装应用表的解析器
#[derive(Debug, Clone, Default)]
pub struct InstalledApps {
    labels: HashMap<String, String>,
}

impl InstalledApps {
    pub fn new(labels: HashMap<String, String>) -> Self {
        Self { labels }
    }
}

impl LabelResolver for InstalledApps {
    fn resolve(&self, package_id: &str) -> Result<String> {
        self.labels
            .get(package_id)
            .cloned()
            .ok_or_else(|| anyhow!("package not installed: {}", package_id))
    }
}

/// 带兜底的应用名解析
pub struct AppLabels {
    resolver: Box<dyn LabelResolver>,
    overrides: HashMap<String, String>,
}

impl AppLabels {
    /// 使用内置覆盖表
    pub fn new(resolver: Box<dyn LabelResolver>) -> Self {
        let overrides = DEFAULT_APP_NAME_OVERRIDES
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { resolver, overrides }
    }

    /// 追加（或替换）覆盖表条目
    pub fn with_overrides(mut self, extra: HashMap<String, String>) -> Self {
        self.overrides.extend(extra);
        self
    }

    /// 解析应用名，永不失败
    pub fn resolve_label(&self, package_id: &str) -> String {
        match self.resolver.resolve(package_id) {
            Ok(label) if !label.trim().is_empty() => label,
            Ok(_) => {
                warn!(package_id = %package_id, "App label is blank, using package id");
                package_id.to_string()
            }
            Err(e) => match self.overrides.get(package_id) {
                Some(fallback) => {
                    warn!(package_id = %package_id, label = %fallback, "Using app name override");
                    fallback.clone()
                }
                None => {
                    warn!(package_id = %package_id, error = %e, "Failed to resolve app label");
                    package_id.to_string()
                }
            },
        }
    }
}
