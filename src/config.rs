//! JSON 配置加载.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::format::{ParseOptions, SampleFilterConfig};
use crate::logging::LoggingConfig;

/// 顶层配置, 每一节都可省略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VidmapConfig {
    pub logging: LoggingConfig,
    pub sample_filter: SampleFilterConfig,
    pub parse: ParseOptions,
}

impl VidmapConfig {
    /// 从 JSON 字符串解析
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("解析配置 JSON 失败")
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
    }
}
