//!
//! # 配置模块
//!
//! 包含密钥环使用的配置结构：导出缓冲区与敏感缓冲池的调优参数，
//! 以及用于构建静态数据源的密钥定义。
//!
use crate::error::{KeyError, Result};
use crate::keys::KeyMetadata;
use serde::{Deserialize, Serialize};

/// PKCS8 导出配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    /// 第一次尝试导出时租用的缓冲区大小（字节），空间不足时翻倍
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,
}

fn default_initial_buffer_size() -> usize {
    4096
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: default_initial_buffer_size(),
        }
    }
}

/// 敏感缓冲池配置
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// 归还后最多保留多少个缓冲区以供复用
    #[serde(default = "default_max_retained_buffers")]
    pub max_retained_buffers: usize,
    /// 超过此长度的缓冲区在归还时直接释放（清零后）
    #[serde(default = "default_max_retained_len")]
    pub max_retained_len: usize,
}

fn default_max_retained_buffers() -> usize {
    8
}

fn default_max_retained_len() -> usize {
    1 << 20
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retained_buffers: default_max_retained_buffers(),
            max_retained_len: default_max_retained_len(),
        }
    }
}

/// 完整配置，代表了密钥环的所有可配置项。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct KeyringConfig {
    /// 导出配置
    #[serde(default)]
    pub export: ExportConfig,
    /// 缓冲池配置
    #[serde(default)]
    pub pool: PoolConfig,
}

impl KeyringConfig {
    /// 从 JSON 文本解析配置，缺省字段使用默认值。
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The key material carried by a [`KeyDefinition`].
///
/// 密钥定义所携带的密钥材料。
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaterialConfig {
    /// PEM text holding exactly one private key.
    Pem { pem: String },
    /// Standard base64 encoding of raw symmetric key bytes.
    Symmetric { base64: String },
    /// No key material at all.
    Empty,
}

// 不打印密钥材料本身
impl std::fmt::Debug for MaterialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaterialConfig::Pem { .. } => f.write_str("Pem { .. }"),
            MaterialConfig::Symmetric { .. } => f.write_str("Symmetric { .. }"),
            MaterialConfig::Empty => f.write_str("Empty"),
        }
    }
}

/// One statically configured key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyDefinition {
    #[serde(flatten)]
    pub metadata: KeyMetadata,
    pub material: MaterialConfig,
}

/// A static set of key definitions, typically loaded from application config.
///
/// 一组静态密钥定义，通常来自应用配置。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeySetConfig {
    #[serde(default)]
    pub keys: Vec<KeyDefinition>,
}

impl KeySetConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(KeyError::from)
    }
}
