use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 密钥元数据：标识符、预期用途、预期算法与过期时间。
///
/// 附加到密钥后不可变。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// 用于查找的密钥标识符
    #[serde(default, rename = "kid", skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// 预期用途，例如 "sig" 或 "enc"
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// 预期算法，例如 "RS256"
    #[serde(default, rename = "alg", skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// 过期时间，`None` 表示永不过期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_when: Option<DateTime<Utc>>,
}

impl KeyMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_use(mut self, key_use: impl Into<String>) -> Self {
        self.key_use = Some(key_use.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_expires_when(mut self, expires_when: DateTime<Utc>) -> Self {
        self.expires_when = Some(expires_when);
        self
    }

    /// 用于排序的过期时间，缺省视为最大时间戳。
    pub fn effective_expiration(&self) -> DateTime<Utc> {
        self.expires_when.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 非空的密钥标识符。空字符串与缺省同样处理。
    pub fn lookup_id(&self) -> Option<&str> {
        self.key_id.as_deref().filter(|id| !id.is_empty())
    }
}
