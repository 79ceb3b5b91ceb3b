//!
//! 集成测试的通用辅助函数
//!
#![allow(dead_code)]

use chrono::{Duration, Utc};
use seal_keyring::keys::{KeyMetadata, SecretKey, SymmetricSecretKey};
use std::sync::Arc;

pub const RSA_KEY: &str = include_str!("data/rsa_key.pem");
pub const RSA_CERT: &str = include_str!("data/rsa_cert.pem");
pub const EC_KEY: &str = include_str!("data/ec_key.pem");
pub const EC_KEY_SEC1: &str = include_str!("data/ec_key_sec1.pem");
pub const EC_CERT: &str = include_str!("data/ec_cert.pem");
pub const EC_KEY_ENCRYPTED: &str = include_str!("data/ec_key_encrypted.pem");

/// 生成一个对称密钥，`days` 为相对当前时间的过期天数，`None` 表示永不过期
pub fn symmetric(id: &str, days: Option<i64>) -> Arc<SecretKey> {
    let mut metadata = KeyMetadata::new().with_key_id(id);
    metadata.expires_when = days.map(|d| Utc::now() + Duration::days(d));
    Arc::new(SymmetricSecretKey::new(id.as_bytes(), metadata).into())
}

/// 集合中各密钥的 key_id，按迭代顺序
pub fn ids<'a>(keys: impl IntoIterator<Item = &'a Arc<SecretKey>>) -> Vec<String> {
    keys.into_iter()
        .map(|k| k.key_id().unwrap().unwrap_or_default().to_string())
        .collect()
}
