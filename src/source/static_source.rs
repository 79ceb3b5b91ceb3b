use crate::config::{KeySetConfig, MaterialConfig};
use crate::error::{KeyError, Result};
use crate::keys::{EmptySecretKey, SecretKey};
use crate::pem::PemReader;
use crate::pool::BufferPool;
use crate::signal::ChangeSignal;
use crate::source::{DataSource, KeySet};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 固定密钥集的数据源：信号永不触发，拥有其密钥，释放时一并释放。
#[derive(Debug)]
pub struct StaticDataSource {
    keys: KeySet,
    released: AtomicBool,
}

impl StaticDataSource {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = SecretKey>,
    {
        Self::from_shared(keys.into_iter().map(Arc::new))
    }

    /// Builds a source from keys that may also be referenced elsewhere.
    pub fn from_shared<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Arc<SecretKey>>,
    {
        Self {
            keys: Arc::new(keys.into_iter().collect()),
            released: AtomicBool::new(false),
        }
    }

    /// 按配置构建每个密钥，PEM 材料经 `reader` 解析。
    ///
    /// 任何一个定义失败都会使整体失败，已构建的密钥随之析构清零。
    pub fn from_config(config: &KeySetConfig, reader: &PemReader) -> Result<Self> {
        let mut keys = Vec::with_capacity(config.keys.len());
        for definition in &config.keys {
            let metadata = definition.metadata.clone();
            let key = match &definition.material {
                MaterialConfig::Pem { pem } => reader.read_secret_key(pem.as_bytes(), metadata)?,
                MaterialConfig::Symmetric { base64 } => {
                    let pool = reader.factory().pool();
                    symmetric_from_base64(pool, base64, |bytes| {
                        SecretKey::from(reader.factory().create_symmetric(bytes, metadata))
                    })?
                }
                MaterialConfig::Empty => EmptySecretKey::new(metadata).into(),
            };
            keys.push(key);
        }
        tracing::debug!(count = keys.len(), "static data source built from config");
        Ok(Self::new(keys))
    }
}

/// Decodes `encoded` into a pooled scratch buffer and hands the bytes to `f`.
///
/// The buffer is zeroed when this returns, whether decoding succeeded or not.
fn symmetric_from_base64<R>(
    pool: &Arc<BufferPool>,
    encoded: &str,
    f: impl FnOnce(&[u8]) -> R,
) -> Result<R> {
    let mut buffer = pool.rent(base64::decoded_len_estimate(encoded.len()));
    let written = STANDARD.decode_slice(encoded, &mut buffer)?;
    Ok(f(&buffer[..written]))
}

impl DataSource for StaticDataSource {
    fn secret_keys(&self) -> Result<KeySet> {
        if self.released.load(Ordering::Acquire) {
            return Err(KeyError::Released);
        }
        Ok(Arc::clone(&self.keys))
    }

    fn change_signal(&self) -> Result<ChangeSignal> {
        if self.released.load(Ordering::Acquire) {
            return Err(KeyError::Released);
        }
        Ok(ChangeSignal::never())
    }

    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        for key in self.keys.iter() {
            key.release();
        }
    }
}
