use crate::error::{KeyError, Result};
use crate::keys::metadata::KeyMetadata;
use crate::material::SecureMaterial;
use secrecy::{ExposeSecret, SecretString};

/// 对称密钥，原始字节保存在安全内存中。
#[derive(Debug)]
pub struct SymmetricSecretKey {
    material: SecureMaterial,
    metadata: KeyMetadata,
}

impl SymmetricSecretKey {
    /// 复制 `key` 到新分配的安全内存中，不会别名调用方的缓冲区。
    pub fn new(key: &[u8], metadata: KeyMetadata) -> Self {
        Self {
            material: SecureMaterial::copy_from(key),
            metadata,
        }
    }

    /// 以密码的 UTF-8 编码作为密钥字节。
    ///
    /// 目标缓冲区按编码后的字节数一次性精确分配。
    pub fn from_password(password: &SecretString, metadata: KeyMetadata) -> Self {
        let encoded = password.expose_secret().as_bytes();
        Self {
            material: SecureMaterial::copy_from(encoded),
            metadata,
        }
    }

    pub(crate) fn material(&self) -> &SecureMaterial {
        &self.material
    }

    pub(crate) fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    /// 在闭包内访问原始密钥字节。
    pub fn expose_key<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.material.expose(f)
    }

    pub fn key_size_bytes(&self) -> Result<usize> {
        self.material.len()
    }

    pub fn key_size_bits(&self) -> Result<usize> {
        self.key_size_bytes()
            .and_then(|bytes| bytes.checked_mul(8).ok_or_else(|| KeyError::malformed("key too large")))
    }
}
