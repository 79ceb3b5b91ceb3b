//! Secret key entities.
//!
//! [`SecretKey`] is a closed sum over the supported key variants. Every
//! variant owns exactly one [`SecureMaterial`](crate::material::SecureMaterial)
//! (zero bytes for [`EmptySecretKey`]) plus one [`KeyMetadata`].
//!
//! Once a key is released every accessor returns [`KeyError::Released`].
//!
//! 中文: 密钥实体。`SecretKey` 是对所有受支持密钥种类的封闭枚举，
//! 每个变体持有一块安全内存和一份元数据；释放后所有访问器都返回 `Released` 错误。

pub mod asymmetric;
pub mod certificate;
pub mod empty;
pub mod metadata;
pub mod symmetric;

pub use asymmetric::{EccSecretKey, RsaSecretKey};
pub use certificate::{Certificate, CertificateKeyAlgorithm, NativeKey};
pub use empty::EmptySecretKey;
pub use metadata::KeyMetadata;
pub use symmetric::SymmetricSecretKey;

use crate::error::{KeyError, Result};
use crate::material::SecureMaterial;
use chrono::{DateTime, Utc};

/// The variant of a [`SecretKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Symmetric,
    Rsa,
    Ecc,
    Empty,
}

/// A secret key: key material plus metadata.
#[derive(Debug)]
pub enum SecretKey {
    Symmetric(SymmetricSecretKey),
    Rsa(RsaSecretKey),
    Ecc(EccSecretKey),
    Empty(EmptySecretKey),
}

impl SecretKey {
    fn parts(&self) -> (&SecureMaterial, &KeyMetadata) {
        match self {
            SecretKey::Symmetric(key) => (key.material(), key.metadata()),
            SecretKey::Rsa(key) => (key.core().material(), key.core().metadata()),
            SecretKey::Ecc(key) => (key.core().material(), key.core().metadata()),
            SecretKey::Empty(key) => (key.material(), key.metadata()),
        }
    }

    fn material(&self) -> &SecureMaterial {
        self.parts().0
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            SecretKey::Symmetric(_) => KeyKind::Symmetric,
            SecretKey::Rsa(_) => KeyKind::Rsa,
            SecretKey::Ecc(_) => KeyKind::Ecc,
            SecretKey::Empty(_) => KeyKind::Empty,
        }
    }

    pub fn metadata(&self) -> Result<&KeyMetadata> {
        let (material, metadata) = self.parts();
        if material.is_released() {
            return Err(KeyError::Released);
        }
        Ok(metadata)
    }

    /// Metadata regardless of release state.
    ///
    /// Metadata never changes and holds no key bytes, so collections may
    /// order and index keys that were released by their owner.
    pub(crate) fn metadata_unchecked(&self) -> &KeyMetadata {
        self.parts().1
    }

    pub fn key_id(&self) -> Result<Option<&str>> {
        self.metadata().map(|meta| meta.key_id.as_deref())
    }

    pub fn expires_when(&self) -> Result<Option<DateTime<Utc>>> {
        self.metadata().map(|meta| meta.expires_when)
    }

    pub fn key_size_bits(&self) -> Result<usize> {
        match self {
            SecretKey::Symmetric(key) => key.key_size_bits(),
            SecretKey::Rsa(key) => key.key_size_bits(),
            SecretKey::Ecc(key) => key.key_size_bits(),
            SecretKey::Empty(key) => key.material().len().map(|_| 0),
        }
    }

    pub fn key_size_bytes(&self) -> Result<usize> {
        match self {
            SecretKey::Symmetric(key) => key.key_size_bytes(),
            _ => self.key_size_bits().map(|bits| bits.div_ceil(8)),
        }
    }

    /// The public-only certificate the key was created from, if any.
    pub fn export_certificate(&self) -> Result<Option<Certificate>> {
        match self {
            SecretKey::Rsa(key) => key.export_certificate(),
            SecretKey::Ecc(key) => key.export_certificate(),
            SecretKey::Symmetric(_) | SecretKey::Empty(_) => self.metadata().map(|_| None),
        }
    }

    /// Zeroes the key material. Idempotent.
    pub fn release(&self) {
        self.material().release();
    }

    pub fn is_released(&self) -> bool {
        self.material().is_released()
    }

    pub fn as_symmetric(&self) -> Option<&SymmetricSecretKey> {
        match self {
            SecretKey::Symmetric(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_rsa(&self) -> Option<&RsaSecretKey> {
        match self {
            SecretKey::Rsa(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_ecc(&self) -> Option<&EccSecretKey> {
        match self {
            SecretKey::Ecc(key) => Some(key),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn backing_bytes(&self) -> Vec<u8> {
        self.material().backing_bytes()
    }
}

impl From<SymmetricSecretKey> for SecretKey {
    fn from(key: SymmetricSecretKey) -> Self {
        SecretKey::Symmetric(key)
    }
}

impl From<RsaSecretKey> for SecretKey {
    fn from(key: RsaSecretKey) -> Self {
        SecretKey::Rsa(key)
    }
}

impl From<EccSecretKey> for SecretKey {
    fn from(key: EccSecretKey) -> Self {
        SecretKey::Ecc(key)
    }
}

impl From<EmptySecretKey> for SecretKey {
    fn from(key: EmptySecretKey) -> Self {
        SecretKey::Empty(key)
    }
}
