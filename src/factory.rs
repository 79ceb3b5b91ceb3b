//! Construction of secret keys from native key handles and certificates.
//!
//! Native keys are exported as PKCS8 DER into pooled scratch buffers. The
//! first attempt uses [`ExportConfig::initial_buffer_size`]; when the buffer
//! is too small it is returned to the pool (zeroed) and the size doubles.
//!
//! 中文: 从原生密钥句柄或证书构建密钥。导出缓冲区来自缓冲池，空间不足时
//! 归还（清零）并以两倍大小重试。

use crate::config::{ExportConfig, KeyringConfig};
use crate::error::{KeyError, Result};
use crate::keys::{
    Certificate, CertificateKeyAlgorithm, EccSecretKey, KeyMetadata, NativeKey, RsaSecretKey,
    SecretKey, SymmetricSecretKey,
};
use crate::material::SecureMaterial;
use crate::pool::BufferPool;
use rsa::pkcs8::{EncodePrivateKey, SecretDocument};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use std::sync::Arc;

/// The destination buffer is too small; retry with a larger one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct InsufficientSpace;

/// Writes a PKCS8 DER encoding into a caller supplied buffer.
pub(crate) trait Pkcs8Export {
    /// Returns the number of bytes written to the front of `dest`.
    fn export_pkcs8(&self, dest: &mut [u8]) -> std::result::Result<usize, InsufficientSpace>;
}

/// 原生密钥每次导出只编码一次；文档析构时清零。
impl Pkcs8Export for SecretDocument {
    fn export_pkcs8(&self, dest: &mut [u8]) -> std::result::Result<usize, InsufficientSpace> {
        let bytes = self.as_bytes();
        let target = dest.get_mut(..bytes.len()).ok_or(InsufficientSpace)?;
        target.copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

fn encode_pkcs8(key: &impl EncodePrivateKey) -> Result<SecretDocument> {
    key.to_pkcs8_der().map_err(KeyError::import)
}

/// 密钥工厂：无内部状态，只持有缓冲池与导出配置。
#[derive(Debug, Clone)]
pub struct SecretKeyFactory {
    pool: Arc<BufferPool>,
    export: ExportConfig,
}

impl SecretKeyFactory {
    /// A factory on the process-wide buffer pool with default settings.
    pub fn new() -> Self {
        Self::with_pool(BufferPool::shared(), ExportConfig::default())
    }

    /// A factory with its own pool sized from `config`.
    pub fn with_config(config: &KeyringConfig) -> Self {
        Self::with_pool(
            Arc::new(BufferPool::new(config.pool.clone())),
            config.export.clone(),
        )
    }

    pub fn with_pool(pool: Arc<BufferPool>, export: ExportConfig) -> Self {
        Self { pool, export }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn create_rsa(&self, key: &RsaPrivateKey, metadata: KeyMetadata) -> Result<RsaSecretKey> {
        self.rsa_with_certificate(key, metadata, None)
    }

    pub fn create_ecc(&self, key: &p256::SecretKey, metadata: KeyMetadata) -> Result<EccSecretKey> {
        self.ecc_with_certificate(key, metadata, None)
    }

    pub fn create_symmetric(&self, key: &[u8], metadata: KeyMetadata) -> SymmetricSecretKey {
        SymmetricSecretKey::new(key, metadata)
    }

    pub fn create_symmetric_from_password(
        &self,
        password: &SecretString,
        metadata: KeyMetadata,
    ) -> SymmetricSecretKey {
        SymmetricSecretKey::from_password(password, metadata)
    }

    /// Creates the matching variant for any native key handle.
    pub fn create(&self, key: &NativeKey, metadata: KeyMetadata) -> Result<SecretKey> {
        match key {
            NativeKey::Rsa(key) => self.create_rsa(key, metadata).map(SecretKey::from),
            NativeKey::Ecc(key) => self.create_ecc(key, metadata).map(SecretKey::from),
        }
    }

    /// Creates a key from a certificate carrying its private key.
    ///
    /// `key_id` defaults to the certificate thumbprint and `expires_when` to
    /// its not-after time. The key keeps a public-only copy of `certificate`.
    ///
    /// # Errors
    ///
    /// * [`KeyError::Unsupported`] if the certificate key is neither RSA nor EC.
    /// * [`KeyError::Malformed`] if no private key is attached.
    /// * [`KeyError::Import`] if the private key does not belong to the certificate.
    pub fn create_from_certificate(
        &self,
        certificate: &Certificate,
        metadata: KeyMetadata,
    ) -> Result<SecretKey> {
        let algorithm = certificate.key_algorithm();
        if let CertificateKeyAlgorithm::Other(oid) = &algorithm {
            return Err(KeyError::unsupported(format!(
                "certificate key algorithm {oid} is not supported"
            )));
        }
        let private_key = certificate
            .private_key()
            .ok_or_else(|| KeyError::malformed("certificate has no private key attached"))?;
        if private_key.algorithm() != algorithm {
            return Err(KeyError::import(
                "private key algorithm does not match the certificate",
            ));
        }
        let metadata = certificate_metadata(certificate, metadata)?;

        match private_key {
            NativeKey::Rsa(key) => {
                if RsaPublicKey::from(key) != certificate.rsa_public_key()? {
                    return Err(KeyError::import("private key does not match the certificate"));
                }
                self.rsa_with_certificate(key, metadata, Some(certificate))
                    .map(SecretKey::from)
            }
            NativeKey::Ecc(key) => {
                if key.public_key() != certificate.ec_public_key()? {
                    return Err(KeyError::import("private key does not match the certificate"));
                }
                self.ecc_with_certificate(key, metadata, Some(certificate))
                    .map(SecretKey::from)
            }
        }
    }

    fn rsa_with_certificate(
        &self,
        key: &RsaPrivateKey,
        metadata: KeyMetadata,
        certificate: Option<&Certificate>,
    ) -> Result<RsaSecretKey> {
        let material = self.export(&encode_pkcs8(key)?)?;
        let key_size_bits = key.n().bits();
        Ok(RsaSecretKey::from_material(
            material,
            metadata,
            key_size_bits,
            certificate,
        ))
    }

    fn ecc_with_certificate(
        &self,
        key: &p256::SecretKey,
        metadata: KeyMetadata,
        certificate: Option<&Certificate>,
    ) -> Result<EccSecretKey> {
        let material = self.export(&encode_pkcs8(key)?)?;
        Ok(EccSecretKey::from_material(material, metadata, certificate))
    }

    /// Exports `key` into freshly allocated secure material.
    pub(crate) fn export<K>(&self, key: &K) -> Result<SecureMaterial>
    where
        K: Pkcs8Export + ?Sized,
    {
        let mut size = self.export.initial_buffer_size.max(1);
        loop {
            let mut buffer = self.pool.rent(size);
            match key.export_pkcs8(&mut buffer) {
                Ok(written) => return Ok(SecureMaterial::copy_from(&buffer[..written])),
                Err(InsufficientSpace) => {
                    tracing::trace!(size, "export buffer too small, doubling");
                    size = size
                        .checked_mul(2)
                        .ok_or_else(|| KeyError::malformed("exported key exceeds addressable size"))?;
                }
            }
            // buffer 在此处析构：整体清零后归还缓冲池
        }
    }
}

impl Default for SecretKeyFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn certificate_metadata(certificate: &Certificate, mut metadata: KeyMetadata) -> Result<KeyMetadata> {
    if metadata.key_id.is_none() {
        metadata.key_id = Some(certificate.thumbprint()?);
    }
    if metadata.expires_when.is_none() {
        metadata.expires_when = certificate.not_after();
    }
    Ok(metadata)
}
