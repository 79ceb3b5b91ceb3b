//! `RsaSecretKey` 与 `EccSecretKey`：以 PKCS8 DER 形式保存在安全内存中的私钥。
//!
//! 原生密钥句柄只在需要时从 PKCS8 字节临时导入，用完即析构（RustCrypto 的私钥类型在析构时清零）。

use crate::error::{KeyError, Result};
use crate::keys::certificate::Certificate;
use crate::keys::metadata::KeyMetadata;
use crate::material::SecureMaterial;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// P-256 曲线的密钥长度（比特）
const P256_KEY_BITS: usize = 256;

/// 非对称密钥共享的部分：PKCS8 材料、元数据与可选的纯公钥证书。
#[derive(Debug)]
pub(crate) struct AsymmetricCore {
    material: SecureMaterial,
    metadata: KeyMetadata,
    key_size_bits: usize,
    // 构造时已剥离私钥
    certificate: Option<Certificate>,
}

impl AsymmetricCore {
    fn new(
        material: SecureMaterial,
        metadata: KeyMetadata,
        key_size_bits: usize,
        certificate: Option<&Certificate>,
    ) -> Self {
        Self {
            material,
            metadata,
            key_size_bits,
            certificate: certificate.map(Certificate::without_private_key),
        }
    }

    pub(crate) fn material(&self) -> &SecureMaterial {
        &self.material
    }

    pub(crate) fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }

    fn ensure_live(&self) -> Result<()> {
        if self.material.is_released() {
            Err(KeyError::Released)
        } else {
            Ok(())
        }
    }

    fn key_size_bits(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.key_size_bits)
    }

    fn export_certificate(&self) -> Result<Option<Certificate>> {
        self.ensure_live()?;
        Ok(self.certificate.as_ref().map(Certificate::without_private_key))
    }

    fn has_certificate(&self) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.certificate.is_some())
    }
}

/// An RSA private key held as PKCS8 DER in secure memory.
#[derive(Debug)]
pub struct RsaSecretKey {
    core: AsymmetricCore,
}

impl RsaSecretKey {
    /// Copies `pkcs8` into secure memory and validates it as an RSA key.
    ///
    /// If validation fails the copied bytes are zeroed before the error is
    /// returned.
    pub fn from_pkcs8(
        pkcs8: &[u8],
        metadata: KeyMetadata,
        certificate: Option<&Certificate>,
    ) -> Result<Self> {
        let material = SecureMaterial::copy_from(pkcs8);
        let key_size_bits = material
            .expose(RsaPrivateKey::from_pkcs8_der)?
            .map_err(KeyError::import)?
            .n()
            .bits();
        Ok(Self::from_material(
            material,
            metadata,
            key_size_bits,
            certificate,
        ))
    }

    pub(crate) fn from_material(
        material: SecureMaterial,
        metadata: KeyMetadata,
        key_size_bits: usize,
        certificate: Option<&Certificate>,
    ) -> Self {
        Self {
            core: AsymmetricCore::new(material, metadata, key_size_bits, certificate),
        }
    }

    pub(crate) fn core(&self) -> &AsymmetricCore {
        &self.core
    }

    /// Imports a transient native key from the stored PKCS8 bytes.
    pub fn export_native_key(&self) -> Result<RsaPrivateKey> {
        self.core
            .material
            .expose(RsaPrivateKey::from_pkcs8_der)?
            .map_err(KeyError::import)
    }

    pub fn public_key(&self) -> Result<RsaPublicKey> {
        self.export_native_key().map(|key| key.to_public_key())
    }

    /// Runs `f` with the PKCS8 DER bytes.
    pub fn expose_pkcs8<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.core.material.expose(f)
    }

    pub fn key_size_bits(&self) -> Result<usize> {
        self.core.key_size_bits()
    }

    /// The certificate this key was created from, never with a private key.
    pub fn export_certificate(&self) -> Result<Option<Certificate>> {
        self.core.export_certificate()
    }

    pub fn has_certificate(&self) -> Result<bool> {
        self.core.has_certificate()
    }
}

/// A NIST P-256 private key held as PKCS8 DER in secure memory.
#[derive(Debug)]
pub struct EccSecretKey {
    core: AsymmetricCore,
}

impl EccSecretKey {
    /// Copies `pkcs8` into secure memory and validates it as a P-256 key.
    pub fn from_pkcs8(
        pkcs8: &[u8],
        metadata: KeyMetadata,
        certificate: Option<&Certificate>,
    ) -> Result<Self> {
        let material = SecureMaterial::copy_from(pkcs8);
        material
            .expose(p256::SecretKey::from_pkcs8_der)?
            .map_err(KeyError::import)?;
        Ok(Self::from_material(material, metadata, certificate))
    }

    pub(crate) fn from_material(
        material: SecureMaterial,
        metadata: KeyMetadata,
        certificate: Option<&Certificate>,
    ) -> Self {
        Self {
            core: AsymmetricCore::new(material, metadata, P256_KEY_BITS, certificate),
        }
    }

    pub(crate) fn core(&self) -> &AsymmetricCore {
        &self.core
    }

    pub fn export_native_key(&self) -> Result<p256::SecretKey> {
        self.core
            .material
            .expose(p256::SecretKey::from_pkcs8_der)?
            .map_err(KeyError::import)
    }

    pub fn public_key(&self) -> Result<p256::PublicKey> {
        self.export_native_key().map(|key| key.public_key())
    }

    pub fn curve(&self) -> &'static str {
        "P-256"
    }

    pub fn expose_pkcs8<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.core.material.expose(f)
    }

    pub fn key_size_bits(&self) -> Result<usize> {
        self.core.key_size_bits()
    }

    pub fn export_certificate(&self) -> Result<Option<Certificate>> {
        self.core.export_certificate()
    }

    pub fn has_certificate(&self) -> Result<bool> {
        self.core.has_certificate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    const RSA_KEY: &str = include_str!("../../tests/data/rsa_key.pem");
    const RSA_CERT: &str = include_str!("../../tests/data/rsa_cert.pem");
    const EC_KEY: &str = include_str!("../../tests/data/ec_key.pem");

    fn rsa_pkcs8() -> Vec<u8> {
        let key = RsaPrivateKey::from_pkcs8_pem(RSA_KEY).unwrap();
        key.to_pkcs8_der().unwrap().as_bytes().to_vec()
    }

    fn ec_pkcs8() -> Vec<u8> {
        let key = p256::SecretKey::from_pkcs8_pem(EC_KEY).unwrap();
        key.to_pkcs8_der().unwrap().as_bytes().to_vec()
    }

    #[test]
    fn test_rsa_from_pkcs8() {
        let key = RsaSecretKey::from_pkcs8(&rsa_pkcs8(), KeyMetadata::new(), None).unwrap();
        assert_eq!(key.key_size_bits().unwrap(), 2048);

        let original = RsaPrivateKey::from_pkcs8_pem(RSA_KEY).unwrap();
        assert_eq!(key.public_key().unwrap(), original.to_public_key());
    }

    #[test]
    fn test_rsa_odd_modulus_size() {
        let native = RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 1023).unwrap();
        let pkcs8 = native.to_pkcs8_der().unwrap();
        let key = RsaSecretKey::from_pkcs8(pkcs8.as_bytes(), KeyMetadata::new(), None).unwrap();
        assert_eq!(key.key_size_bits().unwrap(), 1023);
    }

    #[test]
    fn test_rsa_rejects_ec_material() {
        let result = RsaSecretKey::from_pkcs8(&ec_pkcs8(), KeyMetadata::new(), None);
        assert!(matches!(result, Err(KeyError::Import(_))));
    }

    #[test]
    fn test_ecc_from_pkcs8() {
        let key = EccSecretKey::from_pkcs8(&ec_pkcs8(), KeyMetadata::new(), None).unwrap();
        assert_eq!(key.key_size_bits().unwrap(), 256);
        assert_eq!(key.curve(), "P-256");

        let original = p256::SecretKey::from_pkcs8_pem(EC_KEY).unwrap();
        assert_eq!(key.public_key().unwrap(), original.public_key());
    }

    #[test]
    fn test_ecc_rejects_garbage() {
        let result = EccSecretKey::from_pkcs8(&[0x30, 0x03, 0x02, 0x01, 0x00], KeyMetadata::new(), None);
        assert!(matches!(result, Err(KeyError::Import(_))));
    }

    #[test]
    fn test_export_after_release_fails() {
        let key = RsaSecretKey::from_pkcs8(&rsa_pkcs8(), KeyMetadata::new(), None).unwrap();
        key.core().material().release();

        assert!(matches!(key.export_native_key(), Err(KeyError::Released)));
        assert!(matches!(key.key_size_bits(), Err(KeyError::Released)));
        assert!(matches!(key.export_certificate(), Err(KeyError::Released)));
    }

    #[test]
    fn test_certificate_is_retained_without_private_key() {
        let native = RsaPrivateKey::from_pkcs8_pem(RSA_KEY).unwrap();
        let cert = Certificate::from_pem(RSA_CERT)
            .unwrap()
            .with_private_key(native);

        let key = RsaSecretKey::from_pkcs8(&rsa_pkcs8(), KeyMetadata::new(), Some(&cert)).unwrap();

        assert!(key.has_certificate().unwrap());
        let exported = key.export_certificate().unwrap().unwrap();
        assert!(!exported.has_private_key());
        assert!(!key.core().certificate.as_ref().unwrap().has_private_key());
    }
}
