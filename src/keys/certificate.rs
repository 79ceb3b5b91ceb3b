//! X.509 certificates and the native key handles that may accompany them.
//!
//! 中文: X.509 证书以及可能随附的原生私钥句柄。

use crate::error::{KeyError, Result};
use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use x509_cert::der::{Decode, DecodePem, Encode};
use x509_cert::spki::ObjectIdentifier;

/// rsaEncryption (RFC 8017)
pub(crate) const RSA_ENCRYPTION_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey (RFC 5480)
pub(crate) const EC_PUBLIC_KEY_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// A native private key handle from which secret keys are created.
///
/// 创建密钥时使用的原生私钥句柄。ECC 目前支持 NIST P-256。
#[derive(Clone)]
pub enum NativeKey {
    Rsa(RsaPrivateKey),
    Ecc(p256::SecretKey),
}

impl NativeKey {
    pub fn algorithm(&self) -> CertificateKeyAlgorithm {
        match self {
            NativeKey::Rsa(_) => CertificateKeyAlgorithm::Rsa,
            NativeKey::Ecc(_) => CertificateKeyAlgorithm::Ec,
        }
    }
}

impl From<RsaPrivateKey> for NativeKey {
    fn from(key: RsaPrivateKey) -> Self {
        NativeKey::Rsa(key)
    }
}

impl From<p256::SecretKey> for NativeKey {
    fn from(key: p256::SecretKey) -> Self {
        NativeKey::Ecc(key)
    }
}

impl fmt::Debug for NativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeKey::Rsa(_) => f.write_str("NativeKey::Rsa(..)"),
            NativeKey::Ecc(_) => f.write_str("NativeKey::Ecc(..)"),
        }
    }
}

/// The public key algorithm named by a certificate's subject public key info.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CertificateKeyAlgorithm {
    Rsa,
    Ec,
    Other(ObjectIdentifier),
}

impl From<ObjectIdentifier> for CertificateKeyAlgorithm {
    fn from(oid: ObjectIdentifier) -> Self {
        if oid == RSA_ENCRYPTION_OID {
            CertificateKeyAlgorithm::Rsa
        } else if oid == EC_PUBLIC_KEY_OID {
            CertificateKeyAlgorithm::Ec
        } else {
            CertificateKeyAlgorithm::Other(oid)
        }
    }
}

/// An X.509 certificate, optionally paired with its private key.
///
/// Secret keys only ever retain the public part: see
/// [`Certificate::without_private_key`].
#[derive(Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    private_key: Option<NativeKey>,
}

impl Certificate {
    /// Parses a DER encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der)
            .map_err(|e| KeyError::malformed(format!("invalid certificate: {}", e)))?;
        Ok(Self::from_x509(inner))
    }

    /// Parses a PEM encoded certificate ("CERTIFICATE" label).
    pub fn from_pem(pem: impl AsRef<[u8]>) -> Result<Self> {
        let inner = x509_cert::Certificate::from_pem(pem)
            .map_err(|e| KeyError::malformed(format!("invalid certificate: {}", e)))?;
        Ok(Self::from_x509(inner))
    }

    pub fn from_x509(inner: x509_cert::Certificate) -> Self {
        Self {
            inner,
            private_key: None,
        }
    }

    /// Attaches a private key to this certificate.
    pub fn with_private_key(mut self, key: impl Into<NativeKey>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn private_key(&self) -> Option<&NativeKey> {
        self.private_key.as_ref()
    }

    /// A copy of this certificate with no private key attached.
    pub fn without_private_key(&self) -> Certificate {
        Self::from_x509(self.inner.clone())
    }

    pub fn x509(&self) -> &x509_cert::Certificate {
        &self.inner
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| KeyError::malformed(format!("certificate encoding failed: {}", e)))
    }

    /// Uppercase hex SHA-256 digest of the DER encoding.
    pub fn thumbprint(&self) -> Result<String> {
        let der = self.to_der()?;
        Ok(hex::encode_upper(Sha256::digest(&der)))
    }

    /// The end of the certificate's validity period.
    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        let since_epoch = self
            .inner
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration();
        let secs = i64::try_from(since_epoch.as_secs()).ok()?;
        DateTime::from_timestamp(secs, since_epoch.subsec_nanos())
    }

    pub fn key_algorithm(&self) -> CertificateKeyAlgorithm {
        self.inner
            .tbs_certificate
            .subject_public_key_info
            .algorithm
            .oid
            .into()
    }

    fn subject_public_key_der(&self) -> Result<Vec<u8>> {
        self.inner
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| KeyError::malformed(format!("invalid subject public key: {}", e)))
    }

    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(&self.subject_public_key_der()?).map_err(KeyError::import)
    }

    pub fn ec_public_key(&self) -> Result<p256::PublicKey> {
        p256::PublicKey::from_public_key_der(&self.subject_public_key_der()?)
            .map_err(KeyError::import)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.inner.tbs_certificate.subject.to_string())
            .field("key_algorithm", &self.key_algorithm())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}
