//! PEM decoding of asymmetric key material.
//!
//! A document must contain exactly one key block. Blocks with other labels
//! (certificates, EC parameters, ...) are skipped. Framing and base64 are
//! handled by the `pem` crate; every decoded payload is held in an exactly
//! sized buffer that is zeroed when the call returns, on every exit path.
//!
//! 中文: PEM 格式非对称密钥解码。每个文档只能包含一个密钥块；其他标签的块会被跳过。
//! 分块与 base64 解码由 `pem` crate 完成，解码结果保存在精确大小、返回时清零的缓冲区中。

use crate::error::{KeyError, Result};
use crate::factory::SecretKeyFactory;
use crate::keys::certificate::{EC_PUBLIC_KEY_OID, RSA_ENCRYPTION_OID};
use crate::keys::{KeyMetadata, NativeKey, SecretKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, PrivateKeyInfo};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use x509_cert::der::Decode;
use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoRef};
use zeroize::Zeroizing;

/// secp256r1 (RFC 5480)
const P256_CURVE_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

const ENCRYPTED_PRIVATE_KEY: &str = "ENCRYPTED PRIVATE KEY";

/// 一个块内容到原生密钥的导入方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Import {
    Pkcs8Private,
    RsaPrivate,
    EcPrivate,
    SpkiPublic,
    RsaPublic,
}

impl Import {
    fn for_label(label: &str) -> Result<Option<Import>> {
        Ok(match label {
            ENCRYPTED_PRIVATE_KEY => {
                return Err(KeyError::unsupported(
                    "encrypted private keys are not supported",
                ));
            }
            "PRIVATE KEY" => Some(Import::Pkcs8Private),
            "RSA PRIVATE KEY" => Some(Import::RsaPrivate),
            "EC PRIVATE KEY" => Some(Import::EcPrivate),
            "PUBLIC KEY" => Some(Import::SpkiPublic),
            "RSA PUBLIC KEY" => Some(Import::RsaPublic),
            _ => None,
        })
    }

    fn run(self, der: &[u8]) -> Result<PemKey> {
        match self {
            Import::Pkcs8Private => import_pkcs8(der),
            Import::RsaPrivate => RsaPrivateKey::from_pkcs1_der(der)
                .map(PemKey::RsaPrivate)
                .map_err(KeyError::import),
            Import::EcPrivate => p256::SecretKey::from_sec1_der(der)
                .map(PemKey::EcPrivate)
                .map_err(KeyError::import),
            Import::SpkiPublic => import_spki(der),
            Import::RsaPublic => RsaPublicKey::from_pkcs1_der(der)
                .map(PemKey::RsaPublic)
                .map_err(KeyError::import),
        }
    }
}

fn import_pkcs8(der: &[u8]) -> Result<PemKey> {
    let info = PrivateKeyInfo::from_der(der).map_err(KeyError::import)?;
    let oid = info.algorithm.oid;
    if oid == RSA_ENCRYPTION_OID {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(PemKey::RsaPrivate)
            .map_err(KeyError::import)
    } else if oid == EC_PUBLIC_KEY_OID {
        ensure_p256(info.algorithm.parameters_oid().ok())?;
        p256::SecretKey::from_pkcs8_der(der)
            .map(PemKey::EcPrivate)
            .map_err(KeyError::import)
    } else {
        Err(KeyError::unsupported(format!(
            "private key algorithm {oid} is not supported"
        )))
    }
}

fn import_spki(der: &[u8]) -> Result<PemKey> {
    let info = SubjectPublicKeyInfoRef::from_der(der).map_err(KeyError::import)?;
    let oid = info.algorithm.oid;
    if oid == RSA_ENCRYPTION_OID {
        RsaPublicKey::from_public_key_der(der)
            .map(PemKey::RsaPublic)
            .map_err(KeyError::import)
    } else if oid == EC_PUBLIC_KEY_OID {
        ensure_p256(info.algorithm.parameters_oid().ok())?;
        p256::PublicKey::from_public_key_der(der)
            .map(PemKey::EcPublic)
            .map_err(KeyError::import)
    } else {
        Err(KeyError::unsupported(format!(
            "public key algorithm {oid} is not supported"
        )))
    }
}

fn ensure_p256(curve: Option<ObjectIdentifier>) -> Result<()> {
    match curve {
        Some(oid) if oid == P256_CURVE_OID => Ok(()),
        Some(other) => Err(KeyError::unsupported(format!(
            "elliptic curve {other} is not supported"
        ))),
        None => Err(KeyError::malformed("EC key is missing its curve parameter")),
    }
}

/// A key decoded from PEM text.
#[derive(Clone)]
pub enum PemKey {
    RsaPrivate(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
    EcPrivate(p256::SecretKey),
    EcPublic(p256::PublicKey),
}

impl PemKey {
    pub fn is_private(&self) -> bool {
        matches!(self, PemKey::RsaPrivate(_) | PemKey::EcPrivate(_))
    }

    /// The private key handle, or `None` for public keys.
    pub fn into_native(self) -> Option<NativeKey> {
        match self {
            PemKey::RsaPrivate(key) => Some(NativeKey::Rsa(key)),
            PemKey::EcPrivate(key) => Some(NativeKey::Ecc(key)),
            PemKey::RsaPublic(_) | PemKey::EcPublic(_) => None,
        }
    }
}

impl fmt::Debug for PemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemKey::RsaPrivate(_) => f.write_str("PemKey::RsaPrivate(..)"),
            PemKey::RsaPublic(key) => f.debug_tuple("PemKey::RsaPublic").field(key).finish(),
            PemKey::EcPrivate(_) => f.write_str("PemKey::EcPrivate(..)"),
            PemKey::EcPublic(key) => f.debug_tuple("PemKey::EcPublic").field(key).finish(),
        }
    }
}

/// A block of a PEM document with its payload already decoded.
struct PemBlock {
    label: String,
    // 传统 OpenSSL 加密格式带 Proc-Type / DEK-Info 头
    headers: bool,
    der: Zeroizing<Vec<u8>>,
}

impl From<::pem::Pem> for PemBlock {
    fn from(block: ::pem::Pem) -> Self {
        let label = block.tag().to_owned();
        let headers = block.headers().iter().next().is_some();
        Self {
            label,
            headers,
            der: Zeroizing::new(block.into_contents()),
        }
    }
}

/// Splits `pem` into decoded blocks. Text outside of blocks is ignored.
fn scan(pem: &[u8]) -> Result<Vec<PemBlock>> {
    let blocks = ::pem::parse_many(pem)?;
    Ok(blocks.into_iter().map(PemBlock::from).collect())
}

/// PEM 密钥读取器，私钥经由 `SecretKeyFactory` 转换为 `SecretKey`。
#[derive(Debug, Clone, Default)]
pub struct PemReader {
    factory: SecretKeyFactory,
}

impl PemReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: SecretKeyFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &SecretKeyFactory {
        &self.factory
    }

    /// Decodes the single key block of `pem`.
    ///
    /// # Errors
    ///
    /// * [`KeyError::Unsupported`] for encrypted private keys, and for keys
    ///   of an algorithm or curve other than RSA and P-256.
    /// * [`KeyError::Malformed`] if no key block or more than one is found,
    ///   or if the payload is not valid base64.
    /// * [`KeyError::Import`] if the decoded bytes are not a valid key.
    pub fn read_native_key(&self, pem: &[u8]) -> Result<PemKey> {
        let mut matched: Option<(Import, Zeroizing<Vec<u8>>)> = None;
        for block in scan(pem)? {
            let Some(import) = Import::for_label(&block.label)? else {
                continue;
            };
            if block.headers {
                return Err(KeyError::unsupported(format!(
                    "encrypted '{}' blocks are not supported",
                    block.label
                )));
            }
            if matched.is_some() {
                return Err(KeyError::malformed(
                    "duplicate key material: only one key per PEM document is supported",
                ));
            }
            matched = Some((import, block.der));
        }

        let (import, der) =
            matched.ok_or_else(|| KeyError::malformed("no key found in PEM document"))?;
        let key = import.run(&der)?;
        tracing::trace!(import = ?import, len = der.len(), "decoded PEM key block");
        Ok(key)
    }

    /// Decodes a private key and turns it into a [`SecretKey`].
    ///
    /// Public keys are rejected with [`KeyError::Unsupported`].
    pub fn read_secret_key(&self, pem: &[u8], metadata: KeyMetadata) -> Result<SecretKey> {
        let native = self
            .read_native_key(pem)?
            .into_native()
            .ok_or_else(|| KeyError::unsupported("a public key cannot be used as a secret key"))?;
        self.factory.create(&native, metadata)
    }
}
