//! Defines the error type for the `seal-keyring` crate.
//!
//! 定义 `seal-keyring` 的错误类型。

use thiserror::Error;

/// The main error type for key material operations.
///
/// 密钥材料操作的主要错误类型。每个变体对应一种可区分的失败类别，
/// 由调用方决定重试、回退还是中止。
#[derive(Debug, Error)]
pub enum KeyError {
    /// The entity (key, collection, source or provider) has already been released.
    #[error("key material has been released")]
    Released,

    /// The input is structurally invalid: missing or duplicate PEM blocks,
    /// undecodable base64, inconsistent lengths.
    #[error("malformed key input: {0}")]
    Malformed(String),

    /// The input is well formed but not supported, e.g. encrypted PKCS8 or an
    /// unrecognized certificate key algorithm.
    #[error("unsupported key input: {0}")]
    Unsupported(String),

    /// The native key library rejected bytes that looked well formed.
    #[error("key import failed: {0}")]
    Import(String),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl KeyError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        KeyError::Malformed(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        KeyError::Unsupported(msg.into())
    }

    pub(crate) fn import(msg: impl std::fmt::Display) -> Self {
        KeyError::Import(msg.to_string())
    }

    /// Returns `true` if this error was caused by accessing released material.
    pub fn is_released(&self) -> bool {
        matches!(self, KeyError::Released)
    }
}

impl From<base64::DecodeSliceError> for KeyError {
    fn from(err: base64::DecodeSliceError) -> Self {
        KeyError::Malformed(format!("base64 decoding failed: {}", err))
    }
}

impl From<::pem::PemError> for KeyError {
    fn from(err: ::pem::PemError) -> Self {
        KeyError::Malformed(format!("invalid PEM document: {}", err))
    }
}

pub type Result<T, E = KeyError> = std::result::Result<T, E>;
