//! Owned, zero-on-release storage for key bytes.
//!
//! 拥有所有权、释放时清零的密钥字节存储。

use crate::error::{KeyError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use zeroize::Zeroize;

/// A fixed-length byte buffer holding sensitive key material.
///
/// The buffer is allocated once at exactly the required length and is never
/// resized, so no stale copy of the bytes is left behind by reallocation.
/// It is not `Clone`; duplication is explicit through [`SecureMaterial::try_duplicate`].
///
/// [`SecureMaterial::release`] overwrites every byte with zero and makes all
/// later access fail with [`KeyError::Released`]. Dropping the value zeroes
/// the bytes as well, whether or not it was released first.
///
/// 中文: 保存敏感密钥材料的定长字节缓冲区。分配一次且长度精确，不会扩容；
/// 不实现 `Clone`，只能显式复制。释放或析构时所有字节被清零。
pub struct SecureMaterial {
    bytes: RwLock<Box<[u8]>>,
    released: AtomicBool,
}

impl SecureMaterial {
    /// Copies `src` into a newly allocated buffer of exactly `src.len()` bytes.
    ///
    /// The caller's buffer is never aliased.
    pub fn copy_from(src: &[u8]) -> Self {
        Self::from_boxed(Box::from(src))
    }

    /// Allocates a zeroed buffer of `len` bytes and lets `fill` write into it.
    ///
    /// If `fill` fails the partially written buffer is zeroed before the
    /// error is returned.
    pub fn fill_with<F>(len: usize, fill: F) -> Result<Self>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        let mut buffer = vec![0u8; len].into_boxed_slice();
        if let Err(e) = fill(&mut buffer) {
            buffer.zeroize();
            return Err(e);
        }
        Ok(Self::from_boxed(buffer))
    }

    /// A zero-length buffer.
    pub fn empty() -> Self {
        Self::from_boxed(Box::default())
    }

    fn from_boxed(bytes: Box<[u8]>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            released: AtomicBool::new(false),
        }
    }

    /// Number of bytes held.
    pub fn len(&self) -> Result<usize> {
        self.expose(|bytes| bytes.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Runs `f` with read access to the bytes.
    ///
    /// The slice cannot escape the closure, so the bytes are only ever
    /// borrowed for the duration of the call.
    pub fn expose<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let guard = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        if self.released.load(Ordering::Acquire) {
            return Err(KeyError::Released);
        }
        Ok(f(&guard))
    }

    /// Explicitly duplicates the material into a new, independent buffer.
    pub fn try_duplicate(&self) -> Result<Self> {
        self.expose(Self::copy_from)
    }

    /// Zeroes the bytes and marks the material as released.
    ///
    /// Calling this more than once is a no-op.
    pub fn release(&self) {
        let mut guard = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        guard.zeroize();
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Raw view of the backing allocation, readable even after release.
    #[cfg(test)]
    pub(crate) fn backing_bytes(&self) -> Vec<u8> {
        self.bytes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }
}

impl Drop for SecureMaterial {
    fn drop(&mut self) {
        self.bytes
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .zeroize();
    }
}

impl fmt::Debug for SecureMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureMaterial")
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
