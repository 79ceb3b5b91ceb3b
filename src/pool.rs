//! A pool of reusable scratch buffers for sensitive bytes.
//!
//! Buffers rented from the pool are zeroed in full when returned, on every
//! exit path, before they become available to the next renter.
//!
//! 中文: 敏感字节的可复用临时缓冲池。缓冲区在归还时（无论以何种路径退出）
//! 都会被整体清零，然后才可能被下一个使用者租用。

use crate::config::PoolConfig;
use once_cell::sync::Lazy;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use zeroize::Zeroize;

static SHARED_POOL: Lazy<Arc<BufferPool>> =
    Lazy::new(|| Arc::new(BufferPool::new(PoolConfig::default())));

/// Pool of byte buffers that are zeroed on return.
///
/// 归还时清零的字节缓冲池。
#[derive(Debug)]
pub struct BufferPool {
    config: PoolConfig,
    retained: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            retained: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide pool used when no explicit pool is configured.
    pub fn shared() -> Arc<BufferPool> {
        Arc::clone(&SHARED_POOL)
    }

    /// Rents a buffer exposing exactly `len` zeroed bytes.
    pub fn rent(self: &Arc<Self>, len: usize) -> PooledBuffer {
        let reused = {
            let mut retained = self.retained.lock().unwrap_or_else(PoisonError::into_inner);
            // 选择能容纳 len 的最小缓冲区
            let best = retained
                .iter()
                .enumerate()
                .filter(|(_, buf)| buf.len() >= len)
                .min_by_key(|(_, buf)| buf.len())
                .map(|(index, _)| index);
            best.map(|index| retained.swap_remove(index))
        };

        let buf = match reused {
            Some(buf) => {
                tracing::trace!(requested = len, capacity = buf.len(), "reusing pooled buffer");
                buf
            }
            None => {
                tracing::trace!(requested = len, "allocating pooled buffer");
                vec![0u8; len]
            }
        };

        PooledBuffer {
            buf,
            len,
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        buf.as_mut_slice().zeroize();
        if buf.len() > self.config.max_retained_len {
            tracing::trace!(capacity = buf.len(), "dropping oversized pooled buffer");
            return;
        }
        let mut retained = self.retained.lock().unwrap_or_else(PoisonError::into_inner);
        if retained.len() < self.config.max_retained_buffers {
            tracing::trace!(capacity = buf.len(), "returned buffer to pool");
            retained.push(buf);
        }
    }

    /// Number of buffers currently held for reuse.
    pub fn retained_count(&self) -> usize {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Lengths of the retained buffers and whether each is entirely zero.
    #[cfg(test)]
    pub(crate) fn retained_snapshot(&self) -> Vec<(usize, bool)> {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|buf| (buf.len(), buf.iter().all(|&b| b == 0)))
            .collect()
    }
}

/// A buffer rented from a [`BufferPool`].
///
/// Dereferences to exactly the requested number of bytes. Dropping it zeroes
/// the whole backing allocation and hands it back to the pool.
pub struct PooledBuffer {
    buf: Vec<u8>,
    len: usize,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buf[..self.len]
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf[..self.len]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
