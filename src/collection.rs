//! An immutable, ordered and indexed view over a set of secret keys.
//!
//! 中文: 对一组密钥的不可变、有序、带索引的视图。
//!
//! Ordering: descending by expiration, an absent expiration counting as the
//! latest possible instant. Keys with equal effective expiration keep the
//! order in which they were supplied (stable sort), which makes the order a
//! deterministic total order for a given input sequence.

use crate::error::{KeyError, Result};
use crate::keys::SecretKey;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 有序密钥集合。
///
/// `owns == true` 时释放集合会释放其中所有密钥；`owns == false` 时集合只是借用，
/// 释放集合不会影响密钥本身（它们由更长寿命的容器持有）。
#[derive(Debug)]
pub struct SecretKeyCollection {
    keys: Vec<Arc<SecretKey>>,
    owns: bool,
    // 首次查找时构建：key_id -> 排序后首个匹配项的下标
    index: OnceCell<HashMap<String, usize>>,
    released: AtomicBool,
}

impl SecretKeyCollection {
    /// Sorts `keys` and captures them.
    ///
    /// Keys already released by their owner are kept in place; only their own
    /// accessors fail.
    pub fn from_sequence<I>(keys: I, owns: bool) -> Self
    where
        I: IntoIterator<Item = Arc<SecretKey>>,
    {
        let mut keys: Vec<_> = keys.into_iter().collect();
        // sort_by 是稳定排序，相同过期时间保持输入顺序
        keys.sort_by(|a, b| {
            let a = a.metadata_unchecked().effective_expiration();
            let b = b.metadata_unchecked().effective_expiration();
            b.cmp(&a)
        });
        Self::from_sorted(keys, owns)
    }

    /// Captures an already sorted sequence as-is.
    pub fn from_sorted(keys: Vec<Arc<SecretKey>>, owns: bool) -> Self {
        Self {
            keys,
            owns,
            index: OnceCell::new(),
            released: AtomicBool::new(false),
        }
    }

    /// An empty collection.
    pub fn empty() -> Self {
        Self::from_sorted(Vec::new(), true)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            Err(KeyError::Released)
        } else {
            Ok(())
        }
    }

    pub fn len(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.keys.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// The keys in sort order.
    pub fn keys(&self) -> Result<&[Arc<SecretKey>]> {
        self.ensure_live()?;
        Ok(&self.keys)
    }

    pub fn iter(&self) -> Result<std::slice::Iter<'_, Arc<SecretKey>>> {
        self.keys().map(|keys| keys.iter())
    }

    /// Finds the first key in sort order whose id equals `key_id`.
    ///
    /// The index is built once, on first call. Keys without an id (or with an
    /// empty one) are not indexed.
    pub fn lookup_by_key_id(&self, key_id: &str) -> Result<Option<&Arc<SecretKey>>> {
        self.ensure_live()?;
        let index = self.index.get_or_init(|| self.build_index());
        Ok(index.get(key_id).map(|&position| &self.keys[position]))
    }

    fn build_index(&self) -> HashMap<String, usize> {
        let mut index = HashMap::with_capacity(self.keys.len());
        for (position, key) in self.keys.iter().enumerate() {
            if let Some(id) = key.metadata_unchecked().lookup_id() {
                index.entry(id.to_string()).or_insert(position);
            }
        }
        index
    }

    pub fn owns_keys(&self) -> bool {
        self.owns
    }

    /// Releases the collection, and its keys if it owns them. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns {
            for key in &self.keys {
                key.release();
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for SecretKeyCollection {
    fn drop(&mut self) {
        self.release();
    }
}
