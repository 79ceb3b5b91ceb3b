//! A data source whose key set can be swapped at runtime.
//!
//! 可在运行时整体替换密钥集的数据源。

use crate::error::{KeyError, Result};
use crate::keys::SecretKey;
use crate::signal::{ChangeSignal, SignalTrigger};
use crate::source::{DataSource, KeySet};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Rotating key store.
///
/// Readers load the current set and signal without locking. [`replace`]
/// swaps both under a writer lock and fires the previous signal after the
/// lock is dropped, so observers reading from inside their callback already
/// see the new set.
///
/// The source owns its current set: [`DataSource::release`] releases it.
/// A replaced set is handed back to the caller of [`replace`].
///
/// [`replace`]: ReloadableDataSource::replace
#[derive(Debug)]
pub struct ReloadableDataSource {
    keys: ArcSwap<Vec<Arc<SecretKey>>>,
    trigger: ArcSwap<SignalTrigger>,
    write_lock: Mutex<()>,
    released: AtomicBool,
}

impl ReloadableDataSource {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Arc<SecretKey>>,
    {
        Self {
            keys: ArcSwap::from_pointee(keys.into_iter().collect()),
            trigger: ArcSwap::from_pointee(SignalTrigger::new()),
            write_lock: Mutex::new(()),
            released: AtomicBool::new(false),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Installs `keys` as the current set and returns the previous one.
    pub fn replace<I>(&self, keys: I) -> Result<KeySet>
    where
        I: IntoIterator<Item = Arc<SecretKey>>,
    {
        let next: KeySet = Arc::new(keys.into_iter().collect());
        let count = next.len();
        let (previous, old_trigger) = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.ensure_live()?;
            let previous = self.keys.swap(next);
            let old_trigger = self.trigger.swap(Arc::new(SignalTrigger::new()));
            (previous, old_trigger)
        };
        tracing::debug!(count, "reloadable data source replaced its key set");
        old_trigger.fire();
        Ok(previous)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            Err(KeyError::Released)
        } else {
            Ok(())
        }
    }
}

impl DataSource for ReloadableDataSource {
    fn secret_keys(&self) -> Result<KeySet> {
        self.ensure_live()?;
        Ok(self.keys.load_full())
    }

    fn change_signal(&self) -> Result<ChangeSignal> {
        self.ensure_live()?;
        Ok(self.trigger.load().signal())
    }

    fn release(&self) {
        let current = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if self.released.swap(true, Ordering::AcqRel) {
                return;
            }
            self.keys.swap(Arc::new(Vec::new()))
        };
        for key in current.iter() {
            key.release();
        }
    }
}
