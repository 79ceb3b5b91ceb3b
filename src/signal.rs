//! One-shot change notification.
//!
//! A [`SignalTrigger`] owns the firing side of a signal; any number of
//! [`ChangeSignal`] handles observe it. A signal fires at most once. Owners
//! that change again replace their trigger with a fresh one, so every
//! generation of state has its own signal.
//!
//! 中文: 一次性变更通知。`SignalTrigger` 持有触发端，`ChangeSignal` 是可克隆的观察端。
//! 每个信号最多触发一次；状态再次变化时由持有者换上新的触发器。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct SignalState {
    fired: AtomicBool,
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

impl SignalState {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            inner: Mutex::new(Registry::default()),
        }
    }
}

/// The firing side of a one-shot signal.
pub struct SignalTrigger {
    state: Arc<SignalState>,
}

impl SignalTrigger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    /// Returns an observer handle for this trigger.
    pub fn signal(&self) -> ChangeSignal {
        ChangeSignal {
            state: Some(Arc::clone(&self.state)),
        }
    }

    /// Fires the signal, invoking every registered callback exactly once.
    ///
    /// Callbacks run on the calling thread after the registry lock is
    /// released. Firing an already fired signal does nothing.
    pub fn fire(&self) {
        let callbacks = {
            let mut registry = self
                .state
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.state.fired.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut registry.callbacks)
        };
        for (_, callback) in callbacks {
            callback();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }
}

impl Default for SignalTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTrigger")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// An observer handle for a one-shot change signal.
///
/// 变更信号的观察端句柄。
#[derive(Clone)]
pub struct ChangeSignal {
    // None 表示永不触发的信号
    state: Option<Arc<SignalState>>,
}

impl ChangeSignal {
    /// A signal that never fires, used by sources whose keys never change.
    pub fn never() -> Self {
        Self { state: None }
    }

    /// Returns `true` once the signal has fired.
    pub fn has_changed(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.fired.load(Ordering::Acquire))
    }

    /// Returns `false` for signals that can never fire.
    pub fn active_callbacks(&self) -> bool {
        self.state.is_some()
    }

    /// Registers `callback` to run when the signal fires.
    ///
    /// Returns `None` without invoking or storing the callback if the signal
    /// has already fired; the caller observes the change through that return
    /// value instead of a re-entrant call. Dropping the returned
    /// [`Subscription`] unregisters the callback.
    pub fn register<F>(&self, callback: F) -> Option<Subscription>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(state) = &self.state else {
            return Some(Subscription::inert());
        };
        let mut registry = state.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fired.load(Ordering::Acquire) {
            return None;
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Box::new(callback));
        Some(Subscription {
            state: Arc::downgrade(state),
            id,
        })
    }

    /// Returns `true` if both handles observe the same trigger.
    pub fn same_as(&self, other: &ChangeSignal) -> bool {
        match (&self.state, &other.state) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("active", &self.active_callbacks())
            .field("changed", &self.has_changed())
            .finish()
    }
}

/// A registered callback. Dropping it unregisters the callback.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    state: Weak<SignalState>,
    id: u64,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            state: Weak::new(),
            id: 0,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .remove(&self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
