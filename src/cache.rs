//! A lazily armed view that is dropped and re-signalled when its upstream
//! changes.
//!
//! The first call to [`InvalidatingCache::view`] or
//! [`InvalidatingCache::change_signal`] subscribes to every upstream signal.
//! When one fires, the cache drops its view, swaps in a fresh trigger of its
//! own, fires the previous one and re-subscribes to that upstream.
//!
//! Reads go through [`ArcSwapOption`] without locking; every transition
//! happens under one mutex per instance and is rechecked after the lock is
//! taken. The cache's own signal fires only after that mutex is released, so
//! callbacks may read back from the cache, and caches may be stacked.
//!
//! 中文: 惰性订阅、上游变化时失效并重新发信号的缓存视图。
//! `CompositeDataSource` 和 `SecretKeyProvider` 共用此实现。

use crate::error::{KeyError, Result};
use crate::signal::{ChangeSignal, SignalTrigger, Subscription};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// What an [`InvalidatingCache`] watches and how it builds its view.
pub(crate) trait Upstream: Send + Sync + 'static {
    type View: Send + Sync + 'static;

    /// Name used in log events.
    const NAME: &'static str;

    /// Number of upstream signals to watch.
    fn signal_count(&self) -> usize;

    fn change_signal(&self, index: usize) -> Result<ChangeSignal>;

    fn build(&self) -> Result<Arc<Self::View>>;

    /// Called once, outside the lock, by the first [`InvalidatingCache::release`].
    fn released(&self, view: Option<Arc<Self::View>>);
}

pub(crate) struct InvalidatingCache<U: Upstream> {
    upstream: U,
    view: ArcSwapOption<U::View>,
    trigger: ArcSwapOption<SignalTrigger>,
    state: Mutex<ArmState>,
    released: AtomicBool,
}

#[derive(Default)]
struct ArmState {
    armed: bool,
    // 与上游信号一一对应；上游已释放时为 None
    subscriptions: Vec<Option<Subscription>>,
}

impl<U: Upstream> InvalidatingCache<U> {
    pub(crate) fn new(upstream: U) -> Arc<Self> {
        Arc::new(Self {
            upstream,
            view: ArcSwapOption::empty(),
            trigger: ArcSwapOption::empty(),
            state: Mutex::new(ArmState::default()),
            released: AtomicBool::new(false),
        })
    }

    pub(crate) fn upstream(&self) -> &U {
        &self.upstream
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.lock_state().armed
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn lock_state(&self) -> MutexGuard<'_, ArmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            Err(KeyError::Released)
        } else {
            Ok(())
        }
    }

    fn arm(self: &Arc<Self>, state: &mut ArmState) -> Result<()> {
        if state.armed {
            return Ok(());
        }
        let count = self.upstream.signal_count();
        let mut subscriptions = Vec::with_capacity(count);
        for index in 0..count {
            subscriptions.push(Some(self.subscribe(index)?));
        }
        state.subscriptions = subscriptions;
        state.armed = true;
        tracing::debug!(view = U::NAME, upstreams = count, "armed");
        Ok(())
    }

    /// Registers on the upstream's current signal.
    ///
    /// A signal that has already fired is stale; the upstream hands out a
    /// fresh one on the next request.
    fn subscribe(self: &Arc<Self>, index: usize) -> Result<Subscription> {
        loop {
            let weak: Weak<Self> = Arc::downgrade(self);
            let registered = self.upstream.change_signal(index)?.register(move || {
                if let Some(cache) = weak.upgrade() {
                    cache.on_upstream_changed(index);
                }
            });
            if let Some(subscription) = registered {
                return Ok(subscription);
            }
        }
    }

    fn on_upstream_changed(self: &Arc<Self>, index: usize) {
        let old_trigger = {
            let mut state = self.lock_state();
            if self.is_released() || !state.armed {
                return;
            }
            self.view.store(None);
            let old_trigger = match self.trigger.load_full() {
                Some(_) => self.trigger.swap(Some(Arc::new(SignalTrigger::new()))),
                None => None,
            };
            let resubscribed = match self.subscribe(index) {
                Ok(subscription) => Some(subscription),
                Err(err) => {
                    tracing::debug!(view = U::NAME, upstream = index, error = %err, "upstream unavailable, not resubscribing");
                    None
                }
            };
            if let Some(slot) = state.subscriptions.get_mut(index) {
                *slot = resubscribed;
            }
            tracing::debug!(view = U::NAME, upstream = index, "invalidated");
            old_trigger
        };
        if let Some(trigger) = old_trigger {
            trigger.fire();
        }
    }

    /// The current view, built on first call and after every invalidation.
    pub(crate) fn view(self: &Arc<Self>) -> Result<Arc<U::View>> {
        self.ensure_live()?;
        if let Some(view) = self.view.load_full() {
            return Ok(view);
        }

        let mut state = self.lock_state();
        self.ensure_live()?;
        self.arm(&mut state)?;
        if let Some(view) = self.view.load_full() {
            return Ok(view);
        }
        let view = self.upstream.build()?;
        self.view.store(Some(Arc::clone(&view)));
        tracing::debug!(view = U::NAME, "rebuilt");
        Ok(view)
    }

    pub(crate) fn change_signal(self: &Arc<Self>) -> Result<ChangeSignal> {
        self.ensure_live()?;
        if let Some(trigger) = self.trigger.load_full() {
            return Ok(trigger.signal());
        }

        let mut state = self.lock_state();
        self.ensure_live()?;
        self.arm(&mut state)?;
        if let Some(trigger) = self.trigger.load_full() {
            return Ok(trigger.signal());
        }
        let trigger = Arc::new(SignalTrigger::new());
        self.trigger.store(Some(Arc::clone(&trigger)));
        Ok(trigger.signal())
    }

    /// Drops subscriptions and cached state. Idempotent.
    pub(crate) fn release(&self) {
        let (subscriptions, view) = {
            let mut state = self.lock_state();
            if self.released.swap(true, Ordering::AcqRel) {
                return;
            }
            state.armed = false;
            self.trigger.store(None);
            (std::mem::take(&mut state.subscriptions), self.view.swap(None))
        };
        // 在实例锁之外注销，避免与上游信号的注册表锁嵌套
        drop(subscriptions);
        self.upstream.released(view);
        tracing::debug!(view = U::NAME, "released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// 计数构建次数的测试上游
    struct Counter {
        trigger: Mutex<Arc<SignalTrigger>>,
        builds: AtomicUsize,
        released_with: Mutex<Option<usize>>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                trigger: Mutex::new(Arc::new(SignalTrigger::new())),
                builds: AtomicUsize::new(0),
                released_with: Mutex::new(None),
            }
        }

        fn change(&self) {
            let old = std::mem::replace(
                &mut *self.trigger.lock().unwrap(),
                Arc::new(SignalTrigger::new()),
            );
            old.fire();
        }
    }

    impl Upstream for Counter {
        type View = usize;
        const NAME: &'static str = "counter";

        fn signal_count(&self) -> usize {
            1
        }

        fn change_signal(&self, _index: usize) -> Result<ChangeSignal> {
            Ok(self.trigger.lock().unwrap().signal())
        }

        fn build(&self) -> Result<Arc<usize>> {
            Ok(Arc::new(self.builds.fetch_add(1, Ordering::SeqCst) + 1))
        }

        fn released(&self, view: Option<Arc<usize>>) {
            *self.released_with.lock().unwrap() = view.map(|v| *v);
        }
    }

    #[test]
    fn test_view_is_built_lazily_and_cached() {
        let cache = InvalidatingCache::new(Counter::new());
        assert!(!cache.is_armed());
        assert_eq!(cache.upstream().builds.load(Ordering::SeqCst), 0);

        assert_eq!(*cache.view().unwrap(), 1);
        assert_eq!(*cache.view().unwrap(), 1);
        assert!(cache.is_armed());
        assert_eq!(cache.upstream().builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upstream_change_rebuilds_and_fires_once() {
        let cache = InvalidatingCache::new(Counter::new());
        let signal = cache.change_signal().unwrap();
        assert_eq!(*cache.view().unwrap(), 1);

        cache.upstream().change();
        assert!(signal.has_changed());
        assert_eq!(*cache.view().unwrap(), 2);

        let next = cache.change_signal().unwrap();
        assert!(!next.same_as(&signal));
        cache.upstream().change();
        assert!(next.has_changed());
        assert_eq!(*cache.view().unwrap(), 3);
    }

    #[test]
    fn test_release_hands_over_view_once() {
        let cache = InvalidatingCache::new(Counter::new());
        cache.view().unwrap();
        cache.release();
        cache.release();

        assert_eq!(*cache.upstream().released_with.lock().unwrap(), Some(1));
        assert!(matches!(cache.view(), Err(KeyError::Released)));
        assert!(matches!(cache.change_signal(), Err(KeyError::Released)));

        // 释放后的上游变化不再触发任何重建
        cache.upstream().change();
        assert_eq!(cache.upstream().builds.load(Ordering::SeqCst), 1);
    }
}
