//! Aggregation of several data sources into one.
//!
//! The composite is lazily armed: the first call to [`DataSource::secret_keys`]
//! or [`DataSource::change_signal`] subscribes to every child's current
//! signal. When a child fires, the composite drops its merged view, swaps in a
//! fresh signal of its own and fires the previous one, then re-subscribes to
//! that child.
//!
//! Arming, invalidation and the double-checked reads are shared with the
//! provider. Own signals fire only after the instance lock is released, so
//! composites may be nested.
//!
//! 中文: 多数据源聚合。首次访问时订阅所有子数据源的信号；子数据源变化时，
//! 丢弃合并视图、替换并触发自身信号，再重新订阅。所有状态转换都在实例锁内完成，
//! 自身信号在解锁后触发。

use crate::cache::{InvalidatingCache, Upstream};
use crate::error::Result;
use crate::keys::SecretKey;
use crate::signal::ChangeSignal;
use crate::source::{DataSource, KeySet};
use std::fmt;
use std::sync::Arc;

/// A data source over a fixed list of child sources.
///
/// The composite does not own its children or their keys; releasing it only
/// drops its subscriptions and cached state.
pub struct CompositeDataSource {
    inner: Arc<InvalidatingCache<Children>>,
}

struct Children(Vec<Arc<dyn DataSource>>);

impl Upstream for Children {
    type View = Vec<Arc<SecretKey>>;
    const NAME: &'static str = "composite data source";

    fn signal_count(&self) -> usize {
        self.0.len()
    }

    fn change_signal(&self, index: usize) -> Result<ChangeSignal> {
        self.0[index].change_signal()
    }

    /// 单个子数据源直接透传，多个则按子数据源顺序拼接
    fn build(&self) -> Result<KeySet> {
        match self.0.as_slice() {
            [single] => single.secret_keys(),
            children => {
                let mut merged = Vec::new();
                for child in children {
                    merged.extend(child.secret_keys()?.iter().cloned());
                }
                Ok(Arc::new(merged))
            }
        }
    }

    fn released(&self, _view: Option<KeySet>) {}
}

impl CompositeDataSource {
    pub fn new<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DataSource>>,
    {
        Self {
            inner: InvalidatingCache::new(Children(children.into_iter().collect())),
        }
    }

    pub fn children(&self) -> &[Arc<dyn DataSource>] {
        &self.inner.upstream().0
    }

    /// Whether the composite has subscribed to its children yet.
    pub fn is_armed(&self) -> bool {
        self.inner.is_armed()
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }
}

impl DataSource for CompositeDataSource {
    fn secret_keys(&self) -> Result<KeySet> {
        self.inner.view()
    }

    fn change_signal(&self) -> Result<ChangeSignal> {
        self.inner.change_signal()
    }

    fn release(&self) {
        self.inner.release();
    }
}

impl fmt::Debug for CompositeDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDataSource")
            .field("children", &self.children().len())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyError;
    use crate::keys::{KeyMetadata, SecretKey, SymmetricSecretKey};
    use crate::source::{ReloadableDataSource, StaticDataSource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> Arc<SecretKey> {
        Arc::new(SymmetricSecretKey::new(id.as_bytes(), KeyMetadata::new().with_key_id(id)).into())
    }

    fn ids(keys: &KeySet) -> Vec<String> {
        keys.iter()
            .map(|k| k.key_id().unwrap().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_lazy_arming() {
        let child = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let composite = CompositeDataSource::new(vec![child as Arc<dyn DataSource>]);
        assert!(!composite.is_armed());

        composite.secret_keys().unwrap();
        assert!(composite.is_armed());
    }

    #[test]
    fn test_single_child_view_is_passed_through() {
        let child = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let composite = CompositeDataSource::new(vec![Arc::clone(&child) as Arc<dyn DataSource>]);

        let merged = composite.secret_keys().unwrap();
        assert!(Arc::ptr_eq(&merged, &child.secret_keys().unwrap()));
    }

    #[test]
    fn test_multiple_children_concatenate_in_order() {
        let first = Arc::new(StaticDataSource::from_shared(vec![key("a"), key("b")]));
        let second = Arc::new(ReloadableDataSource::new(vec![key("c")]));
        let composite = CompositeDataSource::new(vec![
            first as Arc<dyn DataSource>,
            second as Arc<dyn DataSource>,
        ]);

        assert_eq!(ids(&composite.secret_keys().unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_child_change_fires_captured_signal_only() {
        let first = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let second = Arc::new(ReloadableDataSource::new(vec![key("b")]));
        let composite = CompositeDataSource::new(vec![
            Arc::clone(&first) as Arc<dyn DataSource>,
            Arc::clone(&second) as Arc<dyn DataSource>,
        ]);

        let captured = composite.change_signal().unwrap();
        assert!(!captured.has_changed());

        second.replace(vec![key("b2")]).unwrap();

        assert!(captured.has_changed());
        let fresh = composite.change_signal().unwrap();
        assert!(!fresh.has_changed());
        assert!(!fresh.same_as(&captured));
    }

    #[test]
    fn test_view_is_rebuilt_after_change() {
        let first = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let second = Arc::new(ReloadableDataSource::new(vec![key("b")]));
        let composite = CompositeDataSource::new(vec![
            Arc::clone(&first) as Arc<dyn DataSource>,
            Arc::clone(&second) as Arc<dyn DataSource>,
        ]);
        assert_eq!(ids(&composite.secret_keys().unwrap()), vec!["a", "b"]);

        first.replace(vec![key("x"), key("y")]).unwrap();
        assert_eq!(ids(&composite.secret_keys().unwrap()), vec!["x", "y", "b"]);

        // 重新订阅后第二次变化同样生效
        first.replace(vec![key("z")]).unwrap();
        assert_eq!(ids(&composite.secret_keys().unwrap()), vec!["z", "b"]);
    }

    #[test]
    fn test_each_generation_fires_once() {
        let child = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let composite = CompositeDataSource::new(vec![Arc::clone(&child) as Arc<dyn DataSource>]);
        let fired = Arc::new(AtomicUsize::new(0));

        for round in 0..3 {
            let counter = Arc::clone(&fired);
            let _sub = composite
                .change_signal()
                .unwrap()
                .register(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            child.replace(vec![key(&format!("k{round}"))]).unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_nested_composites_propagate() {
        let leaf = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let inner = Arc::new(CompositeDataSource::new(vec![
            Arc::clone(&leaf) as Arc<dyn DataSource>,
        ]));
        let outer = CompositeDataSource::new(vec![inner as Arc<dyn DataSource>]);

        let signal = outer.change_signal().unwrap();
        leaf.replace(vec![key("b")]).unwrap();

        assert!(signal.has_changed());
        assert_eq!(ids(&outer.secret_keys().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_release_keeps_children_alive() {
        let k = key("a");
        let child = Arc::new(StaticDataSource::from_shared(vec![Arc::clone(&k)]));
        let composite = CompositeDataSource::new(vec![Arc::clone(&child) as Arc<dyn DataSource>]);
        composite.secret_keys().unwrap();

        composite.release();
        composite.release();

        assert!(!k.is_released());
        assert!(child.secret_keys().is_ok());
        assert!(matches!(composite.secret_keys(), Err(KeyError::Released)));
        assert!(matches!(composite.change_signal(), Err(KeyError::Released)));
    }

    #[test]
    fn test_release_unsubscribes_from_children() {
        let child = Arc::new(ReloadableDataSource::new(vec![key("a")]));
        let composite = CompositeDataSource::new(vec![Arc::clone(&child) as Arc<dyn DataSource>]);
        let signal = composite.change_signal().unwrap();

        composite.release();
        child.replace(vec![key("b")]).unwrap();

        assert!(!signal.has_changed());
    }

    #[test]
    fn test_empty_composite() {
        let composite = CompositeDataSource::new(Vec::new());
        assert!(composite.secret_keys().unwrap().is_empty());
        assert!(!composite.change_signal().unwrap().has_changed());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let child = Arc::new(ReloadableDataSource::new(vec![key("0")]));
        let composite = Arc::new(CompositeDataSource::new(vec![
            Arc::clone(&child) as Arc<dyn DataSource>,
            Arc::new(StaticDataSource::from_shared(vec![key("static")])) as Arc<dyn DataSource>,
        ]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let composite = Arc::clone(&composite);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let keys = composite.secret_keys().unwrap();
                        assert_eq!(keys.len(), 2);
                        assert_eq!(keys[1].key_id().unwrap(), Some("static"));
                    }
                })
            })
            .collect();
        for i in 1..50 {
            child.replace(vec![key(&i.to_string())]).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(ids(&composite.secret_keys().unwrap()), vec!["49", "static"]);
    }
}
