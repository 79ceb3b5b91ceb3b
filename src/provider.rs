//! The composition root consumed by protocol code.
//!
//! 中文: 对外的密钥提供者。包装一个 `CompositeDataSource`，缓存由其密钥构建的
//! `SecretKeyCollection`（不拥有密钥），并在上游变化时一致地刷新缓存与信号。

use crate::cache::{InvalidatingCache, Upstream};
use crate::collection::SecretKeyCollection;
use crate::error::Result;
use crate::keys::SecretKey;
use crate::signal::ChangeSignal;
use crate::source::{CompositeDataSource, DataSource};
use std::fmt;
use std::sync::Arc;

/// Cached, indexed access to the keys of a set of data sources.
///
/// The collection handed out by [`secret_keys`](Self::secret_keys) borrows
/// its keys; they remain owned by the data sources.
pub struct SecretKeyProvider {
    inner: Arc<InvalidatingCache<ProviderSource>>,
}

struct ProviderSource {
    source: CompositeDataSource,
}

impl Upstream for ProviderSource {
    type View = SecretKeyCollection;
    const NAME: &'static str = "secret key provider";

    fn signal_count(&self) -> usize {
        1
    }

    fn change_signal(&self, _index: usize) -> Result<ChangeSignal> {
        self.source.change_signal()
    }

    fn build(&self) -> Result<Arc<SecretKeyCollection>> {
        let keys = self.source.secret_keys()?;
        tracing::trace!(count = keys.len(), "building provider collection");
        Ok(Arc::new(SecretKeyCollection::from_sequence(
            keys.iter().cloned(),
            false,
        )))
    }

    fn released(&self, collection: Option<Arc<SecretKeyCollection>>) {
        if let Some(collection) = collection {
            collection.release();
        }
        self.source.release();
    }
}

impl SecretKeyProvider {
    pub fn new(source: CompositeDataSource) -> Self {
        Self {
            inner: InvalidatingCache::new(ProviderSource { source }),
        }
    }

    /// 直接由若干数据源构建，内部包一层 `CompositeDataSource`。
    pub fn from_sources<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DataSource>>,
    {
        Self::new(CompositeDataSource::new(sources))
    }

    /// The current keys, sorted and indexed.
    ///
    /// Built on first call and rebuilt after every upstream change.
    pub fn secret_keys(&self) -> Result<Arc<SecretKeyCollection>> {
        self.inner.view()
    }

    pub fn change_signal(&self) -> Result<ChangeSignal> {
        self.inner.change_signal()
    }

    /// Looks up a key by id in the current collection.
    pub fn try_get_by_key_id(&self, key_id: &str) -> Result<Option<Arc<SecretKey>>> {
        let collection = self.secret_keys()?;
        Ok(collection.lookup_by_key_id(key_id)?.cloned())
    }

    pub fn source(&self) -> &CompositeDataSource {
        &self.inner.upstream().source
    }

    /// Releases the provider and the composite it wraps. Idempotent.
    pub fn release(&self) {
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }
}

impl fmt::Debug for SecretKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyProvider")
            .field("source", self.source())
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyError;
    use crate::keys::{KeyMetadata, SymmetricSecretKey};
    use crate::source::{ReloadableDataSource, StaticDataSource};
    use chrono::{Duration, Utc};

    fn key(id: &str, days: Option<i64>) -> Arc<SecretKey> {
        let mut meta = KeyMetadata::new().with_key_id(id);
        meta.expires_when = days.map(|d| Utc::now() + Duration::days(d));
        Arc::new(SymmetricSecretKey::new(id.as_bytes(), meta).into())
    }

    fn provider_over(reloadable: &Arc<ReloadableDataSource>) -> SecretKeyProvider {
        SecretKeyProvider::from_sources(vec![
            Arc::clone(reloadable) as Arc<dyn DataSource>,
            Arc::new(StaticDataSource::from_shared(vec![key("static", Some(1))]))
                as Arc<dyn DataSource>,
        ])
    }

    #[test]
    fn test_collection_is_sorted_and_cached() {
        let reloadable = Arc::new(ReloadableDataSource::new(vec![key("a", Some(5))]));
        let provider = provider_over(&reloadable);

        let first = provider.secret_keys().unwrap();
        let second = provider.secret_keys().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.owns_keys());

        let ids: Vec<_> = first
            .iter()
            .unwrap()
            .map(|k| k.key_id().unwrap().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "static"]);
    }

    #[test]
    fn test_lookup_reflects_rotation() {
        let reloadable = Arc::new(ReloadableDataSource::new(vec![key("old", None)]));
        let provider = provider_over(&reloadable);
        let signal = provider.change_signal().unwrap();

        assert!(provider.try_get_by_key_id("old").unwrap().is_some());
        reloadable.replace(vec![key("new", None)]).unwrap();

        assert!(signal.has_changed());
        assert!(!provider.change_signal().unwrap().has_changed());
        assert!(provider.try_get_by_key_id("old").unwrap().is_none());
        assert!(provider.try_get_by_key_id("new").unwrap().is_some());
    }

    #[test]
    fn test_first_wins_across_sources() {
        let reloadable = Arc::new(ReloadableDataSource::new(vec![key("dup", Some(1))]));
        let later = key("dup", Some(2));
        let provider = SecretKeyProvider::from_sources(vec![
            Arc::clone(&reloadable) as Arc<dyn DataSource>,
            Arc::new(StaticDataSource::from_shared(vec![Arc::clone(&later)]))
                as Arc<dyn DataSource>,
        ]);

        let found = provider.try_get_by_key_id("dup").unwrap().unwrap();
        assert!(Arc::ptr_eq(&found, &later));
    }

    #[test]
    fn test_old_collection_survives_rebuild() {
        let reloadable = Arc::new(ReloadableDataSource::new(vec![key("a", None)]));
        let provider = provider_over(&reloadable);
        let before = provider.secret_keys().unwrap();

        reloadable.replace(vec![key("b", None)]).unwrap();
        let after = provider.secret_keys().unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.len().unwrap(), 2);
        assert!(before.lookup_by_key_id("a").unwrap().is_some());
    }

    #[test]
    fn test_release_does_not_release_source_keys() {
        let k = key("a", None);
        let reloadable = Arc::new(ReloadableDataSource::new(vec![Arc::clone(&k)]));
        let provider = provider_over(&reloadable);
        let collection = provider.secret_keys().unwrap();

        provider.release();
        provider.release();

        assert!(provider.is_released());
        assert!(provider.source().is_released());
        assert!(collection.is_released());
        assert!(!k.is_released());
        assert!(matches!(provider.secret_keys(), Err(KeyError::Released)));
        assert!(matches!(provider.try_get_by_key_id("a"), Err(KeyError::Released)));
        assert!(matches!(provider.change_signal(), Err(KeyError::Released)));
    }

    #[test]
    fn test_snapshot_survives_release_of_replaced_keys() {
        let reloadable = Arc::new(ReloadableDataSource::new(vec![key("rotated", None)]));
        let provider = provider_over(&reloadable);
        let snapshot = provider.secret_keys().unwrap();

        // 轮换后调用方释放被换下的密钥
        let previous = reloadable.replace(vec![key("current", None)]).unwrap();
        for old in previous.iter() {
            old.release();
        }

        assert!(snapshot.lookup_by_key_id("static").unwrap().is_some());
        let rotated = snapshot.lookup_by_key_id("rotated").unwrap().unwrap();
        assert!(matches!(rotated.key_size_bytes(), Err(KeyError::Released)));
        assert!(provider.try_get_by_key_id("current").unwrap().is_some());
    }

    #[test]
    fn test_released_key_does_not_hide_live_keys() {
        let dead = key("dead", None);
        dead.release();
        let provider = SecretKeyProvider::from_sources(vec![
            Arc::new(StaticDataSource::from_shared(vec![dead, key("live", Some(1))]))
                as Arc<dyn DataSource>,
        ]);

        let live = provider.try_get_by_key_id("live").unwrap().unwrap();
        assert_eq!(live.key_size_bytes().unwrap(), 4);
        let dead = provider.try_get_by_key_id("dead").unwrap().unwrap();
        assert!(dead.is_released());
        assert_eq!(provider.secret_keys().unwrap().len().unwrap(), 2);
    }
}
