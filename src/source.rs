//! Data sources: suppliers of a changing set of secret keys plus a change
//! signal.
//!
//! 中文: 数据源。每个数据源提供一组（可能随时间变化的）密钥以及一个变更信号。
//! `CompositeDataSource` 将多个数据源聚合为一个逻辑视图。

pub mod composite;
pub mod reloadable;
pub mod static_source;

pub use composite::CompositeDataSource;
pub use reloadable::ReloadableDataSource;
pub use static_source::StaticDataSource;

use crate::error::Result;
use crate::keys::SecretKey;
use crate::signal::ChangeSignal;
use std::sync::Arc;

/// A shared, immutable snapshot of the keys a source yields.
pub type KeySet = Arc<Vec<Arc<SecretKey>>>;

/// A supplier of secret keys.
///
/// 数据源接口。实现者决定是否拥有自己产出的密钥。
pub trait DataSource: Send + Sync {
    /// The current keys. May differ between calls.
    fn secret_keys(&self) -> Result<KeySet>;

    /// A handle that fires once the keys returned so far are out of date.
    ///
    /// The handle stays the same until the next change. Sources that never
    /// change return [`ChangeSignal::never`].
    fn change_signal(&self) -> Result<ChangeSignal>;

    /// Releases the source. Idempotent.
    fn release(&self);
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn secret_keys(&self) -> Result<KeySet> {
        (**self).secret_keys()
    }

    fn change_signal(&self) -> Result<ChangeSignal> {
        (**self).change_signal()
    }

    fn release(&self) {
        (**self).release()
    }
}
