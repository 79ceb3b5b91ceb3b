//! # Seal-Keyring: Secure Key Material Management
//!
//! `seal-keyring` represents, stores, aggregates, indexes and hot-reloads
//! collections of cryptographic secret keys (symmetric, RSA and P-256).
//!
//! Key bytes live in owned buffers that are zeroed on release, key sets can
//! come from several sources that change at runtime, and consumers see a
//! consistent, atomically swapped view plus a one-shot change signal.
//!
//! ## Core Concepts
//!
//! - **`SecretKey`**: a key (material plus metadata). Released keys refuse every access.
//! - **`SecretKeyCollection`**: an ordered, indexed snapshot of keys, latest expiration first.
//! - **`DataSource`**: a trait for suppliers of keys. `StaticDataSource` and
//!   `ReloadableDataSource` are provided, and `CompositeDataSource` merges several.
//! - **`SecretKeyProvider`**: caches a collection over a composite and refreshes it on change.
//! - **`SecretKeyFactory`** / **`PemReader`**: build keys from native handles,
//!   certificates and PEM text.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seal_keyring::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let reader = PemReader::new();
//!     let signing = reader.read_secret_key(
//!         include_bytes!("signing.pem"),
//!         KeyMetadata::new().with_key_id("sig-1").with_use("sig"),
//!     )?;
//!
//!     let rotating = Arc::new(ReloadableDataSource::new(vec![Arc::new(signing)]));
//!     let provider = SecretKeyProvider::from_sources(vec![rotating.clone() as Arc<dyn DataSource>]);
//!
//!     let changed = provider.change_signal()?;
//!     assert!(provider.try_get_by_key_id("sig-1")?.is_some());
//!
//!     // Rotate: the provider rebuilds its collection on the next access.
//!     rotating.replace(Vec::new())?;
//!     assert!(changed.has_changed());
//!     assert!(provider.try_get_by_key_id("sig-1")?.is_none());
//!     Ok(())
//! }
//! ```

mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod factory;
pub mod keys;
pub mod material;
pub mod pem;
pub mod pool;
pub mod provider;
pub mod signal;
pub mod source;

// --- Prelude ---
// The types most callers need.
pub mod prelude {
    pub use crate::collection::SecretKeyCollection;
    pub use crate::config::{KeyDefinition, KeySetConfig, KeyringConfig, MaterialConfig};
    pub use crate::error::{KeyError, Result};
    pub use crate::factory::SecretKeyFactory;
    pub use crate::keys::{
        Certificate, EccSecretKey, EmptySecretKey, KeyKind, KeyMetadata, NativeKey,
        RsaSecretKey, SecretKey, SymmetricSecretKey,
    };
    pub use crate::pem::{PemKey, PemReader};
    pub use crate::provider::SecretKeyProvider;
    pub use crate::signal::{ChangeSignal, Subscription};
    pub use crate::source::{
        CompositeDataSource, DataSource, KeySet, ReloadableDataSource, StaticDataSource,
    };
}

pub use collection::SecretKeyCollection;
pub use error::{KeyError, Result};
pub use factory::SecretKeyFactory;
pub use keys::{KeyMetadata, SecretKey};
pub use pem::PemReader;
pub use provider::SecretKeyProvider;

/// The version of the `seal-keyring` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
