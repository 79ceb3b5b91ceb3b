use crate::keys::metadata::KeyMetadata;
use crate::material::SecureMaterial;

/// A key that carries metadata but no key material.
///
/// 只携带元数据、不含密钥材料的占位密钥。
#[derive(Debug)]
pub struct EmptySecretKey {
    material: SecureMaterial,
    metadata: KeyMetadata,
}

impl EmptySecretKey {
    pub fn new(metadata: KeyMetadata) -> Self {
        Self {
            material: SecureMaterial::empty(),
            metadata,
        }
    }

    pub(crate) fn material(&self) -> &SecureMaterial {
        &self.material
    }

    pub(crate) fn metadata(&self) -> &KeyMetadata {
        &self.metadata
    }
}
