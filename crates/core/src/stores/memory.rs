use super::validate_name;
use crate::index::VectorIndex;
use crate::traits::IndexStore;
use crate::IndexError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-local store; indices are lost when it is dropped.
#[derive(Default)]
pub struct MemoryIndexStore {
    indices: Mutex<HashMap<String, VectorIndex>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, VectorIndex>> {
        self.indices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn load(&self, name: &str) -> Result<Option<VectorIndex>, IndexError> {
        validate_name(name)?;
        Ok(self.guard().get(name).cloned())
    }

    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError> {
        validate_name(index.name())?;
        self.guard().insert(index.name().to_string(), index.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, IndexError> {
        validate_name(name)?;
        Ok(self.guard().remove(name).is_some())
    }

    async fn contains(&self, name: &str) -> Result<bool, IndexError> {
        validate_name(name)?;
        Ok(self.guard().contains_key(name))
    }
}
