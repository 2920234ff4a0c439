//! Shared model handles.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::Model;

/// Reference-counted, lockable model.
///
/// Cloning a handle shares the model: a fit through one clone is visible
/// through every other clone. Aggregations hold members this way.
#[derive(Debug, Clone)]
pub struct ModelHandle(Arc<RwLock<Box<dyn Model>>>);

impl ModelHandle {
    pub fn new<M: Model + 'static>(model: M) -> Self {
        Self::from_boxed(Box::new(model))
    }

    pub fn from_boxed(model: Box<dyn Model>) -> Self {
        Self(Arc::new(RwLock::new(model)))
    }

    /// Shared access. A poisoned lock is recovered; model state is only
    /// committed after a step fully succeeds.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn Model>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Model>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point to the same model.
    pub fn ptr_eq(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
