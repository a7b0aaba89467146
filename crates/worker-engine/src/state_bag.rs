// StateBag: typed key/value extension state for one job execution.
// Known collaborators live in named fields on `ExecutionContext`; the bag
// carries only optional data that custom steps exchange.

use std::any::{type_name, Any};
use std::collections::HashMap;
use thiserror::Error;

/// A pipeline assembly defect: a step read state that was never written,
/// written twice, or written with another type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state key {0:?} is missing")]
    MissingKey(String),

    #[error("state key {key:?} holds {found}, not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("execution state {0} has not been set")]
    MissingField(&'static str),

    #[error("execution state {0} is immutable once set")]
    AlreadySet(&'static str),
}

struct Entry {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// String keys to values of any `Send + Sync` type.
///
/// Reads name the expected type; a mismatch is an error, never an empty read.
#[derive(Default)]
pub struct StateBag {
    values: HashMap<String, Entry>,
}

impl std::fmt::Debug for StateBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (key, entry) in &self.values {
            map.entry(key, &entry.type_name);
        }
        map.finish()
    }
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub fn put<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(
            key.into(),
            Entry {
                type_name: type_name::<T>(),
                value: Box::new(value),
            },
        );
    }

    /// Read `key` as `T`. Missing keys and wrong types are both errors.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T, StateError> {
        self.try_get(key)?
            .ok_or_else(|| StateError::MissingKey(key.to_string()))
    }

    /// Read `key` as `T` when present. A wrong type is still an error.
    pub fn try_get<T: Any>(&self, key: &str) -> Result<Option<&T>, StateError> {
        match self.values.get(key) {
            None => Ok(None),
            Some(entry) => entry
                .value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| mismatch::<T>(key, entry)),
        }
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Result<&mut T, StateError> {
        let entry = self
            .values
            .get_mut(key)
            .ok_or_else(|| StateError::MissingKey(key.to_string()))?;
        let found = entry.type_name;
        entry
            .value
            .downcast_mut::<T>()
            .ok_or_else(|| StateError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
                found,
            })
    }

    /// Remove `key` and return its value. On a type mismatch the entry stays.
    pub fn remove<T: Any>(&mut self, key: &str) -> Result<T, StateError> {
        let entry = self
            .values
            .get(key)
            .ok_or_else(|| StateError::MissingKey(key.to_string()))?;
        if !entry.value.is::<T>() {
            return Err(mismatch::<T>(key, entry));
        }
        let entry = self
            .values
            .remove(key)
            .ok_or_else(|| StateError::MissingKey(key.to_string()))?;
        entry
            .value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| StateError::MissingKey(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn mismatch<T: Any>(key: &str, entry: &Entry) -> StateError {
    StateError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
        found: entry.type_name,
    }
}
