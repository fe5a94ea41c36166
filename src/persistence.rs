//! The one persisted setting: whether audio is muted.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::StorageError;

pub const MUTE_KEY: &str = "splatwalk_mute_v1";

/// String key-value storage (browser local storage, or memory).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Read the mute flag. Missing value or any storage error reads as unmuted.
pub fn load_mute(store: &dyn KeyValueStore) -> bool {
    match store.get(MUTE_KEY) {
        Ok(Some(value)) => value == "1",
        Ok(None) => false,
        Err(e) => {
            warn!("could not read mute flag: {e}");
            false
        }
    }
}

/// Write the mute flag. Failures are logged and otherwise ignored.
pub fn save_mute(store: &mut dyn KeyValueStore, muted: bool) {
    let value = if muted { "1" } else { "0" };
    match store.set(MUTE_KEY, value) {
        Ok(()) => debug!(muted, "saved mute flag"),
        Err(e) => warn!("could not save mute flag: {e}"),
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::LocalStorageStore;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::KeyValueStore;
    use crate::error::StorageError;

    /// `window.localStorage`. Private browsing modes may deny access, which
    /// surfaces as `StorageError::Unavailable` on every call.
    pub struct LocalStorageStore {
        storage: Option<web_sys::Storage>,
    }

    impl LocalStorageStore {
        pub fn new(window: &web_sys::Window) -> Self {
            Self {
                storage: window.local_storage().ok().flatten(),
            }
        }

        fn storage(&self) -> Result<&web_sys::Storage, StorageError> {
            self.storage
                .as_ref()
                .ok_or_else(|| StorageError::Unavailable("localStorage is not accessible".to_string()))
        }
    }

    impl KeyValueStore for LocalStorageStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.storage()?
                .get_item(key)
                .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            self.storage()?
                .set_item(key, value)
                .map_err(|e| StorageError::WriteFailed {
                    key: key.to_string(),
                    reason: format!("{e:?}"),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("denied".to_string()))
        }

        fn set(&mut self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed {
                key: key.to_string(),
                reason: "quota".to_string(),
            })
        }
    }

    #[test]
    fn test_mute_defaults_to_false() {
        let store = MemoryStore::new();
        assert!(!load_mute(&store));
    }

    #[test]
    fn test_mute_survives_reload() {
        let mut store = MemoryStore::new();
        save_mute(&mut store, true);
        // a reload only keeps the store
        let reloaded = store.clone();
        assert!(load_mute(&reloaded));
        assert_eq!(reloaded.get(MUTE_KEY).unwrap().as_deref(), Some("1"));

        save_mute(&mut store, false);
        assert!(!load_mute(&store));
    }

    #[test]
    fn test_storage_errors_are_swallowed() {
        let mut store = BrokenStore;
        assert!(!load_mute(&store));
        save_mute(&mut store, true);
    }

    #[test]
    fn test_unexpected_value_reads_unmuted() {
        let mut store = MemoryStore::new();
        store.set(MUTE_KEY, "yes").unwrap();
        assert!(!load_mute(&store));
    }
}
