//! Persistent key-value storage and zoom/scroll persistence
//!
//! The coordinate model never touches storage directly: it is handed a
//! [`ViewPersistence`] port at construction, read once, and written on every
//! committed zoom or scroll change.

use crate::error::{DisplayError, Result, finite_or_zero};
use directories::ProjectDirs;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const STATE_FILE: &str = "state.json";
const ZOOM_KEY: &str = "zoom";
const SCROLL_KEY: &str = "scroll";

pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Rc<S> {
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }
}

/// Volatile store, for tests and hosts without persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a flat JSON object on disk, rewritten on every set
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: RefCell<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open `<data dir>/spectrum-view/state.json`
    pub fn open_default() -> Result<Self> {
        let project_dirs = ProjectDirs::from("org", "spectrum-view", "spectrum-view")
            .ok_or_else(|| DisplayError::Config("Failed to get project directories".to_string()))?;
        Self::open(&project_dirs.data_local_dir().join(STATE_FILE))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let items = if path.exists() {
            match serde_json::from_str::<Value>(&fs::read_to_string(path)?)? {
                Value::Object(map) => map,
                _ => {
                    tracing::warn!(path = %path.display(), "State file is not a JSON object, starting empty");
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            items: RefCell::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        match self.items.borrow().get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let json = {
            let mut items = self.items.borrow_mut();
            items.insert(key.to_string(), Value::String(value.to_string()));
            serde_json::to_string_pretty(&*items)?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Prefixes every key with a per-widget namespace
#[derive(Debug, Clone)]
pub struct Namespaced<S> {
    store: S,
    namespace: String,
}

impl<S: KeyValueStore> Namespaced<S> {
    pub fn new(store: S, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{}", self.namespace, key)
    }
}

impl<S: KeyValueStore> KeyValueStore for Namespaced<S> {
    fn get_item(&self, key: &str) -> Option<String> {
        self.store.get_item(&self.key(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.store.set_item(&self.key(key), value)
    }
}

/// Zoom and true (sub-pixel) scroll position as persisted between sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistedView {
    pub zoom: f64,
    pub scroll: f64,
}

impl Default for PersistedView {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            scroll: 0.0,
        }
    }
}

pub trait ViewPersistence {
    fn load(&self) -> PersistedView;
    fn save(&self, view: PersistedView);
}

/// [`ViewPersistence`] over a key-value store
pub struct StoredView<S> {
    store: S,
}

impl<S: KeyValueStore> StoredView<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn read_number(&self, key: &str) -> Option<f64> {
        let raw = self.store.get_item(key)?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                tracing::debug!(key, raw = %raw, "Ignoring unusable stored value");
                None
            }
        }
    }
}

impl<S: KeyValueStore> ViewPersistence for StoredView<S> {
    fn load(&self) -> PersistedView {
        let defaults = PersistedView::default();
        PersistedView {
            zoom: self.read_number(ZOOM_KEY).unwrap_or(defaults.zoom).max(1.0),
            scroll: self.read_number(SCROLL_KEY).unwrap_or(defaults.scroll).max(0.0),
        }
    }

    fn save(&self, view: PersistedView) {
        let zoom = finite_or_zero(view.zoom).max(1.0);
        let scroll = finite_or_zero(view.scroll).max(0.0);

        for (key, value) in [(ZOOM_KEY, zoom), (SCROLL_KEY, scroll)] {
            if let Err(e) = self.store.set_item(key, &value.to_string()) {
                tracing::warn!(key, error = %e, "Failed to persist view state");
            }
        }
    }
}

/// Persistence that forgets everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl ViewPersistence for NoPersistence {
    fn load(&self) -> PersistedView {
        PersistedView::default()
    }

    fn save(&self, _view: PersistedView) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get_item("missing"), None);
        store.set_item("a", "1").unwrap();
        assert_eq!(store.get_item("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_namespaced_keys_do_not_collide() {
        let store = Rc::new(MemoryStore::new());
        let left = Namespaced::new(Rc::clone(&store), "left");
        let right = Namespaced::new(Rc::clone(&store), "right");

        left.set_item("zoom", "2").unwrap();
        right.set_item("zoom", "3").unwrap();

        assert_eq!(left.get_item("zoom").as_deref(), Some("2"));
        assert_eq!(right.get_item("zoom").as_deref(), Some("3"));
        assert_eq!(store.get_item("left.zoom").as_deref(), Some("2"));
    }

    #[test]
    fn test_stored_view_defaults_when_empty() {
        let view = StoredView::new(MemoryStore::new());
        assert_eq!(view.load(), PersistedView::default());
    }

    #[test]
    fn test_stored_view_save_and_load() {
        let view = StoredView::new(MemoryStore::new());
        view.save(PersistedView {
            zoom: 4.5,
            scroll: 123.25,
        });
        assert_eq!(
            view.load(),
            PersistedView {
                zoom: 4.5,
                scroll: 123.25
            }
        );
    }

    #[test]
    fn test_stored_view_rejects_garbage() {
        let store = MemoryStore::new();
        store.set_item(ZOOM_KEY, "NaN").unwrap();
        store.set_item(SCROLL_KEY, "banana").unwrap();
        let view = StoredView::new(store);
        assert_eq!(view.load(), PersistedView::default());
    }

    #[test]
    fn test_stored_view_never_writes_non_finite() {
        let view = StoredView::new(MemoryStore::new());
        view.save(PersistedView {
            zoom: f64::INFINITY,
            scroll: f64::NAN,
        });
        assert_eq!(view.store.get_item(ZOOM_KEY).as_deref(), Some("1"));
        assert_eq!(view.store.get_item(SCROLL_KEY).as_deref(), Some("0"));
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join(STATE_FILE);

        let store = JsonFileStore::open(&path).unwrap();
        store.set_item("main.zoom", "8").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("main.zoom").as_deref(), Some("8"));
        assert_eq!(reopened.path(), path.as_path());
    }
}
