//! Parameter store implementations

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{ParamError, ParamStore};

/// One file per parameter under `<root>/d/`.
///
/// Writes go to a temporary file that is renamed over the old value, so
/// readers in other processes see either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileParamStore {
    root: PathBuf,
}

impl FileParamStore {
    /// Open a store rooted at `root`, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ParamError> {
        let root = root.into();
        fs::create_dir_all(root.join("d"))?;
        Ok(Self { root })
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn value_path(&self, name: &str) -> Result<PathBuf, ParamError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ParamError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid parameter name {name:?}"),
            )));
        }
        Ok(self.root.join("d").join(name))
    }
}

impl ParamStore for FileParamStore {
    fn read(&self, name: &str) -> Result<String, ParamError> {
        match fs::read_to_string(self.value_path(name)?) {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ParamError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), ParamError> {
        let path = self.value_path(name)?;
        let tmp = self.root.join(format!(".tmp_{name}"));

        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ParamError::Io(e)
        })
    }
}

/// In-memory store. Clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct MemoryParamStore {
    values: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryParamStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value, for inspection
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.borrow().get(name).cloned()
    }
}

impl ParamStore for MemoryParamStore {
    fn read(&self, name: &str) -> Result<String, ParamError> {
        self.get(name).ok_or_else(|| ParamError::NotFound(name.to_string()))
    }

    fn write(&mut self, name: &str, value: &str) -> Result<(), ParamError> {
        self.values.borrow_mut().insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{read_param, write_param};

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("params");
        let mut store = FileParamStore::open(&root).unwrap();

        write_param(&mut store, "IsMetric", &true).unwrap();
        let mut metric = false;
        read_param(&store, "IsMetric", &mut metric).unwrap();
        assert!(metric);
        assert!(root.join("d").join("IsMetric").exists());
        assert!(!root.join(".tmp_IsMetric").exists());
    }

    #[test]
    fn test_file_store_missing_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileParamStore::open(dir.path()).unwrap();
        assert!(matches!(store.read("LastAthenaPingTime"), Err(ParamError::NotFound(_))));
    }

    #[test]
    fn test_file_store_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileParamStore::open(dir.path()).unwrap();
        assert!(matches!(store.write("../escape", "1"), Err(ParamError::Io(_))));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_memory_store_clones_share_values() {
        let mut store = MemoryParamStore::new();
        let view = store.clone();
        store.write("IsDriverViewEnabled", "1").unwrap();
        assert_eq!(view.get("IsDriverViewEnabled").as_deref(), Some("1"));
    }
}
