use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use serde::{de::DeserializeOwned, Serialize};

const EXTENSION: &str = "json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error(display = "invalid document key: {:?}", _0)]
    InvalidKey(String),
    #[error(display = "storage lock poisoned")]
    Poisoned,
}

/// A small key/value store of JSON documents.
///
/// Writes are synchronous: once `save` returns, a subsequent `load` from
/// any handle over the same backing store observes the new document.
pub trait Storage {
    fn load_raw(&self, key: &str) -> Result<Option<String>>;
    fn save_raw(&self, key: &str, body: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn load<D: DeserializeOwned>(&self, key: &str) -> Result<Option<D>> {
        match self.load_raw(key)? {
            Some(body) => {
                let doc = serde_json::from_str(&body)
                    .with_context(|| format!("decode document {:?}", key))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn save<D: Serialize>(&self, key: &str, document: &D) -> Result<()> {
        let body = serde_json::to_string(document)
            .with_context(|| format!("encode document {:?}", key))?;
        self.save_raw(key, &body)
    }
}

fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Stores each document as `<key>.json` inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).with_context(|| format!("create storage dir {:?}", root))?;
        debug!("Opened file storage at {:?}", root);
        Ok(FileStorage { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, EXTENSION)))
    }
}

impl Storage for FileStorage {
    fn load_raw(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_of(key)?;
        match fs::read_to_string(&path) {
            Ok(body) => {
                trace!("Load {:?} from {:?}", key, path);
                Ok(Some(body))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {:?}", path)),
        }
    }

    fn save_raw(&self, key: &str, body: &str) -> Result<()> {
        let path = self.path_of(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("write {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
        debug!("Saved {:?} ({} bytes)", key, body.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {:?}", key);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {:?}", path)),
        }
    }
}

/// In-process storage; contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn load_raw(&self, key: &str) -> Result<Option<String>> {
        check_key(key)?;
        let docs = self.docs.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(docs.get(key).cloned())
    }

    fn save_raw(&self, key: &str, body: &str) -> Result<()> {
        check_key(key)?;
        let mut docs = self.docs.lock().map_err(|_| StorageError::Poisoned)?;
        docs.insert(key.to_string(), body.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;
        let mut docs = self.docs.lock().map_err(|_| StorageError::Poisoned)?;
        docs.remove(key);
        Ok(())
    }
}
