//! Key-value persistence for saved spreadsheets.
//!
//! Documents are stored as JSON strings under `<prefix>spreadsheet_<id>`,
//! and a summary list of every saved sheet lives under `<prefix>spreadsheets`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::errors::{StorageError, StorageResult};
use crate::domain::SheetSnapshot;

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "gridcalc_";

const INDEX_KEY: &str = "spreadsheets";

/// String-keyed storage medium for serialized documents.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn put(&mut self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&mut self, key: &str) -> StorageResult<()>;
}

/// Keeps entries in memory; contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Stores each entry as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, value)?;
        debug!(path = %path.display(), bytes = value.len(), "wrote entry");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    #[default]
    Spreadsheet,
}

/// A saved spreadsheet: cell data plus grid size and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDocument {
    pub id: String,
    pub title: String,
    pub data: SheetSnapshot,
    pub row_count: usize,
    pub column_count: usize,
    pub last_modified: String,
    #[serde(rename = "type", default)]
    pub kind: DocumentKind,
}

/// Index entry describing one saved spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub id: String,
    pub title: String,
    pub last_modified: String,
    #[serde(rename = "type", default)]
    pub kind: DocumentKind,
}

impl From<&SheetDocument> for SheetSummary {
    fn from(doc: &SheetDocument) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            last_modified: doc.last_modified.clone(),
            kind: doc.kind,
        }
    }
}

/// Saves, loads and lists [`SheetDocument`]s in a [`KeyValueStore`].
pub struct SheetRepository {
    store: Box<dyn KeyValueStore>,
    prefix: String,
}

impl std::fmt::Debug for SheetRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetRepository")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SheetRepository {
    pub fn new(store: impl KeyValueStore + 'static, prefix: impl Into<String>) -> Self {
        Self {
            store: Box::new(store),
            prefix: prefix.into(),
        }
    }

    /// An in-memory repository with the default prefix.
    pub fn in_memory() -> Self {
        Self::new(MemoryKeyValueStore::new(), DEFAULT_KEY_PREFIX)
    }

    fn document_key(&self, id: &str) -> String {
        format!("{}spreadsheet_{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}{}", self.prefix, INDEX_KEY)
    }

    /// Writes the document and inserts or refreshes its index entry.
    pub fn save(&mut self, doc: &SheetDocument) -> StorageResult<()> {
        let json = serde_json::to_string(doc)?;
        self.store.put(&self.document_key(&doc.id), &json)?;

        let mut index = self.list()?;
        let summary = SheetSummary::from(doc);
        match index.iter_mut().find(|entry| entry.id == doc.id) {
            Some(entry) => *entry = summary,
            None => index.push(summary),
        }
        self.store.put(&self.index_key(), &serde_json::to_string(&index)?)?;

        info!(id = %doc.id, title = %doc.title, cells = doc.data.len(), "saved spreadsheet");
        Ok(())
    }

    pub fn load(&self, id: &str) -> StorageResult<SheetDocument> {
        let json = self
            .store
            .get(&self.document_key(id))?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let doc: SheetDocument = serde_json::from_str(&json)?;
        info!(id, cells = doc.data.len(), "loaded spreadsheet");
        Ok(doc)
    }

    /// Summaries of every saved sheet, oldest first.
    pub fn list(&self) -> StorageResult<Vec<SheetSummary>> {
        match self.store.get(&self.index_key())? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn delete(&mut self, id: &str) -> StorageResult<()> {
        self.store.remove(&self.document_key(id))?;
        let index: Vec<SheetSummary> = self.list()?.into_iter().filter(|entry| entry.id != id).collect();
        self.store.put(&self.index_key(), &serde_json::to_string(&index)?)?;
        info!(id, "deleted spreadsheet");
        Ok(())
    }
}
