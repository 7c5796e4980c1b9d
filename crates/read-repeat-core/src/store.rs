//! Document and flag storage.
//!
//! The playback engine only ever reads and updates single documents; the
//! list and flag operations serve library management, imports and reports.

use crate::document::{Document, DocumentId, Flag, FlagId};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

const LIBRARY_FILE: &str = "library.json";

/// Storage contract for documents and flags.
///
/// `save_*` inserts when the record has no id (assigning one in place) and
/// updates otherwise. `update_document` edits the stored record in place
/// under the store's lock, so concurrent field updates never overwrite each
/// other with stale copies.
pub trait DocumentStore: Send + Sync + 'static {
    fn list_documents(&self) -> Result<Vec<Document>>;
    fn get_document(&self, id: DocumentId) -> Result<Option<Document>>;
    fn save_document(&self, document: &mut Document) -> Result<DocumentId>;
    fn update_document(
        &self,
        id: DocumentId,
        apply: &mut dyn FnMut(&mut Document),
    ) -> Result<Document>;
    fn delete_document(&self, id: DocumentId) -> Result<bool>;
    fn list_flags(&self) -> Result<Vec<Flag>>;
    fn get_flag(&self, id: FlagId) -> Result<Option<Flag>>;
    fn save_flag(&self, flag: &mut Flag) -> Result<FlagId>;
    fn delete_flag(&self, id: FlagId) -> Result<bool>;

    fn set_last_page_index(&self, id: DocumentId, page: usize) -> Result<()> {
        self.update_document(id, &mut |document: &mut Document| {
            document.last_page_index = Some(page)
        })?;
        Ok(())
    }

    fn set_voice_locale(&self, id: DocumentId, locale: Option<&str>) -> Result<()> {
        self.update_document(id, &mut |document: &mut Document| {
            document.voice_locale = locale.map(str::to_string)
        })?;
        Ok(())
    }

    /// Tag a document with `flag`, or clear its tag with `None`. The flag
    /// must exist.
    fn set_document_flag(&self, id: DocumentId, flag: Option<FlagId>) -> Result<()> {
        if let Some(flag_id) = flag {
            if self.get_flag(flag_id)?.is_none() {
                bail!("flag {flag_id} does not exist");
            }
        }
        self.update_document(id, &mut |document: &mut Document| document.flag_id = flag)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Library {
    #[serde(default)]
    next_document_id: u64,
    #[serde(default)]
    next_flag_id: u64,
    #[serde(default)]
    documents: BTreeMap<u64, Document>,
    #[serde(default)]
    flags: BTreeMap<u64, Flag>,
}

impl Library {
    fn save_document(&mut self, document: &mut Document) -> Result<DocumentId> {
        let id = match document.id {
            Some(id) => {
                if !self.documents.contains_key(&id.0) {
                    bail!("document {id} does not exist");
                }
                id
            }
            None => {
                self.next_document_id = self.next_document_id.max(self.max_document_id()) + 1;
                DocumentId(self.next_document_id)
            }
        };
        document.id = Some(id);
        self.documents.insert(id.0, document.clone());
        Ok(id)
    }

    fn update_document(
        &mut self,
        id: DocumentId,
        apply: &mut dyn FnMut(&mut Document),
    ) -> Result<Document> {
        let document = self
            .documents
            .get_mut(&id.0)
            .with_context(|| format!("document {id} does not exist"))?;
        apply(document);
        document.id = Some(id);
        Ok(document.clone())
    }

    fn save_flag(&mut self, flag: &mut Flag) -> Result<FlagId> {
        let name = flag.name.trim();
        if name.is_empty() {
            bail!("flag name must not be empty");
        }
        flag.name = name.to_string();
        let id = match flag.id {
            Some(id) => {
                if !self.flags.contains_key(&id.0) {
                    bail!("flag {id} does not exist");
                }
                id
            }
            None => {
                self.next_flag_id = self.next_flag_id.max(self.max_flag_id()) + 1;
                FlagId(self.next_flag_id)
            }
        };
        flag.id = Some(id);
        self.flags.insert(id.0, flag.clone());
        Ok(id)
    }

    fn delete_flag(&mut self, id: FlagId) -> bool {
        if self.flags.remove(&id.0).is_none() {
            return false;
        }
        for document in self.documents.values_mut() {
            if document.flag_id == Some(id) {
                document.flag_id = None;
            }
        }
        true
    }

    fn max_document_id(&self) -> u64 {
        self.documents.keys().next_back().copied().unwrap_or(0)
    }

    fn max_flag_id(&self) -> u64 {
        self.flags.keys().next_back().copied().unwrap_or(0)
    }
}

/// JSON-file backed library under the configured data directory.
pub struct LibraryStore {
    path: PathBuf,
    library: Mutex<Library>,
}

impl LibraryStore {
    /// Open (or create) the library stored in `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        let path = data_dir.join(LIBRARY_FILE);
        let library = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("reading library {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("parsing library {}", path.display()))?
        } else {
            Library::default()
        };
        info!(
            path = %path.display(),
            documents = library.documents.len(),
            flags = library.flags.len(),
            "Opened document library"
        );
        Ok(Self {
            path,
            library: Mutex::new(library),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_library<T>(&self, f: impl FnOnce(&mut Library) -> Result<T>) -> Result<T> {
        let mut guard = self
            .library
            .lock()
            .map_err(|_| anyhow!("library lock poisoned"))?;
        f(&mut guard)
    }

    /// Apply a mutation and write the library back; on write failure the
    /// in-memory copy is restored.
    fn mutate<T>(&self, f: impl FnOnce(&mut Library) -> Result<T>) -> Result<T> {
        self.with_library(|library| {
            let before = library.clone();
            let value = f(library)?;
            if let Err(err) = self.write(library) {
                *library = before;
                return Err(err);
            }
            Ok(value)
        })
    }

    fn write(&self, library: &Library) -> Result<()> {
        let data = serde_json::to_string_pretty(library).context("serializing library")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing library {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Library written");
        Ok(())
    }
}

impl DocumentStore for LibraryStore {
    fn list_documents(&self) -> Result<Vec<Document>> {
        self.with_library(|library| Ok(library.documents.values().cloned().collect()))
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        self.with_library(|library| Ok(library.documents.get(&id.0).cloned()))
    }

    fn save_document(&self, document: &mut Document) -> Result<DocumentId> {
        self.mutate(|library| library.save_document(document))
    }

    fn update_document(
        &self,
        id: DocumentId,
        apply: &mut dyn FnMut(&mut Document),
    ) -> Result<Document> {
        self.mutate(|library| library.update_document(id, apply))
    }

    fn delete_document(&self, id: DocumentId) -> Result<bool> {
        self.mutate(|library| Ok(library.documents.remove(&id.0).is_some()))
    }

    fn list_flags(&self) -> Result<Vec<Flag>> {
        self.with_library(|library| Ok(library.flags.values().cloned().collect()))
    }

    fn get_flag(&self, id: FlagId) -> Result<Option<Flag>> {
        self.with_library(|library| Ok(library.flags.get(&id.0).cloned()))
    }

    fn save_flag(&self, flag: &mut Flag) -> Result<FlagId> {
        self.mutate(|library| library.save_flag(flag))
    }

    fn delete_flag(&self, id: FlagId) -> Result<bool> {
        self.mutate(|library| Ok(library.delete_flag(id)))
    }
}

/// In-process store; counts document writes so callers can observe them.
#[derive(Default)]
pub struct MemoryStore {
    library: Mutex<Library>,
    document_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful document writes, whole saves and field updates
    /// alike.
    pub fn save_count(&self) -> usize {
        self.document_saves.load(Ordering::SeqCst)
    }

    fn with_library<T>(&self, f: impl FnOnce(&mut Library) -> Result<T>) -> Result<T> {
        let mut guard = self
            .library
            .lock()
            .map_err(|_| anyhow!("library lock poisoned"))?;
        f(&mut guard)
    }
}

impl DocumentStore for MemoryStore {
    fn list_documents(&self) -> Result<Vec<Document>> {
        self.with_library(|library| Ok(library.documents.values().cloned().collect()))
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        self.with_library(|library| Ok(library.documents.get(&id.0).cloned()))
    }

    fn save_document(&self, document: &mut Document) -> Result<DocumentId> {
        let id = self.with_library(|library| library.save_document(document))?;
        self.document_saves.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn update_document(
        &self,
        id: DocumentId,
        apply: &mut dyn FnMut(&mut Document),
    ) -> Result<Document> {
        let updated = self.with_library(|library| library.update_document(id, apply))?;
        self.document_saves.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    fn delete_document(&self, id: DocumentId) -> Result<bool> {
        self.with_library(|library| Ok(library.documents.remove(&id.0).is_some()))
    }

    fn list_flags(&self) -> Result<Vec<Flag>> {
        self.with_library(|library| Ok(library.flags.values().cloned().collect()))
    }

    fn get_flag(&self, id: FlagId) -> Result<Option<Flag>> {
        self.with_library(|library| Ok(library.flags.get(&id.0).cloned()))
    }

    fn save_flag(&self, flag: &mut Flag) -> Result<FlagId> {
        self.with_library(|library| library.save_flag(flag))
    }

    fn delete_flag(&self, id: FlagId) -> Result<bool> {
        self.with_library(|library| Ok(library.delete_flag(id)))
    }
}
