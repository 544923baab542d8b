//! Document persistence.
//!
//! The workspace talks to storage only through [`DocumentStore`]. Two
//! implementations ship with the crate:
//!
//! - [`MemoryStore`]: upload-ordered, process lifetime only. Used by tests
//!   and by library callers that manage persistence themselves.
//! - [`FsStore`]: one directory, two files per document. `{id}.json` holds
//!   metadata and extracted text; `{id}.pdf` holds the raw upload bytes so
//!   previews still work after a restart.
//!
//! All operations are idempotent: deleting a missing id or clearing an empty
//! store succeeds.
//!
//! `FsStore` writes every file through a temp file in the store directory and
//! renames it into place, so a crash never leaves a half-written record. A
//! record that is unreadable anyway is skipped by `get_all` with a warning.
//! Ids are used as file stems and must match `[A-Za-z0-9_-]{1,64}`.

use crate::document::{GuardedBuffer, SourceDocument};
use crate::error::StoreError;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Key-value storage of [`SourceDocument`]s keyed by id.
pub trait DocumentStore: Send + Sync {
    /// Every stored document, in upload order.
    fn get_all(&self) -> Result<Vec<SourceDocument>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<SourceDocument>, StoreError>;

    /// Insert or replace the document with `doc.id`.
    fn put(&mut self, doc: &SourceDocument) -> Result<(), StoreError>;

    fn delete(&mut self, id: &str) -> Result<(), StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;
}

// ── Memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Vec<SourceDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get_all(&self) -> Result<Vec<SourceDocument>, StoreError> {
        Ok(self.documents.clone())
    }

    fn get(&self, id: &str) -> Result<Option<SourceDocument>, StoreError> {
        Ok(self.documents.iter().find(|d| d.id == id).cloned())
    }

    fn put(&mut self, doc: &SourceDocument) -> Result<(), StoreError> {
        match self.documents.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => self.documents.push(doc.clone()),
        }
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        self.documents.retain(|d| d.id != id);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.documents.clear();
        Ok(())
    }
}

// ── Filesystem ───────────────────────────────────────────────────────────

/// Directory-backed store.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn bytes_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.pdf"))
    }

    fn load(&self, meta_path: &Path) -> Result<SourceDocument, StoreError> {
        let json = fs::read_to_string(meta_path).map_err(|source| StoreError::Io {
            path: meta_path.to_path_buf(),
            source,
        })?;
        let mut doc: SourceDocument =
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
                path: meta_path.to_path_buf(),
                detail: e.to_string(),
            })?;
        if !is_valid_id(&doc.id) {
            return Err(StoreError::Corrupt {
                path: meta_path.to_path_buf(),
                detail: format!("record id '{}' is not a valid document id", doc.id),
            });
        }

        let bytes_path = self.bytes_path(&doc.id);
        doc.raw_bytes = match fs::read(&bytes_path) {
            Ok(bytes) => Some(GuardedBuffer::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(id = %doc.id, "Raw bytes missing; previews will need a re-upload");
                None
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: bytes_path,
                    source,
                })
            }
        };
        Ok(doc)
    }
}

impl FsStore {
    /// Replace `path` with `contents` via a sibling temp file and a rename.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(contents).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Whether `id` can be used as a file stem inside the store directory.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl DocumentStore for FsStore {
    fn get_all(&self) -> Result<Vec<SourceDocument>, StoreError> {
        let mut docs = Vec::new();
        for path in self.entries()? {
            if !has_extension(&path, "json") {
                continue;
            }
            match self.load(&path) {
                Ok(doc) => docs.push(doc),
                Err(StoreError::Corrupt { path, detail }) => {
                    warn!(path = %path.display(), "Skipping unreadable record: {}", detail);
                }
                Err(e) => return Err(e),
            }
        }
        docs.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    fn get(&self, id: &str) -> Result<Option<SourceDocument>, StoreError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.meta_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.load(&path).map(Some)
    }

    fn put(&mut self, doc: &SourceDocument) -> Result<(), StoreError> {
        if !is_valid_id(&doc.id) {
            return Err(StoreError::InvalidId { id: doc.id.clone() });
        }
        if let Some(bytes) = &doc.raw_bytes {
            self.write_atomic(&self.bytes_path(&doc.id), bytes.as_slice())?;
        }

        let path = self.meta_path(&doc.id);
        let json = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        self.write_atomic(&path, json.as_bytes())?;

        debug!(id = %doc.id, status = %doc.status, "Stored document");
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if !is_valid_id(id) {
            debug!(id, "Ignoring delete of an invalid id");
            return Ok(());
        }
        remove_if_present(&self.meta_path(id))?;
        remove_if_present(&self.bytes_path(id))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        for path in self.entries()? {
            if has_extension(&path, "json") || has_extension(&path, "pdf") {
                remove_if_present(&path)?;
            }
        }
        Ok(())
    }
}

impl FsStore {
    /// Paths of the regular files directly inside the store directory.
    fn entries(&self) -> Result<Vec<PathBuf>, StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if entry.file_type().map_err(io_err)?.is_file() {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStatus;

    fn ready(name: &str, bytes: &[u8]) -> SourceDocument {
        let mut doc = SourceDocument::processing(name, GuardedBuffer::from(bytes.to_vec()));
        doc.mark_ready(format!("[Page 1]\n{name}\n\n"), 1).unwrap();
        doc
    }

    fn exercise(store: &mut dyn DocumentStore) {
        let a = ready("a.pdf", b"AAA");
        let b = ready("b.pdf", b"BBB");
        store.put(&a).unwrap();
        store.put(&b).unwrap();

        let names: Vec<String> = store.get_all().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);

        let loaded = store.get(&b.id).unwrap().unwrap();
        assert_eq!(loaded.extracted_text, b.extracted_text);
        assert_eq!(loaded.raw_bytes.unwrap().copy(), b"BBB");

        store.put(&a).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 2);

        store.delete(&a.id).unwrap();
        store.delete(&a.id).unwrap();
        assert!(store.get(&a.id).unwrap().is_none());

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&mut FsStore::open(dir.path()).unwrap());
    }

    #[test]
    fn fs_store_survives_reopen_and_keeps_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut failed = SourceDocument::processing("broken.pdf", GuardedBuffer::from(b"zz".to_vec()));
        failed.mark_failed("Failed to parse PDF: bad xref").unwrap();
        FsStore::open(dir.path()).unwrap().put(&failed).unwrap();

        let reopened = FsStore::open(dir.path()).unwrap();
        let doc = reopened.get(&failed.id).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert_eq!(doc.error_message.as_deref(), Some("Failed to parse PDF: bad xref"));
    }

    #[test]
    fn missing_bytes_file_loads_without_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let doc = ready("a.pdf", b"AAA");
        store.put(&doc).unwrap();
        std::fs::remove_file(dir.path().join(format!("{}.pdf", doc.id))).unwrap();

        let loaded = store.get(&doc.id).unwrap().unwrap();
        assert!(loaded.raw_bytes.is_none());
        assert!(loaded.is_ready());
    }

    #[test]
    fn corrupt_record_is_skipped_and_clear_still_works() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let good = ready("good.pdf", b"GOOD");
        store.put(&good).unwrap();
        std::fs::write(dir.path().join("half-written.json"), "{ trunc").unwrap();

        let docs = store.get_all().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, good.id);
        assert!(matches!(store.get("half-written"), Err(StoreError::Corrupt { .. })));

        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
        assert!(!dir.path().join("half-written.json").exists());
        assert!(!dir.path().join(format!("{}.pdf", good.id)).exists());
    }

    #[test]
    fn record_with_foreign_id_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = ready("a.pdf", b"AAA");
        doc.id = "../escape".into();
        let json = serde_json::to_string(&doc).unwrap();
        std::fs::write(dir.path().join("escape.json"), json).unwrap();

        let store = FsStore::open(dir.path()).unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn path_like_ids_never_touch_files_outside_the_store() {
        let root = tempfile::tempdir().unwrap();
        let outside = root.path().join("Master_Agreement.pdf");
        std::fs::write(&outside, b"%PDF-1.7").unwrap();
        let outside_meta = root.path().join("Master_Agreement.json");
        std::fs::write(&outside_meta, b"{}").unwrap();

        let mut store = FsStore::open(root.path().join(".pdfcite")).unwrap();
        for id in ["../Master_Agreement", "..", "a/b", "a\\b", "", "x.y"] {
            store.delete(id).unwrap();
            assert!(store.get(id).unwrap().is_none(), "id {id:?}");
        }
        assert!(outside.exists());
        assert!(outside_meta.exists());

        let mut doc = ready("a.pdf", b"AAA");
        doc.id = "../Master_Agreement".into();
        assert!(matches!(store.put(&doc), Err(StoreError::InvalidId { .. })));
        assert_eq!(std::fs::read(&outside).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn put_leaves_only_record_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let doc = ready("a.pdf", b"AAA");
        store.put(&doc).unwrap();
        store.put(&doc).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![format!("{}.json", doc.id), format!("{}.pdf", doc.id)]);
    }

    #[test]
    fn two_handles_on_one_directory_keep_both_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let first = ready("same.pdf", b"ONE");
        let second = ready("same.pdf", b"TWO");
        FsStore::open(dir.path()).unwrap().put(&first).unwrap();
        FsStore::open(dir.path()).unwrap().put(&second).unwrap();

        let docs = FsStore::open(dir.path()).unwrap().get_all().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].raw_bytes.as_ref().unwrap().copy(), b"ONE");
        assert_eq!(docs[1].raw_bytes.as_ref().unwrap().copy(), b"TWO");
    }

    #[test]
    fn valid_ids() {
        assert!(is_valid_id("3f2a9c0e5b7d4e1f8a6b2c9d0e1f2a3b"));
        assert!(is_valid_id("legacy_id-9"));
        assert!(!is_valid_id("../x"));
        assert!(!is_valid_id("a.b"));
        assert!(!is_valid_id(&"a".repeat(65)));
    }
}
