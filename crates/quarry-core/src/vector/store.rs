//! On-disk layout of a persisted similarity index.
//!
//! Two co-located artifacts, saved and loaded together:
//! - `vectors.bin`: bincode `(snapshot, dimension, vectors)`
//! - `documents.json`: JSON `{snapshot, documents}`
//!
//! Each file is written to a temp path and renamed into place. Both carry
//! the same snapshot id, so a crash between the two renames is detected on
//! the next load as a mismatched pair.

use crate::error::Result;
use crate::types::{Document, Embedding};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";

#[derive(Serialize, Deserialize)]
struct VectorArtifact {
    snapshot: Uuid,
    dimension: usize,
    vectors: Vec<Embedding>,
}

#[derive(Serialize, Deserialize)]
struct DocumentArtifact {
    snapshot: Uuid,
    documents: Vec<Document>,
}

/// What was found on disk
pub(crate) enum StoreRead {
    Missing,
    Corrupt(String),
    Loaded(Vec<(Document, Embedding)>),
}

pub(crate) struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    fn documents_path(&self) -> PathBuf {
        self.dir.join(DOCUMENTS_FILE)
    }

    /// Write both artifacts. `pairs` order is preserved exactly.
    pub fn save<'a, I>(&self, dimension: usize, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a Document, &'a Embedding)>,
    {
        fs::create_dir_all(&self.dir)?;

        let snapshot = Uuid::now_v7();
        let (documents, vectors): (Vec<Document>, Vec<Embedding>) = pairs
            .into_iter()
            .map(|(d, v)| (d.clone(), v.clone()))
            .unzip();

        let vector_bytes = bincode::serialize(&VectorArtifact {
            snapshot,
            dimension,
            vectors,
        })?;
        let document_bytes = serde_json::to_vec(&DocumentArtifact {
            snapshot,
            documents,
        })?;

        write_atomic(&self.vectors_path(), &vector_bytes)?;
        write_atomic(&self.documents_path(), &document_bytes)?;
        Ok(())
    }

    /// Read both artifacts and check they belong together.
    pub fn load(&self, expected_dimension: usize) -> StoreRead {
        let vectors_path = self.vectors_path();
        let documents_path = self.documents_path();

        match (vectors_path.exists(), documents_path.exists()) {
            (false, false) => return StoreRead::Missing,
            (true, false) => return StoreRead::Corrupt(format!("{} is missing", DOCUMENTS_FILE)),
            (false, true) => return StoreRead::Corrupt(format!("{} is missing", VECTORS_FILE)),
            (true, true) => {}
        }

        let vectors: VectorArtifact = match fs::read(&vectors_path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| bincode::deserialize(&bytes).map_err(|e| e.to_string()))
        {
            Ok(v) => v,
            Err(e) => return StoreRead::Corrupt(format!("{}: {}", VECTORS_FILE, e)),
        };

        let documents: DocumentArtifact = match fs::read(&documents_path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
        {
            Ok(d) => d,
            Err(e) => return StoreRead::Corrupt(format!("{}: {}", DOCUMENTS_FILE, e)),
        };

        if vectors.snapshot != documents.snapshot {
            return StoreRead::Corrupt("artifacts come from different snapshots".to_string());
        }
        if vectors.vectors.len() != documents.documents.len() {
            return StoreRead::Corrupt(format!(
                "{} vectors but {} documents",
                vectors.vectors.len(),
                documents.documents.len()
            ));
        }
        if vectors.dimension != expected_dimension {
            return StoreRead::Corrupt(format!(
                "stored dimension {} does not match embedder dimension {}",
                vectors.dimension, expected_dimension
            ));
        }
        if let Some(bad) = vectors.vectors.iter().position(|v| v.len() != expected_dimension) {
            return StoreRead::Corrupt(format!("vector {} has the wrong dimension", bad));
        }

        StoreRead::Loaded(documents.documents.into_iter().zip(vectors.vectors).collect())
    }

    /// Remove both artifacts if present.
    pub fn remove(&self) -> Result<()> {
        for path in [self.vectors_path(), self.documents_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provenance;
    use tempfile::TempDir;

    fn doc(title: &str) -> Document {
        Document::new(title, vec!["Ada".into()], "", Provenance::new("arxiv", "")).unwrap()
    }

    #[test]
    fn test_missing_store() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path().join("index"));
        assert!(matches!(store.load(2), StoreRead::Missing));
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());

        let docs = vec![doc("A"), doc("B"), doc("C")];
        let vecs = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        store.save(2, docs.iter().zip(vecs.iter())).unwrap();

        match store.load(2) {
            StoreRead::Loaded(pairs) => {
                let titles: Vec<_> = pairs.iter().map(|(d, _)| d.title().to_string()).collect();
                assert_eq!(titles, vec!["A", "B", "C"]);
                assert_eq!(pairs[2].1, vec![0.6, 0.8]);
            }
            _ => panic!("expected loaded store"),
        }
        assert!(!dir.path().join("vectors.tmp").exists());
    }

    #[test]
    fn test_half_present_store_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        store.save(2, [(&doc("A"), &vec![1.0, 0.0])]).unwrap();
        fs::remove_file(dir.path().join(DOCUMENTS_FILE)).unwrap();

        assert!(matches!(store.load(2), StoreRead::Corrupt(_)));
    }

    #[test]
    fn test_snapshot_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());

        store.save(2, [(&doc("A"), &vec![1.0, 0.0])]).unwrap();
        let old_docs = fs::read(dir.path().join(DOCUMENTS_FILE)).unwrap();
        store.save(2, [(&doc("B"), &vec![0.0, 1.0])]).unwrap();
        fs::write(dir.path().join(DOCUMENTS_FILE), old_docs).unwrap();

        match store.load(2) {
            StoreRead::Corrupt(reason) => assert!(reason.contains("snapshot")),
            _ => panic!("expected corrupt store"),
        }
    }

    #[test]
    fn test_dimension_mismatch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        store.save(2, [(&doc("A"), &vec![1.0, 0.0])]).unwrap();

        assert!(matches!(store.load(384), StoreRead::Corrupt(_)));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(VECTORS_FILE), b"not bincode").unwrap();
        fs::write(dir.path().join(DOCUMENTS_FILE), b"{").unwrap();

        let store = IndexStore::new(dir.path());
        assert!(matches!(store.load(2), StoreRead::Corrupt(_)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::new(dir.path());
        store.save(2, [(&doc("A"), &vec![1.0, 0.0])]).unwrap();

        store.remove().unwrap();
        store.remove().unwrap();
        assert!(matches!(store.load(2), StoreRead::Missing));
    }
}
