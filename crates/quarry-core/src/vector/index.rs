use super::config::{effective_threshold, IndexConfig};
use super::embedding::{document_text, l2_normalize, EmbeddingService};
use super::store::{IndexStore, StoreRead};
use crate::error::{QuarryError, Result};
use crate::types::{Document, Embedding};
use instant_distance::{Builder, HnswMap, Point, Search};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

/// Outcome of loading persisted artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This many entries were restored.
    Loaded(usize),
    /// Nothing on disk (or no store configured). The index is empty.
    Missing,
    /// Artifacts were unreadable or inconsistent. The index is empty.
    Corrupt(String),
}

/// Point-in-time summary of the index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
    /// Entries covered by the HNSW graph; the rest are searched exactly.
    pub graph_size: usize,
    pub model: String,
    pub store_dir: Option<PathBuf>,
}

/// Unit-length vector; distance is `1 - dot`.
#[derive(Clone, Debug)]
struct EmbeddingPoint(Embedding);

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - dot(&self.0, &other.0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Brute-force scores for `entries` at or above `threshold`, tagged with
/// their position in the full entry list (`first` is the slice offset).
fn exact_scores(
    query: &[f32],
    entries: &[IndexEntry],
    first: usize,
    threshold: f32,
) -> Vec<(usize, f32)> {
    entries
        .par_iter()
        .enumerate()
        .map(|(offset, entry)| (first + offset, dot(query, &entry.vector).clamp(-1.0, 1.0)))
        .filter(|(_, score)| *score >= threshold)
        .collect()
}

/// One (document, vector) pair. Kept together so the correspondence can
/// never drift.
struct IndexEntry {
    document: Document,
    vector: Embedding,
}

#[derive(Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    /// Graph over `entries[..graph_len]`, valued by entry position.
    graph: Option<HnswMap<EmbeddingPoint, usize>>,
    graph_len: usize,
}

impl IndexState {
    fn from_pairs(pairs: Vec<(Document, Embedding)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(document, vector)| IndexEntry { document, vector })
                .collect(),
            graph: None,
            graph_len: 0,
        }
    }
}

/// Embedding-backed nearest-neighbour store of documents.
///
/// Append-only between `rebuild()`/`clear()`. Every mutation holds the
/// writer lock for its whole duration, so mutations are serialized while
/// searches only ever wait for the short final swap.
pub struct SimilarityIndex {
    embedder: Arc<dyn EmbeddingService>,
    config: IndexConfig,
    store: Option<IndexStore>,
    state: RwLock<IndexState>,
    writer: Mutex<()>,
}

impl SimilarityIndex {
    /// An empty in-memory index (or one backed by `config.store_dir`
    /// that has not been loaded yet).
    pub fn new(embedder: Arc<dyn EmbeddingService>, config: IndexConfig) -> Self {
        let store = config.store_dir.as_ref().map(IndexStore::new);
        Self {
            embedder,
            config,
            store,
            state: RwLock::new(IndexState::default()),
            writer: Mutex::new(()),
        }
    }

    /// Create the index and restore it from disk. A missing or corrupt
    /// store yields an empty index.
    pub fn open(embedder: Arc<dyn EmbeddingService>, config: IndexConfig) -> Result<Self> {
        let index = Self::new(embedder, config);
        index.reload()?;
        Ok(index)
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn count(&self) -> usize {
        match self.state.read() {
            Ok(state) => state.entries.len(),
            Err(poisoned) => {
                log::warn!("Similarity index state lock is poisoned, reading through it");
                poisoned.into_inner().entries.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let state = self.read_state()?;
        Ok(IndexStats {
            count: state.entries.len(),
            dimension: self.dimension(),
            graph_size: state.graph_len,
            model: self.embedder.model_name().to_string(),
            store_dir: self.store.as_ref().map(|s| s.dir().to_path_buf()),
        })
    }

    /// Snapshot of stored documents in insertion order.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let state = self.read_state()?;
        Ok(state.entries.iter().map(|e| e.document.clone()).collect())
    }

    /// Embed and append documents. Returns how many were added.
    pub fn insert(&self, documents: &[Document]) -> Result<usize> {
        let _guard = self.lock_writer()?;
        self.append(documents.to_vec())
    }

    /// Insert only documents whose case-insensitive title is not already
    /// indexed. Duplicates within `documents` keep the first occurrence.
    pub fn remember(&self, documents: &[Document]) -> Result<usize> {
        let _guard = self.lock_writer()?;

        let mut seen: HashSet<String> = {
            let state = self.read_state()?;
            state.entries.iter().map(|e| e.document.dedup_key()).collect()
        };
        let fresh: Vec<Document> = documents
            .iter()
            .filter(|d| seen.insert(d.dedup_key()))
            .cloned()
            .collect();

        self.append(fresh)
    }

    /// Top-`k` documents whose cosine similarity to `query` is at least
    /// `threshold`, best first. Returned documents carry their score.
    pub fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<(Document, f32)>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let Some(threshold) = effective_threshold(threshold) else {
            return Ok(Vec::new());
        };

        let mut vector = self.embedder.embed(query)?;
        self.check_dimension(&vector)?;
        l2_normalize(&mut vector);

        let state = self.read_state()?;
        let graph_len = state.graph_len;
        let mut hits: Vec<(usize, f32)> = Vec::new();

        if let Some(graph) = &state.graph {
            let point = EmbeddingPoint(vector.clone());
            let mut search = Search::default();
            for item in graph.search(&point, &mut search) {
                let score = (1.0 - item.distance).clamp(-1.0, 1.0);
                // Results arrive nearest first.
                if score < threshold || hits.len() >= k {
                    break;
                }
                hits.push((*item.value, score));
            }
            // A short graph answer may have skipped qualifying entries.
            if hits.len() < k {
                hits = exact_scores(&vector, &state.entries[..graph_len], 0, threshold);
            }
        }

        hits.extend(exact_scores(
            &vector,
            &state.entries[graph_len..],
            graph_len,
            threshold,
        ));

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(pos, score)| (state.entries[pos].document.with_similarity(score), score))
            .collect())
    }

    /// Write the current contents to the configured store.
    pub fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            log::debug!("Similarity index has no store directory, skipping persist");
            return Ok(());
        };

        let _guard = self.lock_writer()?;
        let state = self.read_state()?;
        store.save(
            self.dimension(),
            state.entries.iter().map(|e| (&e.document, &e.vector)),
        )?;

        log::info!(
            "Persisted similarity index ({} entries) to {}",
            state.entries.len(),
            store.dir().display()
        );
        Ok(())
    }

    /// Replace the in-memory contents with what is on disk.
    pub fn reload(&self) -> Result<LoadOutcome> {
        let _guard = self.lock_writer()?;

        let (next, outcome) = match self.store.as_ref().map(|s| s.load(self.dimension())) {
            None | Some(StoreRead::Missing) => (IndexState::default(), LoadOutcome::Missing),
            Some(StoreRead::Corrupt(reason)) => {
                (IndexState::default(), LoadOutcome::Corrupt(reason))
            }
            Some(StoreRead::Loaded(pairs)) => {
                let n = pairs.len();
                (IndexState::from_pairs(pairs), LoadOutcome::Loaded(n))
            }
        };

        match &outcome {
            LoadOutcome::Loaded(n) => log::info!("Loaded similarity index with {} entries", n),
            LoadOutcome::Missing => log::info!("No persisted similarity index, starting empty"),
            LoadOutcome::Corrupt(reason) => {
                log::warn!("Persisted similarity index is corrupt ({}), starting empty", reason)
            }
        }

        *self.write_state()? = next;
        self.refresh_graph(true)?;
        Ok(outcome)
    }

    /// Re-embed every stored document and rebuild the graph. Returns the
    /// entry count. On failure the index is left unchanged.
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self.lock_writer()?;

        let documents: Vec<Document> = {
            let state = self.read_state()?;
            state.entries.iter().map(|e| e.document.clone()).collect()
        };
        let vectors = self.embed_documents(&documents)?;

        let n = documents.len();
        *self.write_state()? = IndexState::from_pairs(documents.into_iter().zip(vectors).collect());
        self.refresh_graph(true)?;

        log::info!("Rebuilt similarity index ({} entries)", n);
        Ok(n)
    }

    /// Drop every entry and remove persisted artifacts.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock_writer()?;
        *self.write_state()? = IndexState::default();
        if let Some(store) = &self.store {
            store.remove()?;
        }
        log::info!("Cleared similarity index");
        Ok(())
    }

    /// Caller must hold the writer lock.
    fn append(&self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let vectors = self.embed_documents(&documents)?;
        let added = documents.len();
        {
            let mut state = self.write_state()?;
            state.entries.extend(
                documents
                    .into_iter()
                    .zip(vectors)
                    .map(|(document, vector)| IndexEntry { document, vector }),
            );
        }
        self.refresh_graph(false)?;

        log::debug!("Added {} documents to similarity index", added);
        Ok(added)
    }

    fn embed_documents(&self, documents: &[Document]) -> Result<Vec<Embedding>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(document_text).collect();
        let mut vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != documents.len() {
            return Err(QuarryError::Capability(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                documents.len()
            )));
        }
        for v in vectors.iter_mut() {
            self.check_dimension(v)?;
            l2_normalize(v);
        }
        Ok(vectors)
    }

    /// Rebuild the HNSW graph when it is worth it, or always when `force`.
    /// Caller must hold the writer lock.
    fn refresh_graph(&self, force: bool) -> Result<()> {
        let (points, len) = {
            let state = self.read_state()?;
            let len = state.entries.len();
            let stale = len - state.graph_len;

            if len < self.config.min_graph_size.max(1) {
                drop(state);
                let mut state = self.write_state()?;
                state.graph = None;
                state.graph_len = 0;
                return Ok(());
            }
            if !force && stale < self.config.graph_rebuild_after {
                return Ok(());
            }

            let points: Vec<EmbeddingPoint> = state
                .entries
                .iter()
                .map(|e| EmbeddingPoint(e.vector.clone()))
                .collect();
            (points, len)
        };

        let values: Vec<usize> = (0..len).collect();
        let graph = Builder::default().build(points, values);

        let mut state = self.write_state()?;
        state.graph = Some(graph);
        state.graph_len = len;
        log::debug!("Built HNSW graph over {} entries", len);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn poison_state(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _state = self.state.write();
            panic!("poisoning similarity index state");
        }));
    }

    #[cfg(test)]
    pub(crate) fn pairs(&self) -> Vec<(Document, Embedding)> {
        match self.state.read() {
            Ok(state) => state
                .entries
                .iter()
                .map(|e| (e.document.clone(), e.vector.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn check_dimension(&self, v: &[f32]) -> Result<()> {
        let expected = self.dimension();
        if v.len() != expected {
            return Err(QuarryError::DimensionMismatch {
                expected,
                got: v.len(),
            });
        }
        Ok(())
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.writer
            .lock()
            .map_err(|_| QuarryError::LockPoisoned("similarity index writer"))
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| QuarryError::LockPoisoned("similarity index state"))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| QuarryError::LockPoisoned("similarity index state"))
    }
}
