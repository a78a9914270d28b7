use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use instant_distance::{Builder, HnswMap, Point, Search};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IndexError;

/// Fixed build seed so rebuilding from the same embeddings yields the
/// same graph.
const HNSW_SEED: u64 = 0x6d65_6469_6177_6174;

/// Build-time effort knob, the HNSW analogue of a tree count.
const EF_CONSTRUCTION: usize = 100;

/// One title's embedding, as stored in the ANN structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleVector(pub Vec<f32>);

impl Point for TitleVector {
    fn distance(&self, other: &Self) -> f32 {
        // The index orders by smaller-is-closer; scores reported to
        // callers are the raw (unnormalised) dot product, so negate here
        // and un-negate on the way out.
        -dot(&self.0, &other.0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Immutable ANN index over title embeddings.
///
/// Built from storage in one shot, then only read. Rebuilds produce a
/// fresh instance that is swapped in atomically via [`SharedIndex`].
pub struct SimilarityIndex {
    map: HnswMap<TitleVector, i64>,
    by_title: HashMap<i64, TitleVector>,
    built_at: SystemTime,
}

impl SimilarityIndex {
    /// Build from all stored embeddings. Empty input is an error: an
    /// index with nothing in it answers no query usefully.
    pub fn build(embeddings: Vec<(i64, Vec<f32>)>) -> Result<Self, IndexError> {
        if embeddings.is_empty() {
            return Err(IndexError::Empty);
        }

        let mut points = Vec::with_capacity(embeddings.len());
        let mut values = Vec::with_capacity(embeddings.len());
        let mut by_title = HashMap::with_capacity(embeddings.len());
        for (title_id, vector) in embeddings {
            let point = TitleVector(vector);
            points.push(point.clone());
            values.push(title_id);
            by_title.insert(title_id, point);
        }

        let map = Builder::default()
            .seed(HNSW_SEED)
            .ef_construction(EF_CONSTRUCTION)
            .build(points, values);

        info!(titles = by_title.len(), "Similarity index built");
        Ok(Self {
            map,
            by_title,
            built_at: SystemTime::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }

    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }

    /// For each queried title, up to `k` nearest other titles with their
    /// dot-product scores, filtered by `predicate`. Every queried title
    /// must be present in the index.
    pub fn search(
        &self,
        title_ids: &[i64],
        k: usize,
        predicate: impl Fn(f32) -> bool,
    ) -> Result<Vec<(i64, Vec<(i64, f32)>)>, IndexError> {
        // Validate everything up front so one unknown id fails the whole
        // call instead of returning a partial answer.
        let queries: Vec<(i64, &TitleVector)> = title_ids
            .iter()
            .map(|&id| {
                self.by_title
                    .get(&id)
                    .map(|point| (id, point))
                    .ok_or(IndexError::UnknownTitle(id))
            })
            .collect::<Result<_, _>>()?;

        let mut results = Vec::with_capacity(queries.len());
        for (title_id, point) in queries {
            let mut search = Search::default();
            let mut hits = Vec::new();
            for item in self.map.search(point, &mut search) {
                let other = *item.value;
                if other == title_id {
                    continue;
                }
                let score = -item.distance;
                if !predicate(score) {
                    continue;
                }
                hits.push((other, score));
                if hits.len() == k {
                    break;
                }
            }
            results.push((title_id, hits));
        }
        Ok(results)
    }

    /// Persist as two companion files: the binary ANN structure and the
    /// title-id ↔ vector mapping.
    pub fn save(&self, index_path: &Path, mapping_path: &Path) -> Result<(), IndexError> {
        let index_file = BufWriter::new(File::create(index_path)?);
        bincode::serialize_into(index_file, &self.map)?;

        let mut mapping: Vec<(i64, &TitleVector)> = self.by_title.iter().map(|(k, v)| (*k, v)).collect();
        mapping.sort_by_key(|(id, _)| *id);
        let mapping_file = BufWriter::new(File::create(mapping_path)?);
        bincode::serialize_into(mapping_file, &mapping)?;

        info!(
            index = %index_path.display(),
            mapping = %mapping_path.display(),
            titles = self.by_title.len(),
            "Similarity index saved"
        );
        Ok(())
    }

    /// Load a previously saved index. The loaded instance answers
    /// `search` exactly like the instance that saved it.
    pub fn load(index_path: &Path, mapping_path: &Path) -> Result<Self, IndexError> {
        let map: HnswMap<TitleVector, i64> =
            bincode::deserialize_from(BufReader::new(File::open(index_path)?))?;
        let mapping: Vec<(i64, TitleVector)> =
            bincode::deserialize_from(BufReader::new(File::open(mapping_path)?))?;

        let built_at = std::fs::metadata(index_path)?
            .modified()
            .unwrap_or_else(|_| SystemTime::now());

        Ok(Self {
            map,
            by_title: mapping.into_iter().collect(),
            built_at,
        })
    }

    /// Whether the on-disk index is newer than this instance.
    pub fn is_stale(&self, index_path: &Path) -> bool {
        match std::fs::metadata(index_path).and_then(|m| m.modified()) {
            Ok(on_disk) => on_disk > self.built_at,
            Err(_) => false,
        }
    }
}

/// Read-mostly handle over the current index. Rebuilds replace the
/// whole instance; readers observe either the old or the new build,
/// never a partial one.
#[derive(Clone, Default)]
pub struct SharedIndex {
    inner: Arc<RwLock<Option<Arc<SimilarityIndex>>>>,
}

impl SharedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn swap(&self, index: SimilarityIndex) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(index));
    }

    pub fn current(&self) -> Option<Arc<SimilarityIndex>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
