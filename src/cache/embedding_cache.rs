// src/cache/embedding_cache.rs

use half::f16;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;

use crate::errors::{MatchError, MatchResult};
use crate::services::embed_services::EmbeddingService;

const VECTORS_MAGIC: &[u8; 4] = b"F16V";
const VECTORS_FORMAT_VERSION: u32 = 1;
const VECTORS_HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Region-scoped, append-only store of name -> embedding.
///
/// Persisted as two parallel files: `<region>_names.json` (JSON array of names) and
/// `<region>_embeddings.f16` (small header, then row-major little-endian f16 values).
/// Row `i` of the vectors file belongs to entry `i` of the names file.
pub struct EmbeddingCache {
    region: String,
    dir: PathBuf,
    names: Vec<String>,
    index: HashMap<String, usize>,
    dim: usize,
    data: Vec<f16>,
}

impl EmbeddingCache {
    /// Opens the cache for `region`, loading whatever was persisted before.
    pub fn open(cache_dir: &Path, region: &str) -> MatchResult<Self> {
        let mut cache = Self {
            region: region.to_string(),
            dir: cache_dir.to_path_buf(),
            names: Vec::new(),
            index: HashMap::new(),
            dim: 0,
            data: Vec::new(),
        };
        cache.load()?;
        Ok(cache)
    }

    pub fn names_path(&self) -> PathBuf {
        self.dir.join(format!("{}_names.json", self.region))
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(format!("{}_embeddings.f16", self.region))
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Vector width, or 0 while the cache is empty.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Widened copy of the cached vector for `name`.
    pub fn vector(&self, name: &str) -> Option<Vec<f32>> {
        let row = *self.index.get(name)?;
        let start = row * self.dim;
        Some(self.data[start..start + self.dim].iter().map(|v| v.to_f32()).collect())
    }

    /// Appends a vector. Returns `false` if the name was already cached (the old vector stays).
    pub fn insert(&mut self, name: &str, vector: &[f32]) -> MatchResult<bool> {
        if self.index.contains_key(name) {
            return Ok(false);
        }
        if vector.is_empty() {
            return Err(MatchError::InvalidInput(format!(
                "empty embedding for '{}'",
                name
            )));
        }
        if self.dim == 0 {
            self.dim = vector.len();
        } else if vector.len() != self.dim {
            return Err(MatchError::InvalidInput(format!(
                "embedding for '{}' has dimension {}, cache for {} uses {}",
                name,
                vector.len(),
                self.region,
                self.dim
            )));
        }

        self.index.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.data.extend(vector.iter().map(|v| f16::from_f32(*v)));
        Ok(true)
    }

    /// Resolves `names` to vectors in the same order, embedding only the names not yet cached.
    ///
    /// Missing names go out in batches of `service.batch_size()`; the whole cache is
    /// persisted after every batch, so an interruption loses at most one batch.
    pub fn get_vectors(
        &mut self,
        names: &[String],
        service: &EmbeddingService<'_>,
    ) -> MatchResult<Vec<Vec<f32>>> {
        let mut queued = HashSet::new();
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.index.contains_key(n.as_str()) && queued.insert(n.as_str()))
            .cloned()
            .collect();

        let cached = names.len() - missing.len();
        info!(
            "Region {}: cache hit for {} names, {} to embed",
            self.region,
            cached,
            missing.len()
        );

        if !missing.is_empty() {
            let total_batches = missing.len().div_ceil(service.batch_size());
            for (i, batch) in missing.chunks(service.batch_size()).enumerate() {
                let batch_number = i + 1;
                if batch_number % 10 == 0 || batch_number == total_batches {
                    info!(
                        "Region {}: embedding batch {}/{}",
                        self.region, batch_number, total_batches
                    );
                }
                let vectors = service.embed_batch(batch_number, batch)?;
                for (name, vector) in batch.iter().zip(vectors.iter()) {
                    self.insert(name, vector)?;
                }
                self.persist()?;
            }
        }

        names
            .iter()
            .map(|n| {
                self.vector(n).ok_or_else(|| {
                    MatchError::CacheIntegrity(format!("'{}' missing after embedding", n))
                })
            })
            .collect()
    }

    /// Writes both files atomically: vectors first, then names.
    ///
    /// A crash between the two renames leaves extra trailing vector rows, which `open` drops.
    pub fn persist(&self) -> MatchResult<()> {
        let start = Instant::now();
        fs::create_dir_all(&self.dir)?;

        let mut vectors_tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(vectors_tmp.as_file_mut());
            writer.write_all(VECTORS_MAGIC)?;
            writer.write_all(&VECTORS_FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(self.names.len() as u64).to_le_bytes())?;
            writer.write_all(&(self.dim as u64).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
        }
        vectors_tmp.as_file().sync_all()?;
        vectors_tmp
            .persist(self.vectors_path())
            .map_err(|e| MatchError::Io(e.error))?;

        let mut names_tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(names_tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &self.names)?;
            writer.flush()?;
        }
        names_tmp.as_file().sync_all()?;
        names_tmp
            .persist(self.names_path())
            .map_err(|e| MatchError::Io(e.error))?;

        debug!(
            "Region {}: saved {} embeddings to cache in {:.2?}",
            self.region,
            self.names.len(),
            start.elapsed()
        );
        Ok(())
    }

    fn load(&mut self) -> MatchResult<()> {
        let names_path = self.names_path();
        let vectors_path = self.vectors_path();

        let names: Vec<String> = if names_path.exists() {
            let file = fs::File::open(&names_path)?;
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                MatchError::CacheIntegrity(format!("{}: {}", names_path.display(), e))
            })?
        } else {
            Vec::new()
        };

        let (rows, dim, mut data) = if vectors_path.exists() {
            read_vectors(&vectors_path)?
        } else {
            (0, 0, Vec::new())
        };

        if names.len() > rows {
            return Err(MatchError::CacheIntegrity(format!(
                "region {}: {} names but only {} vectors",
                self.region,
                names.len(),
                rows
            )));
        }
        if names.len() < rows {
            warn!(
                "Region {}: dropping {} vector rows without names (interrupted save)",
                self.region,
                rows - names.len()
            );
            data.truncate(names.len() * dim);
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(MatchError::CacheIntegrity(format!(
                    "region {}: duplicate cached name '{}'",
                    self.region, name
                )));
            }
        }

        self.dim = if names.is_empty() { 0 } else { dim };
        self.names = names;
        self.index = index;
        self.data = data;

        if !self.names.is_empty() {
            info!(
                "Region {}: loaded {} cached embeddings (dim {})",
                self.region,
                self.names.len(),
                self.dim
            );
        }
        Ok(())
    }
}

fn read_vectors(path: &Path) -> MatchResult<(usize, usize, Vec<f16>)> {
    let bytes = fs::read(path)?;
    let corrupt = |what: &str| MatchError::CacheIntegrity(format!("{}: {}", path.display(), what));

    if bytes.len() < VECTORS_HEADER_LEN || &bytes[0..4] != VECTORS_MAGIC {
        return Err(corrupt("missing vectors header"));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VECTORS_FORMAT_VERSION {
        return Err(corrupt(&format!("unsupported format version {}", version)));
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[8..16]);
    let rows = u64::from_le_bytes(word) as usize;
    word.copy_from_slice(&bytes[16..24]);
    let dim = u64::from_le_bytes(word) as usize;

    let expected = rows
        .checked_mul(dim)
        .and_then(|cells| cells.checked_mul(2))
        .ok_or_else(|| corrupt("header size overflow"))?;
    let body = &bytes[VECTORS_HEADER_LEN..];
    if body.len() != expected {
        return Err(corrupt(&format!(
            "expected {} bytes of vectors for {} x {}, found {}",
            expected,
            rows,
            dim,
            body.len()
        )));
    }

    let data = body
        .chunks_exact(2)
        .map(|pair| f16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok((rows, dim, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::open(dir.path(), "r").unwrap();
        assert!(cache.insert("a", &[1.0, 2.0]).unwrap());
        assert!(!cache.insert("a", &[9.0, 9.0]).unwrap());
        assert_eq!(cache.vector("a").unwrap(), vec![1.0, 2.0]);
        assert!(cache.insert("b", &[1.0]).is_err());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_round_trip_within_half_precision() {
        let dir = tempfile::tempdir().unwrap();
        let originals = vec![
            ("alpha", vec![0.123456f32, -0.5, 0.999]),
            ("beta", vec![0.0f32, 0.25, -0.75]),
            ("gamma", vec![0.3333f32, 0.6667, -0.1111]),
        ];
        {
            let mut cache = EmbeddingCache::open(dir.path(), "r").unwrap();
            for (name, v) in &originals {
                cache.insert(name, v).unwrap();
            }
            cache.persist().unwrap();
        }

        let reloaded = EmbeddingCache::open(dir.path(), "r").unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.dimension(), 3);
        for (name, v) in &originals {
            let got = reloaded.vector(name).unwrap();
            for (a, b) in got.iter().zip(v.iter()) {
                assert!((a - b).abs() < 1e-3, "{}: {} vs {}", name, a, b);
            }
        }
    }

    #[test]
    fn test_interrupted_save_drops_unnamed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::open(dir.path(), "r").unwrap();
        cache.insert("a", &[1.0, 0.0]).unwrap();
        cache.persist().unwrap();
        let names_snapshot = fs::read(cache.names_path()).unwrap();

        cache.insert("b", &[0.0, 1.0]).unwrap();
        cache.persist().unwrap();
        // simulate a crash after the vectors rename but before the names rename
        fs::write(cache.names_path(), names_snapshot).unwrap();

        let reloaded = EmbeddingCache::open(dir.path(), "r").unwrap();
        assert_eq!(reloaded.names(), &["a".to_string()]);
        assert!(!reloaded.contains("b"));
    }

    #[test]
    fn test_more_names_than_vectors_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::open(dir.path(), "r").unwrap();
        cache.insert("a", &[1.0]).unwrap();
        cache.persist().unwrap();
        fs::write(cache.names_path(), r#"["a","b"]"#).unwrap();

        assert!(matches!(
            EmbeddingCache::open(dir.path(), "r"),
            Err(MatchError::CacheIntegrity(_))
        ));
        // other regions are unaffected
        assert!(EmbeddingCache::open(dir.path(), "other").is_ok());
    }

    #[test]
    fn test_corrupt_vectors_file_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(dir.path(), "r").unwrap();
        fs::write(cache.vectors_path(), b"garbage").unwrap();
        assert!(matches!(
            EmbeddingCache::open(dir.path(), "r"),
            Err(MatchError::CacheIntegrity(_))
        ));
    }
}
