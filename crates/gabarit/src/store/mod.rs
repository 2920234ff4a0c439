//! Filesystem artifact store.
//!
//! A model directory holds one configuration document, a set of opaque blobs
//! and a Markdown usage note. Every write goes to a temporary sibling file
//! that is renamed over the target.
//!
//! Blobs carry the save generation in their file name
//! (`pipeline_standalone.g2.bin`) and the configuration document records
//! which generation it describes. A save writes the new generation's blobs
//! next to the committed ones, replaces the configuration, and only then
//! removes blobs of older generations. Until the configuration is replaced,
//! the directory still loads as the previous snapshot.

pub mod codec;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub use codec::{ArtifactCodec, ArtifactKind};

use crate::error::{ModelError, ModelResult};

pub const CONFIGURATION_FILE: &str = "configurations.json";
pub const STANDALONE_PIPELINE_FILE: &str = "pipeline_standalone.bin";
pub const PREPROCESS_PIPELINE_FILE: &str = "preprocess_pipeline.bin";
pub const AGGREGATION_FUNCTION_FILE: &str = "aggregation_function.bin";
pub const USAGE_NOTE_FILE: &str = "model_upload_instructions.md";
pub const REPRODUCIBILITY_FILE: &str = "reproducibility.json";

/// Configuration field holding the generation of the committed blobs.
pub const GENERATION_FIELD: &str = "save_generation";

const BLOB_EXTENSION: &str = "bin";

/// File name of the full snapshot of `model_name`.
pub fn snapshot_file(model_name: &str) -> String {
    format!("{model_name}.bin")
}

/// On-disk name of blob `file` for save `generation`.
///
/// Generation 0 keeps the plain name, for hand-assembled directories.
///
/// ```
/// use gabarit::store::generation_file;
///
/// assert_eq!(generation_file("pipeline_standalone.bin", 0), "pipeline_standalone.bin");
/// assert_eq!(generation_file("pipeline_standalone.bin", 3), "pipeline_standalone.g3.bin");
/// ```
pub fn generation_file(file: &str, generation: u64) -> String {
    if generation == 0 {
        return file.to_string();
    }
    match file.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}.g{generation}.{ext}"),
        None => format!("{file}.g{generation}"),
    }
}

/// Generation a blob file name was written for, if it carries one.
fn blob_generation(file: &str) -> Option<u64> {
    let stem = file.strip_suffix(BLOB_EXTENSION)?.strip_suffix('.')?;
    let (_, tag) = stem.rsplit_once('.')?;
    tag.strip_prefix('g')?.parse().ok()
}

/// Generation committed by the configuration document in `dir`.
///
/// 0 when there is no configuration yet or it predates generations.
pub fn committed_generation(dir: &Path) -> ModelResult<u64> {
    let path = dir.join(CONFIGURATION_FILE);
    if !path.is_file() {
        return Ok(0);
    }
    let document: serde_json::Value = read_json(&path)?;
    Ok(document.get(GENERATION_FIELD).and_then(serde_json::Value::as_u64).unwrap_or(0))
}

/// Read/write access to one model directory, for one save generation.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    generation: u64,
    codec: ArtifactCodec,
}

impl ArtifactStore {
    /// A store writing plain (generation 0) blob names.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            generation: 0,
            codec: ArtifactCodec::new(),
        }
    }

    /// A store for the generation following the one committed in `dir`.
    pub fn next_generation(dir: impl Into<PathBuf>) -> ModelResult<Self> {
        let dir = dir.into();
        let generation = committed_generation(&dir)? + 1;
        Ok(Self {
            dir,
            generation,
            codec: ArtifactCodec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// On-disk name of blob `file` in this store's generation.
    pub fn blob_file(&self, file: &str) -> String {
        generation_file(file, self.generation)
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Atomically replace `file` with `bytes`.
    pub fn write_atomic(&self, file: &str, bytes: &[u8]) -> ModelResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path(file);
        let mut tmp = tempfile::Builder::new()
            .prefix(".gabarit-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| ModelError::Io(e.error))?;
        debug!(path = %target.display(), bytes = bytes.len(), "artifact written");
        Ok(target)
    }

    /// Write blob `file` under this store's generation.
    pub fn write_blob<T: Serialize>(&self, file: &str, kind: ArtifactKind, value: &T) -> ModelResult<PathBuf> {
        let bytes = self.codec.serialize(kind, value)?;
        self.write_atomic(&self.blob_file(file), &bytes)
    }

    /// Remove blobs stamped with any generation other than this store's.
    /// Call only once the configuration naming this generation is written.
    pub fn sweep_stale_blobs(&self) -> ModelResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let stale = name
                .to_str()
                .and_then(blob_generation)
                .is_some_and(|generation| generation != self.generation);
            if stale && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn write_json<T: Serialize>(&self, file: &str, value: &T) -> ModelResult<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(file, &bytes)
    }

    /// Insert `text` at the top of the usage note, keeping prior content below.
    pub fn prepend_note(&self, text: &str) -> ModelResult<()> {
        let path = self.path(USAGE_NOTE_FILE);
        let previous = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut content = String::with_capacity(text.len() + previous.len() + 2);
        content.push_str(text.trim_end());
        content.push_str("\n\n");
        content.push_str(&previous);
        self.write_atomic(USAGE_NOTE_FILE, content.as_bytes())?;
        Ok(())
    }
}

/// Fail with [`ModelError::ArtifactNotFound`] unless `path` is an existing file.
pub fn require_existing(path: &Path) -> ModelResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ModelError::ArtifactNotFound(path.to_path_buf()))
    }
}

pub fn read_blob<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> ModelResult<T> {
    require_existing(path)?;
    let bytes = fs::read(path)?;
    Ok(ArtifactCodec::new().deserialize(kind, &bytes)?)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> ModelResult<T> {
    require_existing(path)?;
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
