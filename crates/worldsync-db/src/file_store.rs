//! Directory-backed change form store.
//!
//! Each reference is one pretty-printed JSON document named after its
//! `formDesc`, with the `:` separator replaced by `@` (`14@Skyrim.esm.json`,
//! `ff000001.json`). Writes go to a temporary file first and are renamed
//! into place, so a crash mid-write never leaves a truncated document.

use std::fs;
use std::path::{Path, PathBuf};

use worldsync_types::{ChangeForm, FormDesc};

use crate::error::StoreError;
use crate::storage::{ChangeFormBatch, SaveStorage};

const EXTENSION: &str = "json";

/// Snapshots stored as one JSON file per reference.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    name: String,
}

impl FileStore {
    /// Open (and create if missing) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let name = format!("file:{}", dir.display());
        tracing::info!(dir = %dir.display(), "opened file change form store");
        Ok(Self { dir, name })
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding `desc`.
    pub fn path_for(&self, desc: &FormDesc) -> PathBuf {
        let stem = desc.to_string().replace(':', "@");
        self.dir.join(format!("{stem}.{EXTENSION}"))
    }

    fn write_one(&self, form: &ChangeForm) -> Result<(), StoreError> {
        let path = self.path_for(&form.form_desc);
        let tmp = path.with_extension("tmp");
        let doc = form.to_json()?;
        let text = serde_json::to_string_pretty(&doc)
            .map_err(|e| StoreError::Snapshot(e.into()))?;

        fs::write(&tmp, text).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io { path, source })
    }
}

impl SaveStorage for FileStore {
    fn upsert(&mut self, batch: ChangeFormBatch) -> Result<usize, StoreError> {
        let mut written: usize = 0;
        for form in batch.iter().flatten() {
            self.write_one(form)?;
            written = written.saturating_add(1);
        }
        Ok(written)
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(io_err)?
            .map(|entry| entry.map(|e| e.path()).map_err(io_err))
            .collect::<Result<_, _>>()?;
        paths.retain(|p| p.extension().is_some_and(|ext| ext == EXTENSION));
        paths.sort();

        for path in paths {
            let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let form = ChangeForm::from_json_str(&text)?;
            visit(form);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
