use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::storage::document::{DocumentPath, Fields};
use crate::backend::storage::traits::StoreError;

const DOCUMENT_EXTENSION: &str = "yaml";
const TEMP_EXTENSION: &str = "tmp";

/// YamlConnection maps document paths to files below a base directory
#[derive(Debug, Clone)]
pub struct YamlConnection {
    base_directory: PathBuf,
}

impl YamlConnection {
    /// Create a connection rooted at `base_directory`, creating it if needed
    pub fn new<P: AsRef<Path>>(base_directory: P) -> Result<Self> {
        let base_path = base_directory.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .with_context(|| format!("Failed to create data directory {}", base_path.display()))?;
            info!("Created data directory {}", base_path.display());
        }

        Ok(Self {
            base_directory: base_path,
        })
    }

    /// Create a connection in the platform data directory
    pub fn new_default() -> Result<Self> {
        Self::new(default_data_directory()?)
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// File holding a document: `users/u1.yaml`, `users/u1/journal/j1.yaml`
    pub fn document_file(&self, path: &DocumentPath) -> Result<PathBuf, StoreError> {
        let segments: Vec<&str> = path.segments().collect();
        for segment in &segments {
            if !is_safe_segment(segment) {
                return Err(StoreError::Malformed {
                    path: path.to_string(),
                    reason: format!("segment '{}' cannot be stored as a file name", segment),
                });
            }
        }

        let mut file = self.base_directory.clone();
        if let Some((id, collection)) = segments.split_last() {
            file.extend(collection);
            file.push(format!("{}.{}", id, DOCUMENT_EXTENSION));
        }
        Ok(file)
    }

    /// Write a document with the temp file + rename pattern
    pub fn write_document(&self, path: &DocumentPath, fields: &Fields) -> Result<(), StoreError> {
        let file = self.document_file(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let yaml_content = serde_yaml::to_string(fields)
            .with_context(|| format!("Failed to serialize document {}", path))?;

        let temp_path = file.with_extension(TEMP_EXTENSION);
        fs::write(&temp_path, yaml_content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &file)
            .with_context(|| format!("Failed to move {} into place", file.display()))?;

        debug!("Saved document {} to {:?}", path, file);
        Ok(())
    }

    pub fn remove_document(&self, path: &DocumentPath) -> Result<(), StoreError> {
        let file = self.document_file(path)?;
        if file.exists() {
            fs::remove_file(&file).with_context(|| format!("Failed to remove {}", file.display()))?;
            debug!("Removed document file {:?}", file);
        }
        Ok(())
    }

    /// Read every document below the base directory. Leftover temp files and
    /// unreadable documents are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<(DocumentPath, Fields)>, StoreError> {
        let mut documents = Vec::new();
        self.load_directory(&self.base_directory, &mut Vec::new(), &mut documents)?;
        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.base_directory.display()
        );
        Ok(documents)
    }

    fn load_directory(
        &self,
        directory: &Path,
        prefix: &mut Vec<String>,
        documents: &mut Vec<(DocumentPath, Fields)>,
    ) -> Result<(), StoreError> {
        let entries = fs::read_dir(directory)
            .with_context(|| format!("Failed to read directory {}", directory.display()))?;

        for entry in entries {
            let entry = entry.map_err(anyhow::Error::from)?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            if path.is_dir() {
                prefix.push(name);
                self.load_directory(&path, prefix, documents)?;
                prefix.pop();
                continue;
            }

            let id = match name.strip_suffix(&format!(".{}", DOCUMENT_EXTENSION)) {
                Some(id) => id.to_string(),
                None => {
                    if name.ends_with(TEMP_EXTENSION) {
                        warn!("Ignoring leftover temp file {:?}", path);
                    }
                    continue;
                }
            };

            let mut segments = prefix.clone();
            segments.push(id);
            let document_path = match DocumentPath::from_segments(segments) {
                Some(document_path) => document_path,
                None => {
                    warn!("Ignoring {:?}: not at a document location", path);
                    continue;
                }
            };

            match read_fields(&path) {
                Ok(fields) => documents.push((document_path, fields)),
                Err(e) => warn!("Skipping unreadable document {:?}: {}", path, e),
            }
        }
        Ok(())
    }
}

fn read_fields(file: &Path) -> Result<Fields> {
    let yaml_content = fs::read_to_string(file)?;
    let fields: Fields = serde_yaml::from_str(&yaml_content)?;
    Ok(fields)
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

/// `<platform data dir>/Habit Engagement`, falling back to the home directory
pub fn default_data_directory() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow!("Could not determine a data directory"))?;
    Ok(base.join("Habit Engagement"))
}
