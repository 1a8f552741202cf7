//! Directory store for model documents.
//!
//! A saved model is a directory holding one JSON file per document plus a
//! manifest:
//!
//! ```text
//! Classes.json        class name -> definition
//! Compartments.json   "0".."n-1" -> compartment
//! MetaRules.json      "0".."m-1" -> meta-rule
//! MatchedRules.json   "0".."k-1" -> concrete rule
//! Manifest.json       format version + blake3 digest of each file
//! ```
//!
//! The manifest digests are checked on load to detect corrupted or
//! hand-edited files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::error::PersistenceError;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// File holding class definitions.
pub const CLASSES_FILE: &str = "Classes.json";
/// File holding compartments.
pub const COMPARTMENTS_FILE: &str = "Compartments.json";
/// File holding meta-rules.
pub const META_RULES_FILE: &str = "MetaRules.json";
/// File holding matched rules.
pub const MATCHED_RULES_FILE: &str = "MatchedRules.json";
/// File holding the manifest.
pub const MANIFEST_FILE: &str = "Manifest.json";

/// Digest record written next to the documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// On-disk format version.
    pub format_version: u32,
    /// Model name.
    pub model_name: String,
    /// File name -> hex blake3 digest.
    pub digests: BTreeMap<String, String>,
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes documents into a directory and accumulates their digests.
pub struct DocumentWriter {
    dir: PathBuf,
    digests: BTreeMap<String, String>,
}

impl DocumentWriter {
    /// Create the directory if needed.
    pub fn create(dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            digests: BTreeMap::new(),
        })
    }

    /// Serialize `value` as pretty JSON into `file`.
    pub fn write<T: Serialize>(&mut self, file: &str, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json {
            document: file.to_string(),
            source,
        })?;
        let path = self.dir.join(file);
        fs::write(&path, &bytes).map_err(|e| io_err(&path, e))?;
        self.digests
            .insert(file.to_string(), blake3::hash(&bytes).to_hex().to_string());
        debug!(file, bytes = bytes.len(), "document written");
        Ok(())
    }

    /// Write the manifest and return it.
    pub fn finish(self, model_name: &str) -> Result<Manifest, PersistenceError> {
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            model_name: model_name.to_string(),
            digests: self.digests,
        };
        let bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|source| PersistenceError::Json {
                document: MANIFEST_FILE.to_string(),
                source,
            })?;
        let path = self.dir.join(MANIFEST_FILE);
        fs::write(&path, bytes).map_err(|e| io_err(&path, e))?;
        Ok(manifest)
    }
}

/// Reads documents from a directory, verifying digests when a manifest exists.
pub struct DocumentReader {
    dir: PathBuf,
    manifest: Option<Manifest>,
}

impl DocumentReader {
    /// Open a directory. A missing manifest disables digest checks.
    pub fn open(dir: &Path) -> Result<Self, PersistenceError> {
        let path = dir.join(MANIFEST_FILE);
        let manifest = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
            let manifest: Manifest =
                serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Json {
                    document: MANIFEST_FILE.to_string(),
                    source,
                })?;
            if manifest.format_version != FORMAT_VERSION {
                return Err(PersistenceError::Malformed {
                    document: MANIFEST_FILE.to_string(),
                    reason: format!(
                        "unsupported format version {} (expected {FORMAT_VERSION})",
                        manifest.format_version
                    ),
                });
            }
            Some(manifest)
        } else {
            None
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    /// Manifest, if the directory has one.
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Whether `file` exists in the directory.
    #[must_use]
    pub fn contains(&self, file: &str) -> bool {
        self.dir.join(file).exists()
    }

    /// Read and deserialize `file`.
    pub fn read<T: DeserializeOwned>(&self, file: &str) -> Result<T, PersistenceError> {
        let path = self.dir.join(file);
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        if let Some(expected) = self.manifest.as_ref().and_then(|m| m.digests.get(file)) {
            let actual = blake3::hash(&bytes).to_hex().to_string();
            if &actual != expected {
                return Err(PersistenceError::ChecksumMismatch {
                    document: file.to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Json {
            document: file.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_verifies_digest() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DocumentWriter::create(dir.path()).unwrap();
        writer.write("Numbers.json", &vec![1, 2, 3]).unwrap();
        let manifest = writer.finish("test").unwrap();
        assert!(manifest.digests.contains_key("Numbers.json"));

        let reader = DocumentReader::open(dir.path()).unwrap();
        let numbers: Vec<i32> = reader.read("Numbers.json").unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn detects_modified_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DocumentWriter::create(dir.path()).unwrap();
        writer.write("Numbers.json", &vec![1, 2, 3]).unwrap();
        writer.finish("test").unwrap();

        fs::write(dir.path().join("Numbers.json"), b"[1, 2, 4]").unwrap();
        let reader = DocumentReader::open(dir.path()).unwrap();
        let result: Result<Vec<i32>, _> = reader.read("Numbers.json");
        assert!(matches!(result, Err(PersistenceError::ChecksumMismatch { .. })));
    }

    #[test]
    fn reads_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Numbers.json"), b"[7]").unwrap();
        let reader = DocumentReader::open(dir.path()).unwrap();
        assert!(reader.manifest().is_none());
        let numbers: Vec<i32> = reader.read("Numbers.json").unwrap();
        assert_eq!(numbers, vec![7]);
    }
}
