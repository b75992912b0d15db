//! The index manifest (`index.json`).

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{HopdexError, Result};
use crate::index::{MANIFEST_FILE, discard_files};
use crate::index::config::IndexConfig;
use crate::storage::Storage;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// What a reader needs to know before touching the dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub config: IndexConfig,
}

impl IndexManifest {
    pub fn new(config: IndexConfig) -> Self {
        IndexManifest {
            version: MANIFEST_VERSION,
            config,
        }
    }

    /// Load and validate the manifest of an index.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        if !storage.file_exists(MANIFEST_FILE) {
            return Err(HopdexError::index(format!(
                "no {MANIFEST_FILE} found; was the index built?"
            )));
        }
        let mut input = storage.open_input(MANIFEST_FILE)?;
        let mut text = String::new();
        input.read_to_string(&mut text)?;

        let manifest: IndexManifest = serde_json::from_str(&text)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(HopdexError::index(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        manifest.config.validate()?;
        Ok(manifest)
    }

    /// Write the manifest through a temp file and rename it into place.
    /// The temp file is removed if any step fails.
    pub fn store(&self, storage: &dyn Storage) -> Result<()> {
        let (temp_name, mut output) = storage.create_temp_output("manifest")?;
        let written = serde_json::to_writer_pretty(&mut output, self)
            .map_err(HopdexError::from)
            .and_then(|_| output.close());
        drop(output);

        let stored = written.and_then(|_| storage.rename_file(&temp_name, MANIFEST_FILE));
        if stored.is_err() {
            discard_files(storage, &[&temp_name]);
        }
        stored
    }
}
