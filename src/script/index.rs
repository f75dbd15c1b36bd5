// src/script/index.rs

//! The precomputed script index.
//!
//! An external generator writes a TOML file mapping categories to script
//! filenames:
//!
//! ```toml
//! [[entry]]
//! category = "default"
//! filename = "banner.nse"
//!
//! [[entry]]
//! category = "discovery"
//! filename = "banner.nse"
//! ```
//!
//! The selector walks these records to resolve category rules without
//! loading every script on disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::Result;

/// One `(category, filename)` record of the index.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    pub category: String,
    pub filename: String,
}

/// The whole index, in file order.
#[derive(Debug, Default, Deserialize)]
pub struct ScriptIndex {
    #[serde(default, rename = "entry")]
    pub entries: Vec<IndexEntry>,
}

/// Read and parse the index file at `path`.
pub fn load_index(path: &Path) -> Result<ScriptIndex> {
    let contents = fs::read_to_string(path)?;
    let index: ScriptIndex = toml::from_str(&contents)?;
    Ok(index)
}
