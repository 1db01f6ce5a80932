pub mod apply;
pub mod check;
pub mod graph;

use anyhow::Result;
use declarative::Catalog;
use std::path::Path;

use crate::manifest::Manifest;

/// Load a manifest file and build its catalog
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let manifest = Manifest::load(path)?;
    manifest.catalog()
}
