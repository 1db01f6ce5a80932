//! Concrete resource types managed by stagehand
//!
//! The engine only knows the `Resource` trait; this module maps manifest
//! declarations onto the types that implement it.

pub mod file;

pub use file::File;

use anyhow::{Context, Result, bail};
use declarative::ResourceHandle;
use std::sync::Arc;

use crate::manifest::ResourceDecl;

/// Resource types a manifest may declare
pub const KNOWN_TYPES: &[&str] = &[file::TYPE];

/// Build a resource from its manifest declaration
pub fn build(decl: &ResourceDecl) -> Result<ResourceHandle> {
    match decl.type_name.to_lowercase().as_str() {
        file::TYPE => Ok(Arc::new(build_file(decl)?)),
        other => bail!(
            "unknown resource type '{other}' (known types: {})",
            KNOWN_TYPES.join(", ")
        ),
    }
}

fn build_file(decl: &ResourceDecl) -> Result<File> {
    let path = decl.name.as_deref().unwrap_or(&decl.title);
    let mut file = File::titled(&decl.title, crate::paths::expand(path));
    if let Some(ensure) = &decl.ensure {
        let ensure = ensure
            .parse()
            .with_context(|| format!("File[{}]: invalid ensure", decl.title))?;
        file = file.with_ensure(ensure);
    }
    if let Some(content) = &decl.content {
        file = file.with_content(content.as_str());
    }
    file.tags.clone_from(&decl.tags);
    file.noop = decl.noop;
    file.schedule.clone_from(&decl.schedule);
    file.sensitive = decl.sensitive.iter().cloned().collect();
    Ok(file)
}
