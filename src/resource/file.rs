//! File resource - plain files and directories

use anyhow::{Context, Result, bail};
use declarative::types::ABSENT;
use declarative::{Catalog, CurrentValues, Property, Relationship, Resource, ResourceRef, SyncError, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const TYPE: &str = "file";

/// Desired state of the path itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensure {
    /// Exists in any form
    Present,
    File,
    Directory,
    Absent,
}

impl Ensure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Absent => ABSENT,
        }
    }
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ensure {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "file" => Ok(Self::File),
            "directory" => Ok(Self::Directory),
            "absent" => Ok(Self::Absent),
            other => bail!("invalid ensure value '{other}' (expected present, file, directory or absent)"),
        }
    }
}

/// A file or directory to manage
#[derive(Debug, Clone)]
pub struct File {
    title: String,
    /// Path on disk (the uniqueness key)
    pub path: PathBuf,
    pub ensure: Option<Ensure>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub noop: bool,
    pub schedule: Option<String>,
    /// Property names whose values are never shown or persisted
    pub sensitive: BTreeSet<String>,
}

impl File {
    /// A file declared under its own path
    #[cfg(test)]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self::titled(&path.to_string_lossy(), &path)
    }

    /// A file declared under a title that differs from its path
    pub fn titled(title: &str, path: impl AsRef<Path>) -> Self {
        Self {
            title: title.to_string(),
            path: path.as_ref().to_path_buf(),
            ensure: None,
            content: None,
            tags: Vec::new(),
            noop: false,
            schedule: None,
            sensitive: BTreeSet::new(),
        }
    }

    pub fn with_ensure(mut self, ensure: Ensure) -> Self {
        self.ensure = Some(ensure);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn property(&self, name: &str, should: impl Into<Value>) -> Property {
        let property = Property::new(name, should);
        if self.sensitive.contains(name) {
            property.sensitive()
        } else {
            property
        }
    }

    /// Managing content implies a plain file
    fn effective_ensure(&self) -> Option<Ensure> {
        self.ensure
            .or_else(|| self.content.as_ref().map(|_| Ensure::File))
    }

    fn current_ensure(&self) -> Ensure {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.is_dir() => Ensure::Directory,
            Ok(_) => Ensure::File,
            Err(_) => Ensure::Absent,
        }
    }

    fn write_content(&self, content: &str) -> Result<()> {
        if self.path.is_dir() {
            bail!("{} is a directory", self.path.display());
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    fn create(&self, ensure: Ensure) -> Result<()> {
        match ensure {
            Ensure::Directory => fs::create_dir_all(&self.path)
                .with_context(|| format!("Failed to create directory {}", self.path.display())),
            _ => self.write_content(self.content.as_deref().unwrap_or_default()),
        }
    }

    fn remove(&self) -> Result<()> {
        match self.current_ensure() {
            Ensure::Directory => fs::remove_dir(&self.path).with_context(|| {
                format!("Failed to remove directory {} (must be empty)", self.path.display())
            }),
            Ensure::Absent => Ok(()),
            _ => fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

fn should_str(property: &Property) -> Option<&str> {
    property.should.as_ref().and_then(Value::as_str)
}

impl Resource for File {
    fn reference(&self) -> ResourceRef {
        ResourceRef::new(TYPE, &self.title)
    }

    fn name(&self) -> Option<String> {
        Some(self.path.to_string_lossy().to_string())
    }

    fn properties(&self) -> Vec<Property> {
        let mut properties = Vec::new();
        let ensure = self.effective_ensure();
        if let Some(ensure) = ensure {
            properties.push(self.property("ensure", ensure.as_str()));
        }
        let managed_content = !matches!(ensure, Some(Ensure::Absent | Ensure::Directory));
        if let Some(content) = self.content.as_ref().filter(|_| managed_content) {
            properties.push(self.property("content", content.as_str()));
        }
        properties
    }

    fn retrieve(&self) -> Result<CurrentValues> {
        let ensure = self.current_ensure();
        let mut current = CurrentValues::new();
        current.insert("ensure".to_string(), ensure.as_str().into());

        let content = match ensure {
            Ensure::File => fs::read_to_string(&self.path)
                .map(Value::String)
                .with_context(|| format!("Failed to read {}", self.path.display()))?,
            _ => Value::Null,
        };
        current.insert("content".to_string(), content);
        Ok(current)
    }

    fn insync(&self, property: &Property, current: &Value) -> bool {
        if property.is_ensure() && should_str(property) == Some(Ensure::Present.as_str()) {
            return current.as_str().is_some_and(|c| c != ABSENT);
        }
        property.insync(current)
    }

    fn sync(&self, property: &Property) -> Result<(), SyncError> {
        let Some(should) = should_str(property) else {
            return Ok(());
        };
        match property.name.as_str() {
            "ensure" => match should.parse::<Ensure>()? {
                Ensure::Absent => self.remove()?,
                Ensure::Directory if self.current_ensure() == Ensure::File => {
                    return Err(SyncError::Recoverable(anyhow::anyhow!(
                        "{} exists as a file",
                        self.path.display()
                    )));
                }
                ensure => self.create(ensure)?,
            },
            "content" => self.write_content(should)?,
            other => {
                return Err(SyncError::Recoverable(anyhow::anyhow!(
                    "unknown property '{other}'"
                )));
            }
        }
        Ok(())
    }

    fn noop(&self) -> bool {
        self.noop
    }

    fn schedule(&self) -> Option<String> {
        self.schedule.clone()
    }

    fn tags(&self) -> Vec<String> {
        self.tags.clone()
    }

    /// The nearest declared ancestor directory comes first
    fn autorequire(&self, catalog: &Catalog) -> Vec<Relationship> {
        self.path
            .ancestors()
            .skip(1)
            .find_map(|dir| catalog.resource(TYPE, &dir.to_string_lossy()))
            .map(|parent| Relationship::new(parent.reference(), self.reference()))
            .into_iter()
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
