//! Catalog manifests
//!
//! A manifest is a TOML file declaring stages, classes, components, schedules
//! and resources, plus the relationships between them:
//!
//! ```toml
//! [[stage]]
//! title = "pre"
//! before = ["Stage[main]"]
//!
//! [[class]]
//! title = "nginx"
//!
//! [[resource]]
//! type = "file"
//! title = "/etc/nginx/nginx.conf"
//! content = "..."
//! contained_in = "Class[nginx]"
//! notify = ["Service[nginx]"]
//! ```

use anyhow::{Context, Result};
use declarative::{Catalog, Container, EdgeLabel, Period, Relationship, ResourceRef, Schedule};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::resource;

/// Stage every resource lands in unless told otherwise
pub const MAIN_STAGE: &str = "main";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("{owner}: invalid reference '{value}' in {field}")]
    InvalidReference {
        owner: String,
        field: &'static str,
        value: String,
    },

    #[error("{owner}: cannot be contained in {container}, which is not a stage, class or component")]
    NotAContainer { owner: String, container: ResourceRef },
}

/// Relationship metaparameters shared by every declaration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Edges {
    /// These run before the declaring resource
    #[serde(default)]
    pub require: Vec<String>,
    /// These run after the declaring resource
    #[serde(default)]
    pub before: Vec<String>,
    /// Like `before`, and refresh the target when the declaring resource changes
    #[serde(default)]
    pub notify: Vec<String>,
    /// Like `require`, and refresh the declaring resource when a source changes
    #[serde(default)]
    pub subscribe: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageDecl {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub edges: Edges,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDecl {
    pub title: String,
    /// Stage the class runs in
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub edges: Edges,
}

/// An instance of a defined type, grouping the resources placed in it
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentDecl {
    #[serde(rename = "type")]
    pub type_name: String,
    pub title: String,
    #[serde(default)]
    pub contained_in: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub edges: Edges,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDecl {
    pub name: String,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub repeat: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub type_name: String,
    pub title: String,
    /// Uniqueness key when it differs from the title (a path, a package name)
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ensure: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub noop: bool,
    #[serde(default)]
    pub schedule: Option<String>,
    /// Property names whose values are redacted
    #[serde(default)]
    pub sensitive: Vec<String>,
    #[serde(default)]
    pub contained_in: Option<String>,
    #[serde(flatten)]
    pub edges: Edges,
}

/// A parsed manifest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Catalog name; defaults to the manifest's file stem
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageDecl>,
    #[serde(default, rename = "class")]
    pub classes: Vec<ClassDecl>,
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentDecl>,
    #[serde(default, rename = "schedule")]
    pub schedules: Vec<ScheduleDecl>,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceDecl>,
}

impl Manifest {
    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let mut manifest = Self::parse(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        if manifest.name.is_none() {
            manifest.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string());
        }
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the catalog: every declaration first, then containment, then relationships
    pub fn catalog(&self) -> Result<Catalog> {
        let main = ResourceRef::new("Stage", MAIN_STAGE);
        let mut catalog = Catalog::new(self.name.as_deref().unwrap_or("stagehand"));

        if !self.stages.iter().any(|s| s.title == MAIN_STAGE) {
            catalog.add_resource(Arc::new(Container::stage(MAIN_STAGE)))?;
        }
        for stage in &self.stages {
            catalog
                .add_resource(Arc::new(Container::stage(&stage.title).with_tags(stage.tags.clone())))
                .with_context(|| format!("Stage[{}]", stage.title))?;
        }
        for class in &self.classes {
            catalog.add_class(&class.title);
            catalog
                .add_resource(Arc::new(Container::class(&class.title).with_tags(class.tags.clone())))
                .with_context(|| format!("Class[{}]", class.title))?;
        }
        for component in &self.components {
            let container =
                Container::new(&component.type_name, &component.title).with_tags(component.tags.clone());
            catalog
                .add_resource(Arc::new(container))
                .with_context(|| format!("{}[{}]", component.type_name, component.title))?;
        }
        for schedule in &self.schedules {
            let mut declared = Schedule::new(&schedule.name, schedule.period);
            if let Some(repeat) = schedule.repeat {
                declared = declared.with_repeat(repeat);
            }
            catalog
                .add_resource(Arc::new(declared))
                .with_context(|| format!("Schedule[{}]", schedule.name))?;
        }
        for decl in &self.resources {
            let built = resource::build(decl)
                .with_context(|| format!("{}[{}]", decl.type_name, decl.title))?;
            catalog
                .add_resource(built)
                .with_context(|| format!("{}[{}]", decl.type_name, decl.title))?;
        }

        self.contain(&mut catalog, &main)?;

        for stage in &self.stages {
            add_edges(&mut catalog, &ResourceRef::new("Stage", &stage.title), &stage.edges)?;
        }
        for class in &self.classes {
            add_edges(&mut catalog, &ResourceRef::new("Class", &class.title), &class.edges)?;
        }
        for component in &self.components {
            let owner = ResourceRef::new(&component.type_name, &component.title);
            add_edges(&mut catalog, &owner, &component.edges)?;
        }
        for decl in &self.resources {
            add_edges(&mut catalog, &ResourceRef::new(&decl.type_name, &decl.title), &decl.edges)?;
        }

        log::debug!(
            "Built catalog {} with {} resources",
            catalog.name(),
            catalog.len()
        );
        Ok(catalog)
    }

    fn contain(&self, catalog: &mut Catalog, main: &ResourceRef) -> Result<()> {
        for class in &self.classes {
            let stage = ResourceRef::new("Stage", class.stage.as_deref().unwrap_or(MAIN_STAGE));
            catalog.contain(&stage, &ResourceRef::new("Class", &class.title))?;
        }
        for component in &self.components {
            let owner = ResourceRef::new(&component.type_name, &component.title);
            let container = container_ref(catalog, &owner, component.contained_in.as_deref(), main)?;
            catalog.contain(&container, &owner)?;
        }
        for schedule in &self.schedules {
            catalog.contain(main, &ResourceRef::new("Schedule", &schedule.name))?;
        }
        for decl in &self.resources {
            let owner = ResourceRef::new(&decl.type_name, &decl.title);
            let container = container_ref(catalog, &owner, decl.contained_in.as_deref(), main)?;
            catalog.contain(&container, &owner)?;
        }
        Ok(())
    }
}

fn parse_ref(owner: &ResourceRef, field: &'static str, value: &str) -> Result<ResourceRef, ManifestError> {
    value.parse().map_err(|_| ManifestError::InvalidReference {
        owner: owner.to_string(),
        field,
        value: value.to_string(),
    })
}

fn container_ref(
    catalog: &Catalog,
    owner: &ResourceRef,
    declared: Option<&str>,
    main: &ResourceRef,
) -> Result<ResourceRef> {
    let Some(declared) = declared else {
        return Ok(main.clone());
    };
    let container = parse_ref(owner, "contained_in", declared)?;
    let is_container = catalog
        .lookup(&container)
        .is_some_and(|r| r.kind() == declarative::ResourceKind::Container);
    if !is_container && catalog.contains(&container) {
        return Err(ManifestError::NotAContainer {
            owner: owner.to_string(),
            container,
        }
        .into());
    }
    Ok(container)
}

fn add_edges(catalog: &mut Catalog, owner: &ResourceRef, edges: &Edges) -> Result<()> {
    let mut relationships = Vec::new();
    for value in &edges.require {
        relationships.push(Relationship::new(parse_ref(owner, "require", value)?, owner.clone()));
    }
    for value in &edges.before {
        relationships.push(Relationship::new(owner.clone(), parse_ref(owner, "before", value)?));
    }
    for value in &edges.notify {
        relationships.push(Relationship::labelled(
            owner.clone(),
            parse_ref(owner, "notify", value)?,
            EdgeLabel::refresh(),
        ));
    }
    for value in &edges.subscribe {
        relationships.push(Relationship::labelled(
            parse_ref(owner, "subscribe", value)?,
            owner.clone(),
            EdgeLabel::refresh(),
        ));
    }

    for relationship in relationships {
        let description = relationship.to_string();
        catalog
            .add_relationship(relationship)
            .with_context(|| format!("{owner}: cannot add {description}"))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
name = "web01"

[[stage]]
title = "pre"
before = ["Stage[main]"]

[[class]]
title = "nginx"

[[schedule]]
name = "nightly"
period = "daily"

[[resource]]
type = "file"
title = "/etc/nginx"
ensure = "directory"
contained_in = "Class[nginx]"

[[resource]]
type = "file"
title = "nginx.conf"
name = "/etc/nginx/nginx.conf"
content = "worker_processes 1;"
contained_in = "Class[nginx]"
tags = ["web"]
schedule = "nightly"
sensitive = ["content"]

[[resource]]
type = "file"
title = "/etc/motd"
content = "hello"
require = ["File[/etc/nginx]"]
subscribe = ["File[nginx.conf]"]
"#;

    fn r(type_name: &str, title: &str) -> ResourceRef {
        ResourceRef::new(type_name, title)
    }

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("web01"));
        assert_eq!(manifest.stages.len(), 1);
        assert_eq!(manifest.classes.len(), 1);
        assert_eq!(manifest.schedules[0].period, Some(Period::Daily));
        assert_eq!(manifest.resources.len(), 3);
        assert_eq!(manifest.resources[2].edges.subscribe, vec!["File[nginx.conf]"]);
    }

    #[test]
    fn test_catalog_declarations_and_containment() {
        let catalog = Manifest::parse(SAMPLE).unwrap().catalog().unwrap();

        assert_eq!(catalog.name(), "web01");
        assert!(catalog.contains(&r("Stage", "main")));
        assert!(catalog.contains(&r("Schedule", "nightly")));
        assert!(catalog.classes().contains("nginx"));

        // Reachable by uniqueness key as well as by title
        assert!(catalog.contains(&r("File", "/etc/nginx/nginx.conf")));

        assert_eq!(catalog.container_of(&r("File", "nginx.conf")), Some(r("Class", "nginx")));
        assert_eq!(catalog.container_of(&r("Class", "nginx")), Some(r("Stage", "main")));
        assert_eq!(catalog.container_of(&r("File", "/etc/motd")), Some(r("Stage", "main")));
        assert_eq!(catalog.container_of(&r("Stage", "pre")), None);
    }

    #[test]
    fn test_catalog_relationships() {
        let catalog = Manifest::parse(SAMPLE).unwrap().catalog().unwrap();
        let graph = catalog.graph();

        assert!(graph.has_edge(&r("Stage", "pre"), &r("Stage", "main")));
        assert!(graph.has_edge(&r("File", "/etc/nginx"), &r("File", "/etc/motd")));
        assert_eq!(
            graph.edge_label(&r("File", "nginx.conf"), &r("File", "/etc/motd")),
            Some(&Some(EdgeLabel::refresh()))
        );
    }

    #[test]
    fn test_sensitive_and_tags_carried() {
        let catalog = Manifest::parse(SAMPLE).unwrap().catalog().unwrap();
        let conf = catalog.lookup(&r("File", "nginx.conf")).unwrap();
        let content = conf.properties().into_iter().find(|p| p.name == "content").unwrap();
        assert!(content.sensitive);
        assert_eq!(conf.schedule().as_deref(), Some("nightly"));
        assert!(catalog.tags_of(&r("File", "nginx.conf")).contains("web"));
    }

    #[test]
    fn test_unknown_type() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "package"
title = "nginx"
"#,
        )
        .unwrap();
        let err = manifest.catalog().unwrap_err();
        assert!(format!("{err:#}").contains("unknown resource type 'package'"));
    }

    #[test]
    fn test_unresolved_relationship() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "file"
title = "/tmp/a"
require = ["File[/tmp/missing]"]
"#,
        )
        .unwrap();
        let err = manifest.catalog().unwrap_err();
        assert!(format!("{err:#}").contains("File[/tmp/missing]"));
    }

    #[test]
    fn test_invalid_reference() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "file"
title = "/tmp/a"
before = ["not a reference"]
"#,
        )
        .unwrap();
        let err = manifest.catalog().unwrap_err();
        assert!(err.to_string().contains("invalid reference 'not a reference' in before"));
    }

    #[test]
    fn test_contained_in_non_container() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "file"
title = "/tmp/a"

[[resource]]
type = "file"
title = "/tmp/b"
contained_in = "File[/tmp/a]"
"#,
        )
        .unwrap();
        let err = manifest.catalog().unwrap_err();
        assert!(err.to_string().contains("not a stage, class or component"));
    }

    #[test]
    fn test_duplicate_declaration() {
        let manifest = Manifest::parse(
            r#"
[[resource]]
type = "file"
title = "/tmp/a"

[[resource]]
type = "File"
title = "/tmp/a"
"#,
        )
        .unwrap();
        assert!(manifest.catalog().is_err());
    }

    #[test]
    fn test_load_names_catalog_after_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(&path, "[[class]]\ntitle = \"base\"\n").unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("site"));
        assert_eq!(manifest.catalog().unwrap().name(), "site");
    }
}
