//! `stagehand check` - validate a manifest without touching the system

use anyhow::{Context as _, Result};
use declarative::ResourceExt;

use crate::Context;
use crate::cli::CheckArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &CheckArgs) -> Result<()> {
    let catalog = super::load_catalog(&args.manifest)?;
    let graph = catalog
        .relationship_graph()
        .with_context(|| format!("Failed to build relationship graph for {}", catalog.name()))?;
    graph.check_cycles()?;

    if ctx.quiet {
        return Ok(());
    }

    let containers = catalog.containers()?.len();
    let managed = catalog
        .resources()
        .iter()
        .filter(|r| !r.is_container())
        .count();

    ui::header(&format!("Catalog {}", catalog.name()));
    ui::kv("Manifest", &args.manifest.display().to_string());
    ui::kv("Resources", &managed.to_string());
    ui::kv("Containers", &containers.to_string());
    ui::kv("Relationships", &catalog.relationships().len().to_string());
    ui::kv(
        "Graph",
        &format!(
            "{} vertices, {} edges",
            graph.vertex_count(),
            graph.graph().edge_count()
        ),
    );
    println!();
    ui::success("No structural errors or dependency cycles");
    Ok(())
}
