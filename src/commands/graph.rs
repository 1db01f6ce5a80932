//! `stagehand graph` - show how a manifest will be ordered

use anyhow::Result;
use colored::Colorize;
use declarative::{Catalog, RelationshipGraph, ResourceExt};

use crate::Context;
use crate::cli::GraphArgs;
use crate::ui;

pub fn run(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let catalog = super::load_catalog(&args.manifest)?;

    if args.catalog {
        if args.dot {
            print!("{}", catalog.graph().to_dot(catalog.name()));
        } else {
            print_declarations(ctx, &catalog);
        }
        return Ok(());
    }

    let graph = catalog.relationship_graph()?;
    if args.dot {
        print!("{}", graph.graph().to_dot(catalog.name()));
        return Ok(());
    }

    graph.check_cycles()?;
    print_order(ctx, &catalog, &graph);
    Ok(())
}

fn print_declarations(ctx: &Context, catalog: &Catalog) {
    if !ctx.quiet {
        ui::header(&format!("Catalog {} (declaration order)", catalog.name()));
    }
    for reference in catalog.resource_refs() {
        match catalog.container_of(reference) {
            Some(container) => println!("  {reference} {}", format!("in {container}").dimmed()),
            None => println!("  {reference}"),
        }
        for relationship in catalog.graph().out_edges(reference) {
            ui::dim(&format!("  {relationship}"));
        }
    }
}

fn print_order(ctx: &Context, catalog: &Catalog, graph: &RelationshipGraph) {
    if !ctx.quiet {
        ui::header(&format!("Catalog {} (evaluation order)", catalog.name()));
    }
    let mut position = 0;
    for reference in graph.evaluation_order() {
        let priority = graph
            .priority(&reference)
            .map(ToString::to_string)
            .unwrap_or_default();
        let is_whit = graph.resource(&reference).is_some_and(|r| r.is_whit());
        if is_whit {
            if ctx.verbose > 0 {
                ui::dim(&format!("     {reference}"));
            }
            continue;
        }
        position += 1;
        println!("  {position:>3}. {reference} {}", format!("({priority})").dimmed());
    }
}
