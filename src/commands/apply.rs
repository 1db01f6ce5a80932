//! `stagehand apply` - converge the system to a manifest

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use colored::Colorize;
use declarative::{FileStore, Report, ResourceExt, Transaction, TransactionOptions};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Settings;
use crate::progress::ApplyProgress;
use crate::ui;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let settings = Settings::load()?;
    let options = transaction_options(&settings, args);
    let catalog = super::load_catalog(&args.manifest)?;

    let state_path = settings.state_path()?;
    let store = FileStore::open(&state_path)
        .with_context(|| format!("Failed to open state file: {}", state_path.display()))?;

    if !ctx.quiet {
        ui::header(&format!("Applying catalog {}", catalog.name()));
        ui::kv("Manifest", &args.manifest.display().to_string());
        ui::kv("State", &state_path.display().to_string());
        if !options.tags.is_empty() {
            ui::kv("Tags", &options.tags.join(", "));
        }
        println!();
        if options.noop {
            ui::warn("Noop mode: changes are reported, not applied");
        }
    }

    if !options.noop && !args.yes && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    let noop = options.noop;
    let mut transaction = Transaction::new(catalog, &store, options);
    let graph = transaction.relationship_graph()?;
    let total = graph
        .graph()
        .vertices()
        .filter(|v| graph.resource(v).is_some_and(|r| !r.is_whit()))
        .count();

    let mut progress = ApplyProgress::new(total, ctx.quiet);
    let result = transaction.evaluate(&mut progress);
    progress.finish();

    store
        .save()
        .with_context(|| format!("Failed to save state file: {}", state_path.display()))?;

    let report = transaction.into_report();
    if !ctx.quiet {
        print_summary(&report, noop);
    }
    result.context("Run aborted")?;

    if !report.summary.is_success() {
        bail!("{} failed", ui::plural(report.summary.failed, "resource"));
    }
    Ok(())
}

/// Command-line flags win over settings
fn transaction_options(settings: &Settings, args: &ApplyArgs) -> TransactionOptions {
    TransactionOptions {
        noop: args.noop || settings.noop,
        ignore_schedules: args.ignore_schedules || settings.ignore_schedules,
        tags: if args.tags.is_empty() {
            settings.tags.clone()
        } else {
            args.tags.clone()
        },
    }
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_summary(report: &Report, noop: bool) {
    let summary = &report.summary;
    println!();
    if !summary.is_success() {
        println!("  {} Catalog applied with errors", "⚠".yellow().bold());
    } else if noop {
        println!("  {} Noop run finished, nothing was changed", "ℹ".blue().bold());
    } else {
        println!("  {} Catalog applied successfully!", "✓".green().bold());
    }

    if summary.changed > 0 {
        println!(
            "    • {} changed ({})",
            ui::plural(summary.changed, "resource"),
            ui::plural(summary.events, "event")
        );
    }
    if noop && summary.out_of_sync > 0 {
        println!("    • {} out of sync", ui::plural(summary.out_of_sync, "resource"));
    }
    if summary.corrective > 0 {
        println!("    • {} corrective", ui::plural(summary.corrective, "change"));
    }
    if summary.restarted > 0 {
        println!("    • {} refreshed", ui::plural(summary.restarted, "resource"));
    }
    if summary.unchanged > 0 {
        println!("    • {} unchanged", ui::plural(summary.unchanged, "resource"));
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", ui::plural(summary.skipped, "resource"));
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }

    let elapsed = Utc::now() - report.time;
    ui::dim(&format!(
        "Finished in {:.2}s",
        elapsed.num_milliseconds() as f64 / 1000.0
    ));
}

// ============================================================================
// Tests
// ============================================================================
