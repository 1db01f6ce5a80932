//! Progress bar for transaction runs

use colored::Colorize;
use declarative::{EventStatus, ProgressCallback, ResourceRef, Status};
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Reports a run on an indicatif bar; failures are printed above it
pub struct ApplyProgress {
    pb: ProgressBar,
}

impl ApplyProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_resource_start(&mut self, resource: &ResourceRef) {
        self.pb.set_message(ui::truncate_path(&resource.to_string(), 40));
    }

    fn on_resource_complete(&mut self, status: &Status) {
        if status.failed || status.failed_to_restart {
            let reason = status
                .failure_reason
                .clone()
                .unwrap_or_else(|| "failed".to_string());
            self.pb.suspend(|| {
                eprintln!("  {} {}: {}", "✗".red(), status.resource, reason);
            });
        } else if status.changed {
            let changes: Vec<String> = status
                .successful_events()
                .map(|event| event.message.clone())
                .collect();
            self.pb.suspend(|| {
                println!("  {} {}: {}", "✓".green(), status.resource, changes.join(", "));
            });
        } else if status.out_of_sync && !status.skipped {
            let pending: Vec<String> = status
                .events
                .iter()
                .filter(|event| event.status == EventStatus::Noop)
                .map(|event| event.message.clone())
                .collect();
            self.pb.suspend(|| {
                println!("  {} {}: {}", "~".yellow(), status.resource, pending.join(", "));
            });
        }
        self.pb.inc(1);
    }

    fn on_generated(&mut self, parent: &ResourceRef, count: usize) {
        if count > 0 {
            log::debug!("{parent}: generated {count} resources");
            self.pb.inc_length(count as u64);
        }
    }
}
