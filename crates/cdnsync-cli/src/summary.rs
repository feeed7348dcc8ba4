use cdnsync_operations::{PackageStatus, SyncReport};
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use tabled::{
    builder::Builder,
    settings::{themes::BorderCorrection, Panel, Style},
};
use tracing::{info, warn};

use crate::utils::Colored;

fn status_cell(status: &PackageStatus) -> String {
    match status {
        PackageStatus::UpToDate => "up to date".to_string(),
        PackageStatus::Published => format!("{}", Colored(Green, "published")),
        PackageStatus::Repaired => format!("{}", Colored(Green, "repaired")),
        PackageStatus::Skipped(reason) => format!("{} {reason}", Colored(Yellow, "skipped:")),
        PackageStatus::Failed(reason) => format!("{} {reason}", Colored(Red, "failed:")),
    }
}

pub fn display_sync_report(report: &SyncReport) {
    if report.packages.is_empty() {
        info!("No packages synced");
        return;
    }

    let mut builder = Builder::new();
    builder.push_record(["Package", "Status", "Published", "Repaired", "Skipped", "Current"]);

    for package in &report.packages {
        let skipped = package
            .skipped_versions
            .iter()
            .map(|(version, _)| version.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        builder.push_record([
            format!("{}", Colored(Cyan, &package.name)),
            status_cell(&package.status),
            package.published.join(", "),
            package.repaired.join(", "),
            skipped,
            package.current_version.clone().unwrap_or_else(|| "-".into()),
        ]);
    }

    let table = builder
        .build()
        .with(Panel::header("Sync Summary"))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .to_string();

    info!("\n{table}");
    info!(
        "{} version(s) published across {} package(s)",
        report.published_count(),
        report.packages.len()
    );

    if report.cancelled {
        warn!("Run was cancelled; remaining packages are picked up next time");
    }
}
