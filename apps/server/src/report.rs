//! Per-cycle Markdown reports.
//!
//! Each cycle's summary is written to `monitor_<timestamp>.md` in the
//! configured report directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use watchlist_core::{CycleError, RunSummary};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// File name for a cycle started at `summary.timestamp`.
pub fn report_file_name(summary: &RunSummary) -> String {
    format!(
        "monitor_{}.md",
        summary.timestamp.format("%Y-%m-%d_%H-%M-%S-%3f")
    )
}

fn status(summary: &RunSummary) -> &'static str {
    if summary.cancelled {
        "CANCELLED"
    } else if summary.errors.is_empty() {
        "SUCCESS"
    } else {
        "COMPLETED WITH ERRORS"
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn error_target(err: &CycleError) -> String {
    let mut target = match (err.item_id, &err.address) {
        (Some(id), Some(address)) => format!("#{} `{}`", id, address),
        (Some(id), None) => format!("#{}", id),
        _ => "cycle".to_string(),
    };
    if let Some(chain) = err.chain {
        target.push_str(&format!(" ({})", chain));
    }
    if let Some(hash) = &err.transaction_hash {
        target.push_str(&format!(" tx `{}`", hash));
    }
    target
}

/// Render a cycle summary as Markdown.
pub fn render_report(summary: &RunSummary) -> String {
    let mut md = String::from("# Watchlist Monitoring Report\n\n");
    let _ = writeln!(md, "**Timestamp:** {}\n", summary.timestamp.to_rfc3339());
    let _ = writeln!(md, "**Duration:** {:.2} seconds\n", summary.duration_seconds);
    let _ = writeln!(md, "**Status:** {}\n", status(summary));

    md.push_str("## Summary\n\n");
    let _ = writeln!(md, "- **Wallets Checked:** {}", summary.wallets_checked);
    let _ = writeln!(md, "- **New Alerts Created:** {}", summary.alerts_created);
    let _ = writeln!(md, "- **Duplicates Skipped:** {}", summary.duplicates_skipped);
    let _ = writeln!(md, "- **Notifications Sent:** {}", summary.notifications_sent);
    if summary.users_reaped > 0 {
        let _ = writeln!(md, "- **Expired Users Cleaned Up:** {}", summary.users_reaped);
        let _ = writeln!(md, "- **Watchlist Items Deleted:** {}", summary.items_reaped);
    }

    md.push_str("\n## Wallet Details\n\n");
    if summary.items.is_empty() {
        md.push_str("*No watchlist items checked.*\n");
    } else {
        md.push_str("| Item | Address | Chain | Fetched | New | Alerts | Duplicates | Cursor |\n");
        md.push_str("|------|---------|-------|---------|-----|--------|------------|--------|\n");
        let mut items: Vec<_> = summary.items.iter().collect();
        items.sort_by_key(|r| r.item_id);
        for r in items {
            let _ = writeln!(
                md,
                "| {} | `{}` | {} | {} | {} | {} | {} | {} |",
                r.item_id,
                cell(&r.address),
                r.chain,
                r.fetched,
                r.new_transactions,
                r.alerts_created,
                r.duplicates_skipped,
                if r.cursor_advanced { "advanced" } else { "held" }
            );
        }
    }

    if !summary.errors.is_empty() {
        let _ = writeln!(md, "\n## Errors ({})\n", summary.errors.len());
        for err in &summary.errors {
            let _ = writeln!(
                md,
                "- **[{}]** {}: {}",
                err.kind.as_str(),
                error_target(err),
                err.message.replace('\n', " ")
            );
        }
    }

    md.push_str("\n---\n");
    md
}

/// Write the report for `summary` into `dir`, creating it if needed.
pub async fn write_report(dir: &Path, summary: &RunSummary) -> Result<PathBuf, ReportError> {
    let path = dir.join(report_file_name(summary));
    let io_err = |source| ReportError::Io {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(io_err)?;

    let temp_path = path.with_extension("md.tmp");
    tokio::fs::write(&temp_path, render_report(summary))
        .await
        .map_err(io_err)?;
    tokio::fs::rename(&temp_path, &path).await.map_err(io_err)?;

    debug!(path = %path.display(), "Cycle report written");
    Ok(path)
}
