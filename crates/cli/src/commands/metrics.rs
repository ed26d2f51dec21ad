//! Cycle metrics commands

use anyhow::Result;
use colored::Colorize;
use governor_lib::store::MetricsStore;
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_deleted, format_count, format_timestamp, print_info, print_json, print_rows,
    OutputFormat,
};

/// Row for the cycle metrics table
#[derive(Tabled)]
struct MetricsTableRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Total RAM")]
    total_ram: String,
    #[tabled(rename = "Free RAM")]
    free_ram: String,
    #[tabled(rename = "Used RAM")]
    used_ram: String,
    #[tabled(rename = "Containers")]
    containers: i64,
    #[tabled(rename = "Processes")]
    processes: i64,
    #[tabled(rename = "Evicted")]
    deleted: String,
}

/// Show the most recent cycles, newest first
pub fn show_metrics(store: &MetricsStore, limit: usize, format: OutputFormat) -> Result<()> {
    let rows = store.recent_metrics(limit)?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                print_info("No cycles recorded yet");
                return Ok(());
            }

            let count = rows.len();
            let table: Vec<MetricsTableRow> = rows
                .into_iter()
                .map(|r| MetricsTableRow {
                    timestamp: format_timestamp(r.timestamp),
                    total_ram: format_count(r.total_ram),
                    free_ram: format_count(r.free_ram),
                    used_ram: format_count(r.used_ram),
                    containers: r.container_count,
                    processes: r.process_count,
                    deleted: color_deleted(r.deleted_count),
                })
                .collect();

            print_rows(table);
            println!("\nShowing {} most recent cycles", count);
        }
    }

    Ok(())
}

/// Summarize every recorded cycle
pub fn show_summary(store: &MetricsStore, database: &Path, format: OutputFormat) -> Result<()> {
    let summary = store.metrics_summary()?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Governor Summary".bold());
            println!("{}", "=".repeat(50));
            println!("Database:               {}", database.display().to_string().cyan());
            println!("Cycles recorded:        {}", format_count(summary.cycles));
            println!(
                "Containers evicted:     {}",
                color_deleted(summary.total_deleted)
            );

            match (summary.first_timestamp, summary.last_timestamp) {
                (Some(first), Some(last)) => {
                    println!("First cycle:            {}", format_timestamp(first));
                    println!("Last cycle:             {}", format_timestamp(last).dimmed());
                }
                _ => print_info("No cycles recorded yet"),
            }
        }
    }

    Ok(())
}
