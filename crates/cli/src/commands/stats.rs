//! Container and process stat commands

use anyhow::Result;
use governor_lib::store::MetricsStore;
use tabled::Tabled;

use crate::output::{
    color_container, format_count, format_timestamp, print_info, print_json, print_rows,
    print_warning, OutputFormat,
};

/// Row for the container stats table
#[derive(Tabled)]
struct ContainerTableRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Container")]
    container_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "PID")]
    pid: i64,
    #[tabled(rename = "Process")]
    process: String,
    #[tabled(rename = "RAM")]
    ram: String,
    #[tabled(rename = "CPU")]
    cpu: i64,
}

/// Row for the process stats table
#[derive(Tabled)]
struct ProcessTableRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "PID")]
    pid: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "RAM")]
    ram: String,
    #[tabled(rename = "CPU")]
    cpu: i64,
}

pub fn show_containers(store: &MetricsStore, limit: usize, format: OutputFormat) -> Result<()> {
    let rows = store.recent_container_stats(limit)?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                print_info("No container stats recorded yet");
                return Ok(());
            }

            let unmatched = rows
                .iter()
                .filter(|r| r.container_name == governor_lib::recorder::UNKNOWN_CONTAINER)
                .count();

            let table: Vec<ContainerTableRow> = rows
                .into_iter()
                .map(|r| ContainerTableRow {
                    timestamp: format_timestamp(r.timestamp),
                    container_id: r.container_id,
                    name: color_container(&r.container_name),
                    pid: r.pid,
                    process: r.process_name,
                    ram: format_count(r.ram_usage),
                    cpu: r.cpu_usage,
                })
                .collect();

            print_rows(table);

            if unmatched > 0 {
                print_warning(&format!(
                    "{} workload processes could not be matched to a container",
                    unmatched
                ));
            }
        }
    }

    Ok(())
}

pub fn show_processes(store: &MetricsStore, limit: usize, format: OutputFormat) -> Result<()> {
    let rows = store.recent_process_stats(limit)?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                print_info("No process stats recorded yet");
                return Ok(());
            }

            let table: Vec<ProcessTableRow> = rows
                .into_iter()
                .map(|r| ProcessTableRow {
                    timestamp: format_timestamp(r.timestamp),
                    pid: r.pid,
                    name: r.name,
                    ram: format_count(r.ram_usage),
                    cpu: r.cpu_usage,
                })
                .collect();

            print_rows(table);
        }
    }

    Ok(())
}
