//! Formatting utilities for table output and age display

use armada_registry::Cluster;
use chrono::{DateTime, Utc};

/// Headers for cluster tables
pub const CLUSTER_HEADERS: &[&str] = &["SERVER", "NAME", "PROJECT", "NAMESPACES", "REFRESH"];

/// Format a timestamp as a human-readable age (e.g., "2d", "5h", "30m", "15s")
pub fn format_age(timestamp: &DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(*timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }
    if duration.num_days() > 0 {
        return format!("{}d", duration.num_days());
    }
    if duration.num_hours() > 0 {
        return format!("{}h", duration.num_hours());
    }
    if duration.num_minutes() > 0 {
        return format!("{}m", duration.num_minutes());
    }
    format!("{}s", total_secs)
}

/// One table row for a cluster
pub fn cluster_row(cluster: &Cluster) -> Vec<String> {
    let namespaces = if cluster.namespaces.is_empty() {
        "*".to_string()
    } else {
        cluster.namespaces.join(",")
    };
    let refresh = cluster
        .refresh_requested_at
        .as_ref()
        .map(|ts| format!("{} ago", format_age(ts)))
        .unwrap_or_else(|| "-".to_string());
    vec![
        cluster.server.clone(),
        cluster.name.clone(),
        or_dash(&cluster.project),
        namespaces,
        refresh,
    ]
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Print rows as a column-aligned table with headers.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in render_table(headers, rows) {
        println!("{}", line);
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:<width$}", cell, width = w)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(headers.to_vec())];
    lines.extend(
        rows.iter()
            .map(|row| render(row.iter().map(String::as_str).collect())),
    );
    lines
}
