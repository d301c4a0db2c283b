//! Plain-text tables for CLI output.

use crate::models::LogEntry;

const HEADERS: [&str; 4] = ["Timestamp", "Level", "Pipeline", "Message"];

/// Render logs as an aligned table with a title line.
///
/// Example output:
/// ```text
/// Pipeline Logs
/// Timestamp            Level    Pipeline   Message
/// -------------------  -------  ---------  ----------------------------
/// 2024-05-01 10:00:00  ERROR    ETL_Job_1  Airflow DAG failed
/// ```
pub fn render_log_table(title: &str, logs: &[LogEntry]) -> String {
    let rows: Vec<[String; 4]> = logs
        .iter()
        .map(|log| {
            [
                log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                log.level.to_string(),
                log.pipeline.clone().unwrap_or_else(|| "N/A".to_string()),
                log.message.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    output.push_str(title);
    output.push('\n');
    push_row(&mut output, &HEADERS.map(String::from), &widths);
    push_row(&mut output, &widths.map(|w| "-".repeat(w)), &widths);
    for row in &rows {
        push_row(&mut output, row, &widths);
    }
    output
}

fn push_row(output: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    output.push_str(line.trim_end());
    output.push('\n');
}
