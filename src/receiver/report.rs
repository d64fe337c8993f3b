//console reports for the operator
use std::io::{self, Write};

use chrono::{DateTime, Local};

use crate::batch::MeasurementBatch;
use crate::session::SessionStore;

const RULE_WIDTH: usize = 60;

pub fn print_banner<W: Write>(out: &mut W, port: &str, output_dir: &str) -> io::Result<()> {
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "  rtlink measurement receiver")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "  Port:   {}", port)?;
    writeln!(out, "  Output: {}", output_dir)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    print_help(out)
}

pub fn print_help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "\n[Commands]")?;
    writeln!(out, "  start   - board starts generating pulses")?;
    writeln!(out, "  send    - board sends collected data (waits for it)")?;
    writeln!(out, "  status  - ask the board for its measurement status")?;
    writeln!(out, "  reset   - discard the board's current measurements")?;
    writeln!(out, "  summary - list sessions and chart them together")?;
    writeln!(out, "  save    - write every received session to one file")?;
    writeln!(out, "  plot    - redraw the charts of the latest batch")?;
    writeln!(out, "  help    - show this list")?;
    writeln!(out, "  exit    - close the connection and quit")?;
    writeln!(out, "  Ctrl-C  - quit once the current command ends; at the prompt, press Enter after it")
}

pub fn print_batch<W: Write>(out: &mut W, batch: &MeasurementBatch, at: &DateTime<Local>) -> io::Result<()> {
    writeln!(out, "\n{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "SESSION: {}  [{}]", batch.session_id, batch.shape().label())?;
    match batch.measurements_per_group {
        Some(per_group) => writeln!(out, "GROUPS: {} x {} measurements", batch.groups(), per_group)?,
        None => writeln!(out, "GROUPS: {}", batch.groups())?,
    }
    writeln!(out, "TIME: {}", at.format("%H:%M:%S"))?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;

    let figures: Vec<_> = batch
        .shape()
        .overall_columns()
        .iter()
        .filter_map(|c| batch.overall(c.block, c.kind).map(|v| (c.column, v)))
        .collect();
    if figures.is_empty() {
        writeln!(out, "  no overall statistics in batch")?;
    }
    for (column, value) in figures {
        writeln!(out, "  {:<24}{:>12.2} us", column, value)?;
    }
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}

pub fn print_sessions<W: Write>(out: &mut W, store: &SessionStore) -> io::Result<()> {
    writeln!(out, "\n{} session(s) received:", store.len())?;
    for (i, entry) in store.all().iter().enumerate() {
        let primary = entry.batch.series.primary();
        let mean = if primary.is_empty() {
            0.0
        } else {
            primary.iter().sum::<f64>() / primary.len() as f64
        };
        writeln!(
            out,
            "  [{}] session {} ({}, {} groups, mean {:.2} us) at {}",
            i + 1,
            entry.session_id(),
            entry.batch.shape().label(),
            entry.batch.groups(),
            mean,
            entry.received_at.format("%H:%M:%S")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Series;
    use serde_json::json;

    fn batch() -> MeasurementBatch {
        MeasurementBatch {
            session_id: "3".to_string(),
            groups_count: Some(2),
            measurements_per_group: Some(100),
            series: Series::ResponsePeriod {
                avg_response_us: vec![10.0, 20.0],
                rms_response_us: vec![1.0, 2.0],
                avg_period_us: None,
                rms_period_us: None,
            },
            statistics: json!({"response_time": {"overall_avg_us": 15.0}}).as_object().cloned(),
            parameters: None,
        }
    }

    #[test]
    fn test_batch_report_lists_present_figures() {
        let mut out = Vec::new();
        print_batch(&mut out, &batch(), &Local::now()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("SESSION: 3  [response/period]"));
        assert!(text.contains("GROUPS: 2 x 100 measurements"));
        assert!(text.contains("overall_avg_response"));
        assert!(!text.contains("overall_rms_period"));
    }

    #[test]
    fn test_help_explains_interrupt_at_prompt() {
        let mut out = Vec::new();
        print_banner(&mut out, "/dev/ttyACM0", "measurements").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Port:   /dev/ttyACM0"));
        assert!(text.contains("Ctrl-C"));
        assert!(text.contains("press Enter"));
    }

    #[test]
    fn test_session_listing() {
        let mut store = SessionStore::new();
        store.append(batch(), Local::now());
        store.append(batch(), Local::now());
        let mut out = Vec::new();
        print_sessions(&mut out, &store).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 session(s) received"));
        assert!(text.contains("[2] session 3"));
        assert!(text.contains("mean 15.00 us"));
    }
}
