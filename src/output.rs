use std::io::{self, Write};

use crate::app::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    /// One compact JSON line per run, so batch callers can append stdout to a log.
    pub fn summary_line(summary: &RunSummary) -> serde_json::Result<String> {
        serde_json::to_string(summary)
    }

    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let line = Self::summary_line(summary).map_err(io::Error::other)?;
        writeln!(io::stdout().lock(), "{line}")
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr so stdout stays clean.
pub struct TerminalOutput;

impl TerminalOutput {
    pub fn format_event(event: &ProgressEvent) -> String {
        match event.elapsed {
            Some(elapsed) => format!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => event.message.clone(),
        }
    }

    pub fn print_summary(summary: &RunSummary) {
        let green = "\x1b[32m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        println!(
            "{cyan}taxid {}: {} records between {} and {}{reset}",
            summary.taxon_id, summary.records, summary.min_length, summary.max_length
        );
        if let (Some(longest), Some(shortest)) = (summary.longest, summary.shortest) {
            println!("{cyan}   longest {longest}, shortest {shortest}{reset}");
        }
        println!("{green}   report: {}{reset}", summary.report_path);
        println!("{green}   chart:  {}{reset}", summary.chart_path);
        println!("Done.");
    }
}

impl ProgressSink for TerminalOutput {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}", Self::format_event(&event));
    }
}
