use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::chart::render_png;
use crate::domain::{ArtifactPaths, MAX_RECORDS, ReportTable, SearchCriteria};
use crate::error::TaxlenError;
use crate::fetcher::fetch_records;
use crate::ncbi::EntrezClient;
use crate::report::{to_csv_bytes, write_file_atomic};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub taxon_id: String,
    pub min_length: u64,
    pub max_length: u64,
    pub record_limit: u32,
    pub records: usize,
    pub longest: Option<u64>,
    pub shortest: Option<u64>,
    pub report_path: String,
    pub chart_path: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub table: ReportTable,
    pub artifacts: ArtifactPaths,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: EntrezClient> {
    client: C,
    output_dir: Utf8PathBuf,
}

impl<C: EntrezClient> App<C> {
    pub fn new(client: C, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Fetch, report, chart. Any failure aborts. Both artifacts are rendered before
    /// either is written, and the report is removed again if the chart cannot be
    /// written, so a run leaves both files or neither.
    pub fn run(
        &self,
        criteria: &SearchCriteria,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutput, TaxlenError> {
        let started = Instant::now();
        let artifacts = ArtifactPaths::new(&self.output_dir, criteria.taxon_id());

        sink.event(ProgressEvent {
            message: format!(
                "phase=Fetch; taxon {} length {}..={}",
                criteria.taxon_id(),
                criteria.min_length(),
                criteria.max_length()
            ),
            elapsed: None,
        });
        let records = fetch_records(&self.client, criteria)?;
        if records.is_empty() {
            return Err(TaxlenError::EmptyResult {
                taxon_id: criteria.taxon_id().to_string(),
                min_length: criteria.min_length(),
                max_length: criteria.max_length(),
            });
        }
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} records in range", records.len()),
            elapsed: Some(started.elapsed()),
        });

        let table = ReportTable::from_records(records);
        sink.event(ProgressEvent {
            message: "phase=Render; report and chart".to_string(),
            elapsed: Some(started.elapsed()),
        });
        let csv = to_csv_bytes(&table)?;
        let png = render_png(&table)?;

        sink.event(ProgressEvent {
            message: format!("phase=Report; writing {}", artifacts.report),
            elapsed: Some(started.elapsed()),
        });
        write_file_atomic(&artifacts.report, &csv)?;

        sink.event(ProgressEvent {
            message: format!("phase=Chart; writing {}", artifacts.chart),
            elapsed: Some(started.elapsed()),
        });
        if let Err(err) = write_file_atomic(&artifacts.chart, &png) {
            if let Err(cleanup) = fs::remove_file(artifacts.report.as_std_path()) {
                tracing::warn!(path = %artifacts.report, error = %cleanup, "could not remove report");
            }
            return Err(err);
        }
        tracing::info!(
            report = %artifacts.report,
            chart = %artifacts.chart,
            rows = table.len(),
            "artifacts written"
        );

        let elapsed = started.elapsed();
        sink.event(ProgressEvent {
            message: "phase=Done".to_string(),
            elapsed: Some(elapsed),
        });

        let summary = RunSummary {
            taxon_id: criteria.taxon_id().to_string(),
            min_length: criteria.min_length(),
            max_length: criteria.max_length(),
            record_limit: MAX_RECORDS,
            records: table.len(),
            longest: table.longest().map(|row| row.length),
            shortest: table.shortest().map(|row| row.length),
            report_path: artifacts.report.to_string(),
            chart_path: artifacts.chart.to_string(),
            elapsed_ms: elapsed.as_millis(),
        };

        Ok(RunOutput {
            table,
            artifacts,
            summary,
        })
    }
}
