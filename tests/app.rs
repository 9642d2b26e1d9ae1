use std::fs;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_taxlen::app::{App, ProgressEvent, ProgressSink};
use kira_taxlen::chart::chart_points;
use kira_taxlen::domain::{SearchCriteria, TaxonId};
use kira_taxlen::error::TaxlenError;
use kira_taxlen::ncbi::{EntrezClient, SearchHistory};
use kira_taxlen::output::JsonOutput;
use kira_taxlen::report::read_report;

struct MockEntrez {
    body: Vec<u8>,
}

impl MockEntrez {
    fn from_fixture(path: &str) -> Self {
        Self {
            body: fs::read(path).unwrap(),
        }
    }
}

impl EntrezClient for MockEntrez {
    fn search(&self, _db: &str, _term: &str) -> Result<SearchHistory, TaxlenError> {
        Ok(SearchHistory {
            web_env: "MCID_test".to_string(),
            query_key: "1".to_string(),
            count: 3,
        })
    }

    fn bulk_fetch(
        &self,
        _db: &str,
        _history: &SearchHistory,
        _max_records: u32,
    ) -> Result<Box<dyn Read + Send>, TaxlenError> {
        Ok(Box::new(Cursor::new(self.body.clone())))
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn criteria(min: u64, max: u64) -> SearchCriteria {
    SearchCriteria::new("1280".parse::<TaxonId>().unwrap(), min, max).unwrap()
}

fn output_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

#[test]
fn pipeline_writes_sorted_report_and_chart() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        MockEntrez::from_fixture("tests/fixtures/three_records.gb"),
        output_dir(&temp),
    );

    let result = app.run(&criteria(100, 1000), &JsonOutput).unwrap();

    let lengths: Vec<u64> = result.table.rows().iter().map(|r| r.length).collect();
    assert_eq!(lengths, vec![500, 120]);
    assert!(result.artifacts.report.ends_with("taxid_1280_report.csv"));
    assert!(result.artifacts.chart.ends_with("taxid_1280_plot.png"));

    let csv = fs::read_to_string(result.artifacts.report.as_std_path()).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert_eq!(read_report(&result.artifacts.report).unwrap(), result.table.rows());

    let points = chart_points(&result.table);
    let plotted: Vec<u64> = points.iter().map(|p| p.length).collect();
    assert_eq!(plotted, vec![500, 120]);
    assert!(result.artifacts.chart.as_std_path().exists());

    assert_eq!(result.summary.records, 2);
    assert_eq!(result.summary.longest, Some(500));
    assert_eq!(result.summary.shortest, Some(120));
    assert_eq!(result.summary.record_limit, 500);
}

#[test]
fn rerun_produces_identical_report() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        MockEntrez::from_fixture("tests/fixtures/ties.gb"),
        output_dir(&temp),
    );

    let first = app.run(&criteria(0, 1000), &JsonOutput).unwrap();
    let first_bytes = fs::read(first.artifacts.report.as_std_path()).unwrap();
    let second = app.run(&criteria(0, 1000), &JsonOutput).unwrap();
    let second_bytes = fs::read(second.artifacts.report.as_std_path()).unwrap();

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(chart_points(&first.table), chart_points(&second.table));
}

#[test]
fn empty_fetch_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(MockEntrez { body: Vec::new() }, output_dir(&temp));

    let err = app.run(&criteria(100, 1000), &JsonOutput).unwrap_err();
    assert_matches!(err, TaxlenError::EmptyResult { ref taxon_id, .. } if taxon_id == "1280");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn filter_below_shortest_takes_empty_path() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        MockEntrez::from_fixture("tests/fixtures/three_records.gb"),
        output_dir(&temp),
    );

    let err = app.run(&criteria(0, 79), &JsonOutput).unwrap_err();
    assert_matches!(err, TaxlenError::EmptyResult { max_length: 79, .. });
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn progress_reports_each_phase() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(
        MockEntrez::from_fixture("tests/fixtures/three_records.gb"),
        output_dir(&temp),
    );
    let sink = RecordingSink::default();

    app.run(&criteria(0, 1000), &sink).unwrap();

    let messages = sink.messages.lock().unwrap();
    let phases: Vec<&str> = messages
        .iter()
        .filter_map(|m| m.split(';').next())
        .collect();
    assert_eq!(
        phases,
        vec![
            "phase=Fetch",
            "phase=Fetch",
            "phase=Render",
            "phase=Report",
            "phase=Chart",
            "phase=Done"
        ]
    );
}

#[test]
fn chart_write_failure_leaves_no_report() {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir(temp.path().join("taxid_1280_plot.png")).unwrap();
    let app = App::new(
        MockEntrez::from_fixture("tests/fixtures/three_records.gb"),
        output_dir(&temp),
    );

    let err = app.run(&criteria(100, 1000), &JsonOutput).unwrap_err();
    assert_matches!(err, TaxlenError::Io { ref path, .. } if path.ends_with("taxid_1280_plot.png"));
    assert!(!temp.path().join("taxid_1280_report.csv").exists());
}
