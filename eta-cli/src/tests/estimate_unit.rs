//! Unit tests for the `estimate` command's file handling and output.

use std::sync::Arc;

use eta_core::test_support::FixedSpeedLookup;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::helpers::{RequestFiles, engine_settings};
use super::*;
use crate::config::EstimateConfig;
use crate::estimate::{load_estimate_request, run_estimate_with};

const REQUEST: &str = r#"{
    "service_region_id": 1,
    "dispatch_time": "2024-01-02T08:00:00Z",
    "locations": {
        "A": {"latitude": 0, "longitude": 0},
        "B": {"latitude": 1, "longitude": 0},
        "C": {"latitude": 0, "longitude": 1}
    },
    "pairs": {"A": ["B", "missing"], "C": []}
}"#;

#[fixture]
fn files() -> RequestFiles {
    RequestFiles::new()
}

fn run(files: &RequestFiles, contents: &str) -> Result<Vec<u8>, CliError> {
    let config = EstimateConfig {
        engine: engine_settings(),
        request_path: files.write("request.json", contents),
    };
    let mut out = Vec::new();
    run_estimate_with(&config, Arc::new(FixedSpeedLookup::new(10.0)), &mut out)?;
    Ok(out)
}

#[rstest]
fn writes_pretty_estimates(files: RequestFiles) {
    let out = run(&files, REQUEST).expect("estimate succeeds");
    let text = String::from_utf8(out).expect("utf-8 output");
    assert!(text.ends_with('\n'));
    assert!(text.contains("\n  "), "expected indented output: {text}");
    let value: Value = serde_json::from_str(&text).expect("json output");
    assert_eq!(
        value,
        json!({"travel_estimates": {
            "A": {"B": {"distance": 69.09, "time": 6.91}},
            "C": {}
        }})
    );
}

#[rstest]
fn missing_request_file_is_reported(files: RequestFiles) {
    let path = files.root().join("absent.json");
    let err = load_estimate_request(&path).expect_err("file is absent");
    match err {
        CliError::OpenEstimateRequest { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected OpenEstimateRequest, found {other:?}"),
    }
}

#[rstest]
fn malformed_json_is_reported(files: RequestFiles) {
    let err = run(&files, "{ not json").expect_err("malformed");
    assert!(
        matches!(err, CliError::ParseEstimateRequest { .. }),
        "unexpected error {err:?}"
    );
}

#[rstest]
fn invalid_requests_are_rejected_before_estimating(files: RequestFiles) {
    let err = run(
        &files,
        r#"{"service_region_id": 1, "dispatch_time": "2024-01-02T08:00:00Z", "locations": {}}"#,
    )
    .expect_err("pairs missing");
    match err {
        CliError::InvalidEstimateRequest { source, .. } => {
            assert_eq!(source, wire::RequestValidationError::MissingPairs);
        }
        other => panic!("expected InvalidEstimateRequest, found {other:?}"),
    }
}
