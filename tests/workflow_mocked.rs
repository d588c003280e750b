//! End-to-end comprehensive analysis against one mocked server standing in
//! for every upstream.

use std::path::PathBuf;

use chrono::NaiveDate;
use serde_json::json;
use tempfile::tempdir;
use valley_tools::config::Config;
use valley_tools::io::excel_read;
use valley_tools::workflow::{AnalysisReport, Step, StepStatus, Toolkit};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_upstreams(server: &MockServer) {
    let routes = [
        (
            "GET",
            "/place/findplacefromtext/json",
            json!({"status": "OK", "candidates": [{"place_id": "big-y"}]}),
        ),
        (
            "GET",
            "/place/details/json",
            json!({"status": "OK", "result": {
                "name": "Big Y",
                "rating": 4.4,
                "reviews": [{"author_name": "Dana", "rating": 5, "text": "Great deli"}]
            }}),
        ),
        (
            "GET",
            "/geocode/json",
            json!({"status": "OK", "results": [{"geometry": {"location": {"lat": 42.1, "lng": -72.6}}}]}),
        ),
        (
            "GET",
            "/place/nearbysearch/json",
            json!({"status": "OK", "results": [
                {"place_id": "a", "name": "Aldi", "rating": 4.0, "user_ratings_total": 100},
                {"place_id": "c", "name": "Costco", "rating": 4.6, "user_ratings_total": 900}
            ]}),
        ),
        (
            "POST",
            "/chat/completions",
            json!({
                "model": "gpt-4o",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "## Overview"}}],
                "usage": {"total_tokens": 42}
            }),
        ),
        ("GET", "/loans", json!([{"loan_number": "L-1", "borrower_state": "MA"}])),
    ];

    for (verb, route, body) in routes {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

fn config(base_url: &str, output_dir: PathBuf, google_key: Option<&str>) -> Config {
    Config {
        google_api_key: google_key.map(str::to_string),
        openai_api_key: Some("sk-test".to_string()),
        google_base_url: base_url.to_string(),
        openai_base_url: base_url.to_string(),
        sba_base_url: base_url.to_string(),
        output_dir,
        ..Config::default()
    }
}

async fn analyze(config: Config) -> AnalysisReport {
    tokio::task::spawn_blocking(move || {
        let started_at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|date| date.and_hms_opt(9, 30, 0))
            .expect("valid timestamp");
        Toolkit::from_config(&config)
            .expect("toolkit builds")
            .comprehensive_analysis("Big Y", "grocery", "Springfield, MA", started_at)
    })
    .await
    .expect("blocking task completes")
}

#[tokio::test]
async fn every_tool_writes_its_artifact() {
    let server = MockServer::start().await;
    mount_upstreams(&server).await;
    let temp_dir = tempdir().expect("temporary directory");

    let report = analyze(config(&server.uri(), temp_dir.path().to_path_buf(), Some("test-key"))).await;

    assert_eq!(
        report.status(Step::Reviews),
        Some(&StepStatus::Completed { records: 1 })
    );
    assert_eq!(
        report.status(Step::Competitors),
        Some(&StepStatus::Completed { records: 2 })
    );
    assert_eq!(
        report.status(Step::Research),
        Some(&StepStatus::Completed { records: 1 })
    );
    assert!(matches!(
        report.status(Step::Loans),
        Some(StepStatus::Completed { .. })
    ));

    let names: Vec<String> = report
        .artifacts
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        [
            "Big_Y_20240305_093000_reviews.xlsx",
            "Big_Y_20240305_093000_competitors.xlsx",
            "Big_Y_20240305_093000_analysis.md",
            "Big_Y_20240305_093000_analysis.xlsx",
            "Big_Y_20240305_093000_sba_loans.xlsx",
        ]
    );
    assert!(report.artifacts.iter().all(|path| path.exists()));

    let loans = temp_dir.path().join("Big_Y_20240305_093000_sba_loans.xlsx");
    assert_eq!(
        excel_read::sheet_names(&loans).expect("sheet names"),
        ["Current Rates", "Loans in MA", "Historical Rates"]
    );
}

#[tokio::test]
async fn missing_places_key_skips_only_places_steps() {
    let server = MockServer::start().await;
    mount_upstreams(&server).await;
    let temp_dir = tempdir().expect("temporary directory");

    let report = analyze(config(&server.uri(), temp_dir.path().to_path_buf(), None)).await;

    assert!(matches!(
        report.status(Step::Reviews),
        Some(StepStatus::Unavailable(reason)) if reason.contains("GOOGLE_API_KEY")
    ));
    assert!(matches!(
        report.status(Step::Competitors),
        Some(StepStatus::Unavailable(_))
    ));
    assert_eq!(
        report.status(Step::Research),
        Some(&StepStatus::Completed { records: 1 })
    );
    assert_eq!(report.artifacts.len(), 3);
}
