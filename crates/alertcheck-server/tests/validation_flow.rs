//! Full pass against a fake Prometheus: rules fetched over HTTP, presence
//! probed over HTTP, verdicts scraped from `/metrics`.

mod common;

use alertcheck_server::app;
use alertcheck_server::config::ServerConfig;
use alertcheck_server::exporter::Exporter;
use alertcheck_server::scheduler::{build_reconcilers, ValidationScheduler};
use alertcheck_server::state::AppState;
use axum::extract::Form;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{request_no_body, write_config};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Rule `Flaky` uses `up` and `node_load1`; only `up` has data in the
/// nearest window.
async fn fake_prometheus() -> String {
    let rules = json!({
        "status": "success",
        "data": {"groups": [{"name": "node", "rules": [
            {"id": "11", "name": "Flaky", "query": "up == 0 and node_load1 > 4", "type": "alerting"},
            {"id": "12", "name": "node:load", "query": "avg(node_load1)", "type": "recording"}
        ]}]}
    });
    let app = Router::new()
        .route("/api/v1/rules", get(move || async move { Json(rules) }))
        .route(
            "/api/v1/query",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                let query = form.get("query").cloned().unwrap_or_default();
                let result: Vec<Value> = if query == "present_over_time(up[1h])" {
                    vec![json!({"metric": {}, "value": [0, "1"]})]
                } else {
                    vec![]
                };
                Json(json!({"status": "success", "data": {"resultType": "vector", "result": result}}))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn pass_results_are_scraped_from_metrics() {
    let url = fake_prometheus().await;
    let (_dir, path) = write_config(&format!(
        r#"
validity_check_intervals = ["0s", "1h", "1d"]
label_keys = ["cluster"]

[[servers]]
rule_url = "{url}"
query_url = "{url}"
label_values = ["test"]
"#
    ));
    let settings = ServerConfig::load(&path).unwrap().validate().unwrap();
    let exporter = Arc::new(Exporter::new(&settings.label_keys).unwrap());

    let reconcilers = build_reconcilers(&settings, exporter.clone()).unwrap();
    assert_eq!(reconcilers.len(), 1);
    let summary = reconcilers[0].run_pass().await.unwrap();
    assert_eq!(summary.rules_fetched, 2);
    assert_eq!(summary.rules_evaluated, 1);
    assert_eq!(summary.verdicts_published, 2);

    let state = AppState::new(exporter, 1, vec![]);
    let resp = request_no_body(&app::build_http_app(state), "GET", "/metrics").await;
    let body = resp.body;

    assert!(body.contains(
        r#"alertsvalidator_validity_range{alertid="11",alertname="Flaky",cluster="test",range_from="0s",range_to="1h",status="invalid"} 1"#
    ));
    assert!(body.contains(
        r#"alertsvalidator_validity_range{alertid="11",alertname="Flaky",cluster="test",range_from="1h",range_to="1d",status="valid"} 0"#
    ));
    assert!(!body.contains("node:load"));
    assert!(body.contains("alertsvalidator_last_pass_timestamp_seconds{"));
    assert!(!body.contains("alertsvalidator_external_api_error{"));
}

#[tokio::test]
async fn unreachable_rules_api_is_counted() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (_dir, path) = write_config(&format!(
        r#"
validity_check_intervals = ["0s", "1h"]

[[servers]]
rule_url = "http://{addr}"
query_url = "http://{addr}"
"#
    ));
    let settings = ServerConfig::load(&path).unwrap().validate().unwrap();
    let exporter = Arc::new(Exporter::new(&settings.label_keys).unwrap());

    let reconcilers = build_reconcilers(&settings, exporter.clone()).unwrap();
    let summary = reconcilers[0].run_pass().await.unwrap();
    assert!(summary.fetch_failed);

    let text = exporter.encode().unwrap();
    assert!(text.contains(&format!(
        r#"alertsvalidator_external_api_error{{server="http://{addr}",type="rule"}} 1"#
    )));
    assert!(!text.contains("alertsvalidator_last_pass_timestamp_seconds{"));
}

#[tokio::test]
async fn scheduler_without_targets_never_reports_fatal() {
    let mut scheduler = ValidationScheduler::start(vec![]);
    assert!(scheduler.is_empty());

    let waited = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        scheduler.wait_fatal(),
    )
    .await;
    assert!(waited.is_err());
    scheduler.shutdown();
}
