//! End-to-end tests against a real listener and real tool processes
#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{FakeTool, TestServer, expected_paths, synthetic_catalog, wait_for_exit};
use serde_json::Value;

const FIRST_TABLE: &str = r#"<table name="First"><tag name="Early" type="string" writable="true"><desc lang="en">Arrives first</desc></tag></table>"#;

fn paths(body: &str) -> Vec<String> {
    let records: Vec<Value> = serde_json::from_str(body).expect("body is a JSON array");
    records
        .iter()
        .map(|record| record["path"].as_str().unwrap().to_string())
        .collect()
}

/// Read chunks until the accumulated body contains `needle`
async fn read_until(response: &mut reqwest::Response, body: &mut String, needle: &str) {
    while !body.contains(needle) {
        let chunk = response
            .chunk()
            .await
            .unwrap()
            .expect("body ended early");
        body.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

async fn read_rest(mut response: reqwest::Response, mut body: String) -> String {
    while let Some(chunk) = response.chunk().await.unwrap() {
        body.push_str(std::str::from_utf8(&chunk).unwrap());
    }
    body
}

#[tokio::test]
async fn test_full_catalog_over_http() {
    let counts = [3, 0, 5, 1];
    let tool = FakeTool::printing(&synthetic_catalog(&counts));
    let server = TestServer::start(&tool, Duration::from_secs(5)).await;

    let response = reqwest::get(server.url("/tags")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.headers()["cache-control"], "no-cache");

    let body = response.text().await.unwrap();
    assert_eq!(paths(&body), expected_paths(&counts));

    let records: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(records[0]["type"], "int16u");
    assert_eq!(records[0]["writable"], true);
    assert_eq!(records[1]["writable"], false);
    assert_eq!(records[0]["group"], "Group0");
    assert_eq!(
        records[0]["description"],
        serde_json::json!({"de": "Etikett 0", "en": "Tag 0"})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_get_independent_streams() {
    let counts = [20, 20, 20];
    let tool = FakeTool::printing(&synthetic_catalog(&counts));
    let server = TestServer::start(&tool, Duration::from_secs(5)).await;
    let url = server.url("/tags");

    let requests = (0..4).map(|_| {
        let url = url.clone();
        tokio::spawn(async move { reqwest::get(url).await.unwrap().text().await.unwrap() })
    });
    let mut bodies = Vec::new();
    for request in requests {
        bodies.push(request.await.unwrap());
    }

    for body in &bodies {
        assert_eq!(paths(body), expected_paths(&counts));
    }
    server.stop().await;
}

#[tokio::test]
async fn test_first_table_arrives_before_tool_finishes() {
    let tool = FakeTool::script(&format!(
        "printf '<taginfo>{FIRST_TABLE}'\nsleep 3\nprintf '</taginfo>'"
    ));
    let server = TestServer::start(&tool, Duration::from_secs(10)).await;

    let mut response = reqwest::get(server.url("/tags")).await.unwrap();
    let mut body = String::new();
    tokio::time::timeout(
        Duration::from_secs(2),
        read_until(&mut response, &mut body, "First:Early"),
    )
    .await
    .expect("first table should be streamed while the tool is still running");

    let body = read_rest(response, body).await;
    assert_eq!(paths(&body), ["First:Early"]);
    server.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_stops_tool() {
    let tool = FakeTool::script(&format!(
        "{}\nprintf '<taginfo>{FIRST_TABLE}'\nwhile :; do printf '<table name=\"More\"><tag name=\"x\" type=\"int8u\" writable=\"false\"/></table>'; done",
        FakeTool::pid_prelude()
    ));
    let server = TestServer::start(&tool, Duration::from_secs(10)).await;

    let mut response = reqwest::get(server.url("/tags")).await.unwrap();
    let mut body = String::new();
    read_until(&mut response, &mut body, "First:Early").await;
    let pid = tool.wait_for_pid().await;
    drop(response);

    assert!(
        wait_for_exit(pid, Duration::from_secs(10)).await,
        "tool should be killed after the client leaves"
    );
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_stream_finish() {
    let tool = FakeTool::script(&format!(
        "printf '<taginfo>{FIRST_TABLE}'\nsleep 1\nprintf '<table name=\"Last\"><tag name=\"Late\" type=\"string\" writable=\"false\"/></table></taginfo>'"
    ));
    let server = TestServer::start(&tool, Duration::from_secs(10)).await;

    let mut response = reqwest::get(server.url("/tags")).await.unwrap();
    let mut body = String::new();
    read_until(&mut response, &mut body, "First:Early").await;

    server.shutdown.cancel();
    let body = read_rest(response, body).await;
    assert_eq!(paths(&body), ["First:Early", "Last:Late"]);

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop once the stream is done")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_grace_expiry_aborts_stalled_stream() {
    let tool = FakeTool::script(&format!(
        "{}\nprintf '<taginfo>{FIRST_TABLE}'\nexec sleep 60",
        FakeTool::pid_prelude()
    ));
    let server = TestServer::start(&tool, Duration::from_millis(300)).await;

    let mut response = reqwest::get(server.url("/tags")).await.unwrap();
    let mut body = String::new();
    read_until(&mut response, &mut body, "First:Early").await;
    let pid = tool.wait_for_pid().await;

    server.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server should stop shortly after the grace period")
        .unwrap()
        .unwrap();

    assert!(wait_for_exit(pid, Duration::from_secs(5)).await);
    drop(response);
}

#[tokio::test]
async fn test_root_redirects_over_http() {
    let tool = FakeTool::printing(&synthetic_catalog(&[2]));
    let server = TestServer::start(&tool, Duration::from_secs(5)).await;

    let body = reqwest::get(server.url("/")).await.unwrap().text().await.unwrap();
    assert_eq!(paths(&body), expected_paths(&[2]));

    server.stop().await;
}
