//! ---
//! cd_section: "15-testing-qa-runbook"
//! cd_subsection: "integration-tests"
//! cd_type: "source"
//! cd_scope: "code"
//! cd_description: "End-to-end HTTP tests against the in-memory remote store."
//! cd_version: "v0.0.0-prealpha"
//! cd_owner: "tbd"
//! ---
use std::fs;
use std::sync::Arc;

use certdesk_api::{new_registry, spawn_api_server, ApiMetrics, ApiServer, ApiState};
use certdesk_common::{init_stdout, ServerConfig};
use certdesk_store::{CertificateStore, FaultPoint, MemoryConnector, MemoryStore, RemoteLayout};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};

const MANIFEST: &str = "/certificates/manifest.json";

struct TestServer {
    server: ApiServer,
    remote: MemoryStore,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(MemoryConnector::new(), ServerConfig::default()).await
    }

    async fn start_with(connector: MemoryConnector, mut settings: ServerConfig) -> Self {
        init_stdout();
        let remote = connector.store().clone();
        let store = CertificateStore::new(Arc::new(connector), RemoteLayout::default());
        let metrics = ApiMetrics::new(new_registry()).expect("metrics");
        let state = Arc::new(ApiState::new(store, metrics));
        settings.listen = "127.0.0.1:0".parse().expect("addr");
        let server = spawn_api_server(state, &settings).expect("spawn api");
        Self {
            server,
            remote,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.addr(), path)
    }

    async fn upload(&self, cert_number: &str, issue_date: &str, file_name: &'static str) -> reqwest::Response {
        let form = Form::new()
            .part("image", Part::bytes(b"\x89PNG-ish".to_vec()).file_name(file_name))
            .text("certNumber", cert_number.to_owned())
            .text("issueDate", issue_date.to_owned())
            .text("issuedToName", "Jane")
            .text("credentials", credentials().to_string());
        self.client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await
            .expect("upload request")
    }

    async fn list(&self) -> Value {
        let response = self
            .client
            .post(self.url("/api/certificates"))
            .json(&credentials())
            .send()
            .await
            .expect("list request");
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.expect("list body")
    }

    async fn delete(&self, cert_number: &str) -> reqwest::Response {
        let mut body = credentials();
        body["certNumber"] = json!(cert_number);
        self.client
            .post(self.url("/api/delete"))
            .json(&body)
            .send()
            .await
            .expect("delete request")
    }

    fn manifest(&self) -> Option<Value> {
        self.remote
            .file(MANIFEST)
            .map(|bytes| serde_json::from_slice(&bytes).expect("manifest json"))
    }
}

fn credentials() -> Value {
    json!({
        "host": "ftp.example.test",
        "port": 2121,
        "user": "registrar",
        "password": "secret",
        "secure": false
    })
}

#[tokio::test]
async fn upload_twice_keeps_single_updated_record() {
    let app = TestServer::start().await;

    let first = app.upload("A1", "2024-01-01", "a.jpg").await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let body: Value = first.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("A1"));
    assert_eq!(
        app.list().await,
        json!([{
            "certNumber": "A1",
            "issueDate": "2024-01-01",
            "issuedToName": "Jane",
            "imageUrl": "/api/image/A1.jpg"
        }])
    );

    assert_eq!(app.upload("B2", "2024-01-05", "b.png").await.status(), StatusCode::CREATED);
    assert_eq!(app.upload("A1", "2024-02-02", "a.jpg").await.status(), StatusCode::CREATED);

    let listed = app.list().await;
    let records = listed.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["certNumber"], "A1");
    assert_eq!(records[0]["issueDate"], "2024-02-02");
    assert_eq!(records[1]["certNumber"], "B2");
    assert_eq!(app.manifest().unwrap(), listed);
    assert!(app.remote.file("/certificates/images/B2.png").is_some());

    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn list_without_manifest_is_empty() {
    let app = TestServer::start().await;
    assert_eq!(app.list().await, json!([]));
    assert!(app.manifest().is_none());
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn upload_without_image_is_bad_request() {
    let app = TestServer::start().await;
    let form = Form::new()
        .text("certNumber", "A1")
        .text("issueDate", "2024-01-01")
        .text("issuedToName", "Jane")
        .text("credentials", credentials().to_string());
    let response = app
        .client
        .post(app.url("/api/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "No image file uploaded");
    assert!(app.remote.file_paths().is_empty());
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn upload_with_path_in_cert_number_is_rejected() {
    let app = TestServer::start().await;
    let response = app.upload("../escape", "2024-01-01", "a.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.remote.file_paths().is_empty());
    assert_eq!(app.remote.sessions_opened(), 0);
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn delete_removes_record_and_image() {
    let app = TestServer::start().await;
    app.upload("A1", "2024-01-01", "a.jpg").await;
    app.upload("B2", "2024-01-02", "b.jpg").await;

    let response = app.delete("A1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = app.list().await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["certNumber"], "B2");
    assert!(app.remote.file("/certificates/images/A1.jpg").is_none());
    assert!(app.remote.file("/certificates/images/B2.jpg").is_some());
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn delete_of_unknown_record_is_not_found() {
    let app = TestServer::start().await;
    assert_eq!(app.delete("A1").await.status(), StatusCode::NOT_FOUND);

    app.upload("B2", "2024-01-02", "b.jpg").await;
    let before = app.manifest();
    let response = app.delete("Z9").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("Z9"));
    assert_eq!(app.manifest(), before);
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_image_removal_surfaces_after_manifest_update() {
    let app = TestServer::start().await;
    app.upload("A1", "2024-01-01", "a.jpg").await;
    app.remote
        .inject_fault(FaultPoint::Remove, "/certificates/images/A1.jpg");

    let response = app.delete("A1").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.manifest().unwrap(), json!([]));
    assert!(app.remote.file("/certificates/images/A1.jpg").is_some());
    assert_eq!(app.remote.open_sessions(), 0);
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn corrupt_manifest_is_server_error() {
    let app = TestServer::start().await;
    app.remote.put_file(MANIFEST, "{\"oops\": true}");
    let response = app
        .client
        .post(app.url("/api/certificates"))
        .json(&credentials())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn connection_test_reports_login_failures() {
    let connector = MemoryConnector::new().require_login("registrar", "other");
    let app = TestServer::start_with(connector, ServerConfig::default()).await;
    let response = app
        .client
        .post(app.url("/api/test-connection"))
        .json(&credentials())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.remote.has_dir("/certificates"));
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn connection_test_creates_base_directory() {
    let app = TestServer::start().await;
    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/test-connection"))
            .json(&credentials())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "Connection successful");
    }
    assert!(app.remote.has_dir("/certificates"));
    assert!(app.remote.file_paths().is_empty());
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_host_is_bad_request() {
    let app = TestServer::start().await;
    let response = app
        .client
        .post(app.url("/api/test-connection"))
        .json(&json!({ "host": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn image_endpoint_is_not_implemented() {
    let app = TestServer::start().await;
    let response = app
        .client
        .get(app.url("/api/image/A1.jpg"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].is_string());
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn root_serves_embedded_page() {
    let app = TestServer::start().await;
    let response = app.client.get(app.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/html"));
    let body = response.text().await.unwrap();
    assert!(body.contains("/api/upload"));
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn static_dir_replaces_embedded_page() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>custom front end</h1>").unwrap();
    let settings = ServerConfig {
        static_dir: Some(dir.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let app = TestServer::start_with(MemoryConnector::new(), settings).await;
    let body = app
        .client
        .get(app.url("/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("custom front end"));
    app.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn metrics_count_operations_by_outcome() {
    let app = TestServer::start().await;
    app.upload("A1", "2024-01-01", "a.jpg").await;
    app.delete("Z9").await;

    let body = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains(r#"certdesk_operations_total{operation="upload",outcome="success"} 1"#));
    assert!(body.contains(r#"certdesk_operations_total{operation="delete",outcome="record_not_found"} 1"#));
    app.server.shutdown().await.unwrap();
}
