//! Integration tests driving the `axum` router in-process via
//! `tower::ServiceExt::oneshot`, the idiomatic way to exercise an `axum`
//! app without binding a real socket.

use std::path::PathBuf;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use harvid_core::test_support::synth_fixture;
use harvid_server::{build_router, AppState, Config};
use tower::ServiceExt;

fn test_config(docroot: PathBuf) -> Config {
    Config {
        docroot,
        listen: "127.0.0.1:0".to_string(),
        pool_size: 4,
        idle_decoder_cap: 2,
        cache_mb: 16,
        admin: true,
        no_index: false,
        log_level: "info".to_string(),
    }
}

fn fixture_docroot(name: &str) -> (PathBuf, String) {
    let path = synth_fixture(name, 64, 48, 25, 60);
    let dir = path.parent().unwrap().to_path_buf();
    let filename = path.file_name().unwrap().to_string_lossy().into_owned();
    (dir, filename)
}

#[tokio::test]
async fn frame_request_returns_png_with_matching_dimensions() {
    let (docroot, filename) = fixture_docroot("http_frame_request");
    let app = build_router(AppState::new(&test_config(docroot)));

    let uri = format!("/{filename}?frame=10&w=32&h=-1&format=png");
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(&body[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn missing_file_returns_404() {
    let (docroot, _) = fixture_docroot("http_missing_setup");
    let app = build_router(AppState::new(&test_config(docroot)));

    let response = app
        .oneshot(
            Request::get("/no-such-file.mov?frame=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn path_escape_attempt_returns_404() {
    let (docroot, _) = fixture_docroot("http_escape_setup");
    let app = build_router(AppState::new(&test_config(docroot)));

    let response = app
        .oneshot(
            Request::get("/../../etc/passwd?frame=0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn info_endpoint_reports_geometry() {
    let (docroot, filename) = fixture_docroot("http_info");
    let app = build_router(AppState::new(&test_config(docroot)));

    let response = app
        .oneshot(
            Request::get(format!("/info?file={filename}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["width"], 64);
    assert_eq!(value["height"], 48);
}

#[tokio::test]
async fn directory_listing_returns_json_entries() {
    let (docroot, filename) = fixture_docroot("http_dirlist");
    let app = build_router(AppState::new(&test_config(docroot)));

    let response = app
        .oneshot(
            Request::get("/?format=json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let names: Vec<_> = value["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&filename));
}

#[tokio::test]
async fn pool_endpoint_reports_diagnostics_after_a_request() {
    let (docroot, filename) = fixture_docroot("http_pool");
    let app = build_router(AppState::new(&test_config(docroot)));

    let _ = app
        .clone()
        .oneshot(
            Request::get(format!("/{filename}?frame=0&format=png"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(Request::get("/pool").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(value["cache"]["entries"].as_u64().unwrap() >= 1);
}
