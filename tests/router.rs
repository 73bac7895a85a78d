mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, Harness, CURL_FIXTURE};
use http_body_util::BodyExt;
use rippkgs_search::index::{IndexCell, IndexState};
use rippkgs_search::server::{router, AppState};
use rippkgs_search::snapshot::LocalFileSource;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(h: &Harness) -> (Router, AppState) {
    let state = AppState {
        index: h.index.clone(),
    };
    (router(state.clone()), state)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_does_not_touch_index() {
    let h = harness(CURL_FIXTURE, |s| s.failing_first(usize::MAX)).await;
    let (app, state) = app(&h);

    let (status, body) = get(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(state.index.state(), IndexState::Uninitialized);
}

#[tokio::test]
async fn test_search_ranked_results() {
    let h = harness(CURL_FIXTURE, |s| s).await;
    let (app, state) = app(&h);

    let (status, body) = get(&app, "/search?q=curl").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "results": [
            { "name": "curl", "version": "7.80" },
            { "name": "curl", "version": "8.0" },
            { "name": "curly-lib", "version": "1.0" },
            { "name": "mycurl", "version": "2.0" },
        ]})
    );
    assert_eq!(state.index.state(), IndexState::Ready);
}

#[tokio::test]
async fn test_search_no_match_is_empty_list() {
    let h = harness(CURL_FIXTURE, |s| s).await;
    let (app, _state) = app(&h);

    let (status, body) = get(&app, "/search?q=zzz-not-found").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "results": [] }));
}

#[tokio::test]
async fn test_missing_or_empty_query_is_400_even_when_index_is_broken() {
    let h = harness(CURL_FIXTURE, |s| s.failing_first(usize::MAX)).await;
    let (app, _state) = app(&h);

    for uri in ["/search", "/search?q=", "/search?other=1"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "uri: {}", uri);
        assert_eq!(body["error"]["code"], "bad_request");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing query"));
    }
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let h = harness(CURL_FIXTURE, |s| s).await;
    let (app, _state) = app(&h);

    let (status, body) = get(&app, "/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_concurrent_first_searches_fetch_once() {
    let h = harness(CURL_FIXTURE, |s| s.with_delay(Duration::from_millis(100))).await;
    let (app, state) = app(&h);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            get(&app, "/search?q=curl").await
        }));
    }
    for task in tasks {
        let (status, body) = task.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"].as_array().unwrap().len(), 4);
    }

    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(state.index.state(), IndexState::Ready);

    // Later searches reuse the open index.
    get(&app, "/search?q=lib").await;
    assert_eq!(h.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_initialization_is_retried() {
    let h = harness(CURL_FIXTURE, |s| s.failing_first(1)).await;
    let (app, state) = app(&h);

    let (status, body) = get(&app, "/search?q=curl").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "fetch_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("simulated network blip"));
    assert_eq!(state.index.state(), IndexState::Failed);

    let (status, body) = get(&app, "/search?q=curl").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["name"], "curl");
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(state.index.state(), IndexState::Ready);
}

#[tokio::test]
async fn test_health_still_served_after_init_failure() {
    let h = harness(CURL_FIXTURE, |s| s.failing_first(usize::MAX)).await;
    let (app, _state) = app(&h);

    let (status, _) = get(&app, "/search?q=curl").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_concurrent_failures_do_not_wedge() {
    let h = harness(CURL_FIXTURE, |s| {
        s.failing_first(1).with_delay(Duration::from_millis(50))
    })
    .await;
    let (app, state) = app(&h);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        tasks.push(tokio::spawn(async move {
            get(&app, "/search?q=curl").await.0
        }));
    }
    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }

    // The first attempt fails for whoever drove it; a waiter then retries.
    assert!(statuses.contains(&StatusCode::OK));
    assert_eq!(h.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(state.index.state(), IndexState::Ready);
}

#[tokio::test]
async fn test_repeated_q_uses_first_value() {
    let h = harness(CURL_FIXTURE, |s| s).await;
    let (app, _state) = app(&h);

    let (status, body) = get(&app, "/search?q=curl&q=lib").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["curl", "curl", "curly-lib", "mycurl"]);

    // An empty first value is still a missing query.
    let (status, body) = get(&app, "/search?q=&q=curl").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_error_messages_do_not_leak_local_paths() {
    let tmp = TempDir::new().unwrap();
    let published = tmp.path().join("published").join("other.sqlite");
    std::fs::create_dir_all(published.parent().unwrap()).unwrap();
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", published.display()))
        .await
        .unwrap();
    sqlx::query("CREATE TABLE crates (name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let tmp_dir = tmp.path().display().to_string();
    let cases = [
        (published.clone(), "open_failed"),
        (tmp.path().join("published").join("absent.sqlite"), "fetch_failed"),
    ];
    for (source, code) in cases {
        let cell = IndexCell::new(
            Box::new(LocalFileSource::new(source)),
            tmp.path().join("cache").join("index.sqlite"),
            Duration::from_secs(1),
        );
        let app = router(AppState::new(cell));

        let (status, body) = get(&app, "/search?q=curl").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], code);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.contains(&tmp_dir), "{} leaks a path: {}", code, message);
        assert!(!message.contains("file://"), "{} leaks a path: {}", code, message);
    }
}

#[tokio::test]
async fn test_busy_connection_is_query_failed() {
    let h = harness(CURL_FIXTURE, |s| s).await;
    let (app, _state) = app(&h);

    let pool = h.index.get().await.unwrap();
    let _held = pool.acquire().await.unwrap();

    let (status, body) = tokio::time::timeout(Duration::from_secs(10), get(&app, "/search?q=curl"))
        .await
        .expect("search should give up once the busy timeout elapses");

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "query_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("timed out"));
}
