use std::sync::Arc;

use axum::{
    body::StreamBody,
    extract::{Json, Path, State},
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::{credential_from_headers, AccessGate, TOKEN_HEADER};
use crate::error::{ApiError, ApiResult, ConfigError};
use crate::job::{TrimJobRunner, TrimRequest, DOWNLOADS_ROUTE};
use crate::models::{JobStatus, LoginRequest, LoginResponse, TrimBody, TrimLaunch};

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub runner: TrimJobRunner,
}

pub fn create_routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/video/trim", post(trim))
        .route("/api/video/status", get(status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_credential));

    Router::new()
        .route("/api/auth/login", post(login))
        .route(&format!("{DOWNLOADS_ROUTE}/"), get(missing_filename))
        .route(&format!("{DOWNLOADS_ROUTE}/:filename"), get(download))
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

/// CORS for the browser client served from `origin`.
pub fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(origin).map_err(|_| ConfigError::Invalid {
        key: "CORS_ORIGIN",
        value: origin.to_string(),
    })?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(TOKEN_HEADER),
        ])
        .allow_credentials(true))
}

async fn require_credential<B>(
    State(state): State<AppState>,
    request: Request<B>,
    next: Next<B>,
) -> ApiResult<Response> {
    state.gate.authorize(credential_from_headers(request.headers()))?;
    Ok(next.run(request).await)
}

async fn health() -> &'static str {
    "ok"
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Json<LoginResponse> {
    Json(state.gate.login(&body.passphrase))
}

async fn trim(State(state): State<AppState>, Json(body): Json<TrimBody>) -> ApiResult<Json<TrimLaunch>> {
    let start = body.start.to_seconds()?;
    let end = body.end.to_seconds()?;
    let request = TrimRequest::new(&body.source_url, start, end)?;
    let launch = state.runner.launch(request).await?;
    Ok(Json(launch))
}

async fn status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.runner.status().await)
}

async fn missing_filename() -> ApiError {
    ApiError::bad_request("Filename is required")
}

// Streams the file instead of buffering it
async fn download(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    if !is_plain_file_name(&filename) {
        return Err(ApiError::bad_request("Filename is required"));
    }

    let path = state.runner.output_dir().join(&filename);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ApiError::not_found("File not found")),
    };
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
        (header::CONTENT_DISPOSITION, HeaderValue::from_static("inline")),
        (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
    ];
    Ok((headers, StreamBody::new(ReaderStream::new(file))).into_response())
}

/// A single path component: no separators, no `.`/`..`.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::FakeTools;
    use axum::body::Body;
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    const SECRET: &str = "s3cret-key";

    fn test_app(tools: Arc<FakeTools>, dir: &std::path::Path) -> (Router, AppState) {
        let state = AppState {
            gate: Arc::new(AccessGate::new(SECRET, "open sesame")),
            runner: TrimJobRunner::new(tools, dir),
        };
        (create_routes(state.clone()), state)
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_login() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(Arc::new(FakeTools::titled("x")), dir.path());

        let ok = app
            .clone()
            .oneshot(post_json("/api/auth/login", json!({ "passphrase": "open sesame" }), None))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_body(ok).await, json!({ "success": true, "credential": SECRET }));

        let denied = app
            .oneshot(post_json("/api/auth/login", json!({ "passphrase": "nope" }), None))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::OK);
        assert_eq!(json_body(denied).await, json!({ "success": false }));
    }

    #[tokio::test]
    async fn test_protected_routes_need_credential() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeTools::titled("x"));
        let (app, _) = test_app(tools.clone(), dir.path());

        let response = app.clone().oneshot(get_req("/api/video/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.clone().oneshot(get_req("/api/video/status", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json!({ "source_url": "https://youtu.be/abc123", "start": 0, "end": 5 });
        let response = app.oneshot(post_json("/api/video/trim", body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(tools.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_reports_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(Arc::new(FakeTools::titled("x")), dir.path());

        let response = app.oneshot(get_req("/api/video/status", Some(SECRET))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "busy": false, "last_artifact_url": null }));
    }

    #[tokio::test]
    async fn test_trim_validation_runs_before_tools() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeTools::titled("x"));
        let (app, _) = test_app(tools.clone(), dir.path());

        for body in [
            json!({ "source_url": "https://youtu.be/abc123", "start": "1:30", "end": "1:00" }),
            json!({ "source_url": "https://youtu.be/abc123", "start": 10, "end": 10 }),
            json!({ "source_url": "https://youtu.be/abc123", "start": "bad", "end": 10 }),
            json!({ "source_url": "https://example.com/video", "start": 0, "end": 10 }),
        ] {
            let response = app
                .clone()
                .oneshot(post_json("/api/video/trim", body.clone(), Some(SECRET)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        assert_eq!(tools.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trim_then_conflict_then_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(FakeTools::titled("My Video! (Official) #1").held());
        let (app, state) = test_app(tools.clone(), dir.path());
        let body = json!({ "source_url": "https://www.youtube.com/watch?v=abc123&list=xyz", "start": "0:05", "end": 12.5 });

        let response = app
            .clone()
            .oneshot(post_json("/api/video/trim", body.clone(), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "title": "My_Video_Official_1" }));

        let response = app
            .clone()
            .oneshot(post_json("/api/video/trim", body, Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.clone().oneshot(get_req("/api/video/status", Some(SECRET))).await.unwrap();
        assert_eq!(json_body(response).await["busy"], json!(true));

        tools.release.notify_one();
        state.runner.join_in_flight().await;

        let response = app.clone().oneshot(get_req("/api/video/status", Some(SECRET))).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "busy": false, "last_artifact_url": "/downloads/My_Video_Official_1.mp4" })
        );

        let response = app
            .oneshot(get_req("/downloads/My_Video_Official_1.mp4", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&bytes[..], b"full video");
    }

    #[tokio::test]
    async fn test_download_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        let (app, _) = test_app(Arc::new(FakeTools::titled("x")), dir.path());

        let cases = [
            ("/downloads/missing.mp4", StatusCode::NOT_FOUND),
            ("/downloads/tmp", StatusCode::NOT_FOUND),
            ("/downloads/", StatusCode::BAD_REQUEST),
            ("/downloads/..", StatusCode::BAD_REQUEST),
            ("/downloads/..%2Fsecret.mp4", StatusCode::BAD_REQUEST),
        ];
        for (uri, expected) in cases {
            let response = app.clone().oneshot(get_req(uri, None)).await.unwrap();
            assert_eq!(response.status(), expected, "{uri}");
        }
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("clip.mp4"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("a/b.mp4"));
        assert!(!is_plain_file_name("..\\b.mp4"));
    }
}
