use crate::config::Config;
use crate::csp::{CspEnvelope, normalize_csp_report, normalize_report_to_batch};
use crate::error::ReportError;
use crate::user_agent::UserAgent;
use anyhow::Context;
use axum::extract::{DefaultBodyLimit, FromRequest, Request};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shown in the request summary when the browser sent no content type.
const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// JSON body read regardless of the declared content type.
///
/// Browsers send `application/csp-report` or `application/reports+json`, which
/// `axum::Json` would refuse. An empty body is read as `{}`.
pub struct PermissiveJson(pub Value);

impl<S> FromRequest<S> for PermissiveJson
where
    S: Send + Sync,
{
    type Rejection = ReportError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => ReportError::BodyTooLarge,
                _ => ReportError::BodyRead(rejection.body_text()),
            })?;
        parse_body(&body).map(PermissiveJson)
    }
}

fn parse_body(body: &[u8]) -> Result<Value, ReportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(body)?)
}

pub fn router(config: &Config) -> Router {
    Router::new()
        .route("/report-uri", post(report_uri))
        .route("/report-to", post(report_to))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.body_limit))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("csp-report-sink listening on {}", listener.local_addr()?);

    axum::serve(listener, router(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving reports")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn log_request(request: Request, next: Next) -> Response {
    let headers = request.headers();
    let ua = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(UserAgent::parse)
        .unwrap_or_default();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    info!("==========");
    info!(
        "--- {} {} ({}) {} - {}:",
        ua.engine_name(),
        ua.browser_name(),
        content_type,
        request.method(),
        request.uri()
    );

    next.run(request).await
}

async fn report_uri(PermissiveJson(body): PermissiveJson) -> Json<Value> {
    let report = CspEnvelope::from_value(body).csp_report.unwrap_or_default();
    let record = normalize_csp_report(report, now_millis());
    log_output(&record);
    received()
}

async fn report_to(PermissiveJson(body): PermissiveJson) -> Json<Value> {
    let batch = normalize_report_to_batch(body, now_millis());
    for item in &batch.items {
        tracing::debug!(summary = item.message(), "report-to item");
    }
    log_output(&batch);
    received()
}

fn log_output(output: &impl Serialize) {
    match serde_json::to_string_pretty(output) {
        Ok(output) => info!("OUTPUT:\n{output}"),
        Err(err) => warn!(%err, "failed to render normalized report"),
    }
}

fn received() -> Json<Value> {
    Json(json!({ "received": true }))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::server::{parse_body, router};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::io;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn app() -> Router {
        router(&Config::default())
    }

    async fn post(
        app: Router,
        uri: &str,
        content_type: Option<&str>,
        body: impl Into<Body>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let resp = app.oneshot(builder.body(body.into()).unwrap()).await.unwrap();

        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_report_uri() {
        let body = json!({
            "csp-report": {
                "blocked-uri": "https://evil.com/x.js",
                "document-uri": "https://site/page",
                "violated-directive": "script-src-elem"
            }
        });

        let (status, json) = post(
            app(),
            "/report-uri",
            Some("application/csp-report"),
            body.to_string(),
        )
        .await;
        assert_eq!(StatusCode::OK, status);
        assert_eq!(json!({"received": true}), json);
    }

    #[tokio::test]
    async fn test_report_to_content_types() {
        let body = json!([{
            "age": 1000,
            "type": "csp-violation",
            "body": {
                "blockedURL": "inline",
                "lineNumber": 5,
                "columnNumber": 3,
                "documentURL": "https://x/page",
                "effectiveDirective": "script-src"
            }
        }])
        .to_string();

        for content_type in [
            Some("application/reports+json"),
            Some("application/json"),
            Some("text/plain"),
            None,
        ] {
            let (status, json) = post(app(), "/report-to", content_type, body.clone()).await;
            assert_eq!(StatusCode::OK, status, "{content_type:?}");
            assert_eq!(json!({"received": true}), json);
        }
    }

    #[tokio::test]
    async fn test_permissive_bodies() {
        for (uri, body) in [
            ("/report-uri", "{}"),
            ("/report-uri", "[]"),
            ("/report-uri", ""),
            ("/report-uri", r#"{"csp-report": null}"#),
            ("/report-to", "{}"),
            ("/report-to", "[]"),
            ("/report-to", ""),
            ("/report-to", r#"[{"age": "x"}, 3, {"body": []}]"#),
        ] {
            let (status, json) = post(app(), uri, Some("application/json"), body).await;
            assert_eq!(StatusCode::OK, status, "{uri} {body}");
            assert_eq!(json!({"received": true}), json);
        }
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (status, json) = post(app(), "/report-to", Some("application/json"), "{not json").await;
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert!(json["error"].as_str().unwrap().starts_with("malformed JSON body"));
    }

    #[tokio::test]
    async fn test_body_limit() {
        let config = Config {
            body_limit: 16,
            ..Config::default()
        };
        let body = json!({"csp-report": {"document-uri": "https://site/a/long/page"}}).to_string();

        let (status, _) = post(router(&config), "/report-uri", None, body).await;
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, status);
    }

    #[tokio::test]
    async fn test_oversized_request_is_still_summarized() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = Config {
            body_limit: 16,
            ..Config::default()
        };
        let body = json!({"csp-report": {"document-uri": "https://site/a/long/page"}}).to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/report-uri")
            .header("content-type", "application/csp-report")
            .header("content-length", body.len().to_string())
            .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0")
            .body(Body::from(body))
            .unwrap();

        let resp = router(&config).oneshot(request).await.unwrap();
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, resp.status());

        let text = logs.text();
        assert!(text.contains("=========="), "{text}");
        assert!(
            text.contains("--- Gecko Firefox (application/csp-report) POST - /report-uri:"),
            "{text}"
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = post(app(), "/reports", None, "{}").await;
        assert_eq!(StatusCode::NOT_FOUND, status);
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(json!({}), parse_body(b"").unwrap());
        assert_eq!(json!({}), parse_body(b" \n").unwrap());
        assert_eq!(json!([1]), parse_body(b"[1]").unwrap());
        assert!(parse_body(b"nope").is_err());
    }
}
