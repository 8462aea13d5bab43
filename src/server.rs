use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::model::ReportWindow;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Trigger payload: an optional end-of-window date, from the query string
/// (GET) or a JSON body (POST). Absent means yesterday, UTC.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
    report_date: Option<String>,
}

pub fn build_app(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(
            "/report",
            get(trigger_via_query)
                .post(trigger_via_body)
                .options(preflight),
        )
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(AppState { pipeline })
}

pub async fn serve(bind_addr: &str, pipeline: Arc<Pipeline>) -> Result<(), Error> {
    let app = build_app(pipeline);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("report trigger listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn resolve_window(report_date: Option<&str>) -> Result<ReportWindow, Error> {
    let end = match report_date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| Error::InvalidDate {
            date: raw.to_string(),
        })?,
        None => yesterday_utc(),
    };
    Ok(ReportWindow::ending_on(end))
}

pub fn yesterday_utc() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

async fn run_and_respond(state: AppState, params: TriggerParams) -> impl IntoResponse {
    let window = match resolve_window(params.report_date.as_deref()) {
        Ok(window) => window,
        Err(err) => {
            error!("report trigger rejected: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": err.to_string() })),
            );
        }
    };

    let outcome = state.pipeline.run(window).await;
    let code = if outcome.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    match serde_json::to_value(&outcome) {
        Ok(body) => (code, Json(body)),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": err.to_string() })),
        ),
    }
}

async fn trigger_via_query(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> impl IntoResponse {
    run_and_respond(state, params).await
}

/// POST bodies are optional; an empty body means "default window".
async fn trigger_via_body(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let params = if body.trim().is_empty() {
        Ok(TriggerParams::default())
    } else {
        serde_json::from_str::<TriggerParams>(&body)
    };

    match params {
        Ok(params) => run_and_respond(state, params).await.into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": format!("invalid request body: {err}") })),
        )
            .into_response(),
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("received shutdown signal, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::SvgChartRenderer;
    use crate::extractor::MockAdsExtractor;
    use crate::mailer::{DeliveryReceipt, MockMailer};
    use crate::warehouse::MockWarehouseLoader;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    /// Pipeline whose run always succeeds: no rows extracted, the empty
    /// report is still assembled and delivered.
    fn happy_pipeline() -> Arc<Pipeline> {
        let mut extractor = MockAdsExtractor::new();
        extractor.expect_fetch().returning(|_, _, _| Ok(vec![]));
        let mut mailer = MockMailer::new();
        mailer.expect_send().returning(|_, _, _, _| {
            Ok(DeliveryReceipt {
                server_response: "250 OK".to_string(),
            })
        });
        Arc::new(Pipeline::new(
            Arc::new(extractor),
            Arc::new(MockWarehouseLoader::new()),
            Arc::new(SvgChartRenderer::default()),
            None,
            Arc::new(mailer),
            vec!["google ads".to_string()],
            "manager@example.com".to_string(),
        ))
    }

    /// Pipeline with no expectations set: any stage call fails the test,
    /// so rejected requests provably never start a run.
    fn idle_pipeline() -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            Arc::new(MockAdsExtractor::new()),
            Arc::new(MockWarehouseLoader::new()),
            Arc::new(SvgChartRenderer::default()),
            None,
            Arc::new(MockMailer::new()),
            vec!["google ads".to_string()],
            "manager@example.com".to_string(),
        ))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_trigger_with_query_date() {
        let app = build_app(happy_pipeline());
        let response = app
            .oneshot(
                Request::get("/report?report_date=2025-09-18")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["window_start"], "2025-09-12");
        assert_eq!(body["window_end"], "2025-09-18");
    }

    #[tokio::test]
    async fn test_post_trigger_reads_json_body() {
        let app = build_app(happy_pipeline());
        let response = app
            .oneshot(
                Request::post("/report")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"report_date":"2025-09-18"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["window_end"], "2025-09-18");
    }

    #[tokio::test]
    async fn test_post_trigger_empty_body_defaults_to_yesterday() {
        let app = build_app(happy_pipeline());
        let response = app
            .oneshot(Request::post("/report").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["window_end"], yesterday_utc().to_string());
    }

    #[tokio::test]
    async fn test_post_trigger_rejects_invalid_date() {
        let app = build_app(idle_pipeline());
        let response = app
            .oneshot(
                Request::post("/report")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"report_date":"next tuesday"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_post_trigger_rejects_malformed_body() {
        let app = build_app(idle_pipeline());
        let response = app
            .oneshot(
                Request::post("/report")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn test_options_report_returns_no_content() {
        let app = build_app(idle_pipeline());
        let response = app
            .oneshot(
                Request::options("/report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_healthz_reports_ok() {
        let app = build_app(idle_pipeline());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_resolve_window_with_explicit_date() {
        let window = resolve_window(Some("2025-09-18")).unwrap();
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2025, 9, 18).unwrap());
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 9, 12).unwrap());
    }

    #[test]
    fn test_resolve_window_rejects_garbage() {
        let result = resolve_window(Some("next tuesday"));
        assert!(matches!(result.unwrap_err(), Error::InvalidDate { .. }));
    }

    #[test]
    fn test_resolve_window_defaults_to_yesterday() {
        let window = resolve_window(None).unwrap();
        assert_eq!(window.end, yesterday_utc());
        assert_eq!(window.end - window.start, Duration::days(6));
    }
}
