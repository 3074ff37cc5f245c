use axum::{
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api::{batch, handlers, interactive};
use crate::core::{config::Settings, state::AppState};

pub(crate) fn router(state: AppState) -> Router {
    let cors = build_cors_layer(state.settings());
    let api_v1_prefix = state.settings().api().api_v1_str.clone();
    let api_v1 = Router::new()
        .nest("/batch", batch::router())
        .nest("/interactive", interactive::router());

    let request_id_header = HeaderName::from_static("x-request-id");
    let request_id_header_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_header_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(|response: &Response<axum::body::Body>, latency: Duration, _span: &Span| {
            let status_class = format!("{}xx", response.status().as_u16() / 100);
            metrics::counter!("http_requests_total", "status_class" => status_class.clone())
                .increment(1);
            metrics::histogram!("http_request_duration_seconds", "status_class" => status_class)
                .record(latency.as_secs_f64());
        });

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&api_v1_prefix, api_v1)
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors);

    if state.settings().telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router.with_state(state)
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            ORIGIN,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_credentials(true)
            .allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    use crate::core::metrics;
    use crate::test_support::{json_request, read_json, setup_test_context};

    #[tokio::test]
    async fn root_returns_project_name() {
        let ctx = setup_test_context(None).await;

        let response =
            ctx.app.oneshot(json_request(Method::GET, "/", None, None)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["message"], "Scriptorium API");
        assert_eq!(json["api_prefix"], "/api/v1");
    }

    #[tokio::test]
    async fn healthz_reports_store_and_redis() {
        let ctx = setup_test_context(None).await;

        let response = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/healthz", None, None))
            .await
            .expect("response");
        let json = read_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["redis"], "disconnected");

        ctx.store.set_unavailable(true);
        let response =
            ctx.app.oneshot(json_request(Method::GET, "/healthz", None, None)).await.expect("response");
        let json = read_json(response).await;
        assert_eq!(json["status"], "unhealthy");
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let ctx = setup_test_context(None).await;

        let response = ctx
            .app
            .oneshot(json_request(Method::GET, "/metrics", None, None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let ctx = setup_test_context(None).await;
        std::env::set_var("PROMETHEUS_ENABLED", "1");
        let settings = crate::core::config::Settings::load().expect("settings");
        std::env::set_var("PROMETHEUS_ENABLED", "0");
        metrics::init(&settings).expect("metrics init");
        let app = super::router(crate::core::state::AppState::new(
            settings,
            ctx.state.redis().clone(),
            crate::core::state::Backends {
                store: ctx.store.clone(),
                provider: ctx.provider.clone(),
                inference: ctx.inference.clone(),
                images: ctx.images.clone(),
            },
        ));

        let response =
            app.oneshot(json_request(Method::GET, "/metrics", None, None)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn operator_secret_guards_api_routes() {
        let ctx = setup_test_context(Some("s3cret")).await;

        let denied = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/batch/jobs", Some("wrong"), None))
            .await
            .expect("response");
        let missing = ctx
            .app
            .clone()
            .oneshot(json_request(Method::GET, "/api/v1/batch/jobs", None, None))
            .await
            .expect("response");
        let allowed = ctx
            .app
            .oneshot(json_request(Method::GET, "/api/v1/batch/jobs", Some("s3cret"), None))
            .await
            .expect("response");

        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
