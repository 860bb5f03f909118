use crate::middleware::{auth_middleware, rate_limit_middleware, MiddlewareState, SecurityConfig};
use crate::routes;
use axum::{
    middleware as axum_mw,
    routing::{get, patch, post},
    Router,
};
use brebot_orchestrator::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// The HTTP API server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the API without auth or rate limiting.
    pub fn build(orchestrator: Orchestrator) -> Router {
        let state = Arc::new(AppState { orchestrator });
        Self::api(state).merge(Self::probes())
    }

    /// Build the API behind the auth and rate-limit middleware. `/health`
    /// stays open.
    pub fn build_with_security(orchestrator: Orchestrator, security: &SecurityConfig) -> Router {
        let state = Arc::new(AppState { orchestrator });
        let mw_state = Arc::new(MiddlewareState::new(security));

        let limiter_state = mw_state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                limiter_state
                    .rate_limiter
                    .forget_idle(Duration::from_secs(600));
            }
        });

        info!(
            auth = security.auth_enabled(),
            rps = security.max_requests_per_second,
            burst = security.max_burst,
            "API security enabled"
        );

        Self::api(state)
            .layer(
                ServiceBuilder::new()
                    .layer(axum_mw::from_fn_with_state(mw_state.clone(), auth_middleware))
                    .layer(axum_mw::from_fn_with_state(mw_state, rate_limit_middleware)),
            )
            .merge(Self::probes())
    }

    fn api(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/plan", post(routes::generate_plan))
            .route("/dispatch", post(routes::dispatch))
            .route("/jobs", get(routes::list_jobs))
            .route("/jobs/{id}", get(routes::get_job))
            .route("/jobs/{id}/retry", post(routes::retry_step))
            .route("/jobs/{id}/cancel", post(routes::cancel_job))
            .route("/artifacts", get(routes::list_artifacts))
            .route("/skills", get(routes::list_skills))
            .route("/skills/{id}", patch(routes::update_skill_policy))
            .route(
                "/approvals",
                get(routes::list_approvals).post(routes::resolve_approval),
            )
            .route(
                "/approvals/{id}",
                get(routes::get_approval).post(routes::resolve_approval_by_id),
            )
            .route("/status", get(routes::status))
            .route("/activity", get(routes::activity))
            .with_state(state)
    }

    fn probes() -> Router {
        Router::new().route("/health", get(routes::health))
    }
}
