use axum::{extract::Request, middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{auth, gate, profile, routes, state::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::pages::router())
        .nest("/api/auth", auth::router())
        .nest("/api/v1/profile", profile::router())
        .route("/api/health", get(routes::health::health))
        .layer(middleware::from_fn_with_state(state.clone(), gate::gate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(status = %response.status(), ?latency, "response");
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into());
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Route conflicts panic when the router is assembled. The fake state's
    // lazy pool spawns maintenance tasks, so a runtime must be present.
    #[tokio::test]
    async fn router_builds_without_route_conflicts() {
        let _ = build_app(AppState::fake());
    }
}
