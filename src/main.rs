use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod config;
mod cookies;
mod email;
mod gate;
mod profile;
mod routes;
mod state;
mod storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flock_server=debug,axum=info,tower_http=info"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let state = state::AppState::init().await?;

    sqlx::migrate!("./migrations").run(&state.db).await?;
    state.auth.purge_expired().await;

    let app = app::build_app(state);
    app::serve(app).await
}
