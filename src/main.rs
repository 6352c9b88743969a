use academy::{app, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "academy=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;
    let db = state.db.clone();

    let result = run(state).await;
    db.close().await;
    result
}

async fn run(state: AppState) -> anyhow::Result<()> {
    if let Some(admin) = state.config.bootstrap_admin.clone() {
        if state.users.ensure_admin(&admin.username, &admin.password).await? {
            tracing::info!(username = %admin.username, "bootstrap admin created");
        }
    }
    app::serve(app::build_app(state)).await
}
