use plotchat_llm::{OpenAIChatModel, OpenAIChatModelOptions};
use plotchat_server::{app, AppState, BoxedError, DatasetStore};
use std::{env, net::SocketAddr, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxedError> {
    // Load .env before reading any configuration; missing file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_key = env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY must be set")?;
    let model_id = env::var("PLOTCHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
    let base_url = env::var("OPENAI_BASE_URL").ok();
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(4000);
    let static_dir =
        env::var("PLOTCHAT_STATIC_DIR").unwrap_or_else(|_| "client/build".to_string());

    let model = OpenAIChatModel::new(
        model_id,
        OpenAIChatModelOptions {
            base_url,
            api_key,
            client: None,
        },
    );

    let state = AppState {
        store: Arc::new(DatasetStore::new()),
        model: Arc::new(model),
    };
    let router = app(state, &static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %static_dir, "server listening");
    axum::serve(listener, router).await?;

    Ok(())
}
