mod config;
mod error;
mod registry;
mod routes;
mod state;
mod store;
mod sync;
mod utils {
    pub mod clock;
}

use tracing::info;
use tracing_subscriber::EnvFilter;
use crate::{config::Config, state::AppState, store::Store};
use error::AppErr;

#[tokio::main]
async fn main() -> Result<(), AppErr> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = match config.database_url.as_deref() {
        Some(url) => Store::sqlite(url).await?,
        None      => Store::memory(),
    };
    if config.implicit_rooms { info!("implicit room creation enabled"); }

    let bind = config.bind;
    let app  = routes::app(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
