//! An inventory-tracking web service with axum.

use lager_demo::{
    app,
    infra::{config, database, logging},
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    let _guard = logging::init_logging();

    let config = config::load_config()?;
    let db = database::init_db(&config.database);
    database::run_migrations(&db).await?;

    let listener = TcpListener::bind(&format!(
        "{}:{}",
        config.server.http_address, config.server.http_port
    ))
    .await?;
    app::run_app(listener, db, config).await?;

    Ok(())
}
