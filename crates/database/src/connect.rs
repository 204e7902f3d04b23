use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

/// Live ingestion, replay and delayed legacy retries write concurrently.
const MAX_CONNECTIONS: u32 = 16;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(MAX_CONNECTIONS)
        .connect_timeout(CONNECT_TIMEOUT)
        .sqlx_logging(false);

    let conn = Database::connect(opt).await?;
    conn.ping().await?;
    info!(max_connections = MAX_CONNECTIONS, "Database connection pool ready");
    Ok(conn)
}
