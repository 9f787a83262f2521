use std::sync::Arc;

use postgresql_embedded::PostgreSQL;

use crate::config::{Endpoint, SessionConfig};
use crate::reporter::NoopReporter;
use crate::session::Session;

/// A running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    /// Where the instance listens, with working credentials.
    pub endpoint: Endpoint,
}

impl EmbeddedPostgres {
    /// Session config pointing at this instance with the library defaults.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.endpoint.clone())
    }
}

/// Set up and start an embedded `PostgreSQL` instance with database `db_name`.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, if the database
/// cannot be created, or if the post-start connectivity check fails.
pub async fn setup_postgres_embedded(
    db_name: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    let mut postgresql = PostgreSQL::default();

    // bundled binaries, so nothing is downloaded here
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(db_name).await?;

    let settings = postgresql.settings();
    let endpoint = Endpoint::new(
        settings.host.clone(),
        settings.port,
        db_name,
        settings.username.clone(),
        settings.password.clone(),
    );
    tracing::info!(endpoint = %endpoint.label(), "embedded PostgreSQL started");

    let mut check = Session::new(
        SessionConfig::new(endpoint.clone()).with_retry_limit(0),
        Arc::new(NoopReporter),
    )?;
    check.connect().await?;
    check.close().await;

    Ok(EmbeddedPostgres {
        postgresql,
        endpoint,
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub async fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    if let Err(err) = postgresql.stop().await {
        tracing::warn!(error = %err, "failed to stop embedded PostgreSQL");
    }
}
