use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::config::Endpoint;
use crate::driver::{Connector, DriverConnection, DriverCursor, StatementOutput};
use crate::error::DriverError;
use crate::types::RowValues;

use super::classify::classify_error;
use super::params::Params;
use super::query::build_result_set;

/// How long `close` waits for the connection task to flush its terminate message.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Opens plain-TCP `tokio_postgres` connections.
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    application_name: Option<String>,
}

impl PgConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// The `tokio_postgres` config used for every connection to `endpoint`.
    #[must_use]
    pub fn pg_config(&self, endpoint: &Endpoint, timeout: Duration) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&endpoint.host)
            .port(endpoint.port)
            .dbname(&endpoint.database)
            .user(&endpoint.user)
            .password(&endpoint.password)
            .connect_timeout(timeout);
        if let Some(name) = &self.application_name {
            cfg.application_name(name);
        }
        cfg
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgConnection;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<PgConnection, DriverError> {
        let cfg = self.pg_config(endpoint, timeout);
        let (client, connection) = cfg.connect(NoTls).await.map_err(classify_error)?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(error = %err, "postgres connection task ended with error");
            }
        });
        Ok(PgConnection {
            client: Arc::new(client),
            driver,
        })
    }
}

/// A live connection; outside of an explicit transaction every statement autocommits.
pub struct PgConnection {
    client: Arc<Client>,
    driver: JoinHandle<()>,
}

#[async_trait]
impl DriverConnection for PgConnection {
    type Cursor = PgCursor;

    fn is_usable(&self) -> bool {
        !self.client.is_closed()
    }

    fn cursor(&self) -> Result<PgCursor, DriverError> {
        if self.client.is_closed() {
            return Err(DriverError::transient("connection closed"));
        }
        Ok(PgCursor {
            client: Some(Arc::clone(&self.client)),
        })
    }

    async fn close(self) -> Result<(), DriverError> {
        let PgConnection { client, mut driver } = self;
        // the connection task finishes once the last client handle is gone
        drop(client);
        match tokio::time::timeout(CLOSE_GRACE, &mut driver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(DriverError::permanent(format!(
                "postgres connection task failed: {join_err}"
            ))),
            Err(_) => {
                driver.abort();
                Err(DriverError::transient(
                    "postgres connection did not shut down in time; aborted",
                ))
            }
        }
    }
}

/// Statement handle sharing the connection's client.
pub struct PgCursor {
    client: Option<Arc<Client>>,
}

#[async_trait]
impl DriverCursor for PgCursor {
    fn is_closed(&self) -> bool {
        self.client.as_ref().is_none_or(|c| c.is_closed())
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<StatementOutput, DriverError> {
        let client = match &self.client {
            Some(client) if !client.is_closed() => Arc::clone(client),
            _ => return Err(DriverError::transient("cursor already closed")),
        };

        let stmt = client.prepare(sql).await.map_err(classify_error)?;
        let converted = Params::convert(params);

        // a statement that describes columns yields rows; anything else reports a count
        if stmt.columns().is_empty() {
            let rows_affected = client
                .execute(&stmt, converted.as_refs())
                .await
                .map_err(classify_error)?;
            Ok(StatementOutput::Command { rows_affected })
        } else {
            let rows = client
                .query(&stmt, converted.as_refs())
                .await
                .map_err(classify_error)?;
            Ok(StatementOutput::Rows(build_result_set(&stmt, &rows)?))
        }
    }

    fn close(&mut self) {
        self.client = None;
    }
}
