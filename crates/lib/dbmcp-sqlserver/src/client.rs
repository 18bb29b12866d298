//! `tiberius` backed connector and handle.

use std::error::Error;
use std::fmt;

use dbmcp_core::Connector;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::SqlServerConfig;
use crate::session::{
    DESCRIBE_TABLE_SQL,
    ExecuteSummary,
    JsonRow,
    LIST_TABLES_SQL,
    ROW_COUNT_SQL,
    SqlSession,
};
use crate::values::row_to_json;

type TdsClient = Client<Compat<TcpStream>>;

#[derive(Debug)]
pub enum SqlServerError {
    Io(std::io::Error),
    Tds(Box<tiberius::error::Error>),
    Closed,
}

impl fmt::Display for SqlServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "SQL Server connection error: {err}"),
            Self::Tds(err) => write!(f, "SQL Server error: {err}"),
            Self::Closed => write!(f, "SQL Server connection is closed"),
        }
    }
}

impl Error for SqlServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Tds(err) => Some(err.as_ref()),
            Self::Closed => None,
        }
    }
}

impl From<std::io::Error> for SqlServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tiberius::error::Error> for SqlServerError {
    fn from(err: tiberius::error::Error) -> Self {
        Self::Tds(Box::new(err))
    }
}

/// Opens one TDS connection per backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerConnector;

impl SqlServerConnector {
    fn tds_config(config: &SqlServerConfig) -> Config {
        let mut tds = Config::new();
        tds.host(&config.server);
        tds.port(config.port);
        tds.database(&config.database);
        tds.authentication(AuthMethod::sql_server(&config.user, &config.password));
        tds.encryption(if config.options.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if config.options.trust_server_certificate {
            tds.trust_cert();
        }
        tds
    }

    async fn connect_tds(tds: Config) -> Result<TdsClient, SqlServerError> {
        let tcp = TcpStream::connect(tds.get_addr()).await?;
        tcp.set_nodelay(true)?;
        Ok(Client::connect(tds, tcp.compat_write()).await?)
    }
}

impl Connector for SqlServerConnector {
    type Config = SqlServerConfig;
    type Handle = SqlServerClient;
    type Error = SqlServerError;

    async fn open(&self, name: &str, config: &SqlServerConfig) -> Result<SqlServerClient, SqlServerError> {
        let tds = Self::tds_config(config);
        let client = match Self::connect_tds(tds.clone()).await {
            Ok(client) => client,
            // Azure SQL gateways may redirect the login to another node.
            Err(SqlServerError::Tds(err)) => match *err {
                tiberius::error::Error::Routing { host, port } => {
                    debug!(backend = name, %host, port, "following SQL Server routing redirect");
                    let mut routed = tds;
                    routed.host(&host);
                    routed.port(port);
                    Self::connect_tds(routed).await?
                }
                other => return Err(other.into()),
            },
            Err(err) => return Err(err),
        };
        debug!(backend = name, server = %config.server, "SQL Server connection established");
        Ok(SqlServerClient {
            client: Mutex::new(Some(client)),
        })
    }

    async fn close(&self, handle: &SqlServerClient) -> Result<(), SqlServerError> {
        let client = handle.client.lock().await.take();
        match client {
            Some(client) => Ok(client.close().await?),
            None => Ok(()),
        }
    }
}

/// Live connection to one SQL Server database.
///
/// Statements on the same backend run one at a time.
pub struct SqlServerClient {
    client: Mutex<Option<TdsClient>>,
}

impl SqlServerClient {
    async fn first_result(
        &self,
        sql: &str,
        table: Option<&str>,
    ) -> Result<Vec<JsonRow>, SqlServerError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(SqlServerError::Closed)?;
        let stream = match table {
            Some(table) => client.query(sql, &[&table]).await?,
            None => client.simple_query(sql).await?,
        };
        let rows = stream.into_first_result().await?;
        Ok(rows.into_iter().map(row_to_json).collect())
    }
}

impl SqlSession for SqlServerClient {
    async fn select(&self, sql: &str) -> Result<Vec<JsonRow>, SqlServerError> {
        self.first_result(sql, None).await
    }

    async fn execute(&self, sql: &str) -> Result<ExecuteSummary, SqlServerError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(SqlServerError::Closed)?;
        let recordset = client
            .simple_query(sql)
            .await?
            .into_results()
            .await?
            .into_iter()
            .next()
            .map(|rows| rows.into_iter().map(row_to_json).collect())
            .unwrap_or_default();
        // The row stream drops DONE counts, so read the session's counter
        // in a follow-up batch on the same connection.
        let counted = client.simple_query(ROW_COUNT_SQL).await?.into_row().await?;
        let rows_affected = counted
            .map(|row| row.try_get::<i32, _>(0))
            .transpose()?
            .flatten()
            .and_then(|count| u64::try_from(count).ok())
            .unwrap_or_default();
        Ok(ExecuteSummary {
            rows_affected: vec![rows_affected],
            recordset,
        })
    }

    async fn list_tables(&self) -> Result<Vec<JsonRow>, SqlServerError> {
        self.first_result(LIST_TABLES_SQL, None).await
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<JsonRow>, SqlServerError> {
        self.first_result(DESCRIBE_TABLE_SQL, Some(table)).await
    }
}
