//! SQL Server catalog connection backed by tiberius

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::db::connection::{CatalogConnection, CatalogRow, CatalogValue};
use crate::error::{Error, Result};

/// Connection settings for [`MssqlCatalog::connect`]
#[derive(Debug, Clone)]
pub struct MssqlSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub encrypt: bool,
    pub trust_server_cert: bool,
}

impl MssqlSettings {
    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));

        if self.encrypt {
            if self.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

/// A single tiberius client shared behind a lock
pub struct MssqlCatalog {
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl MssqlCatalog {
    pub fn new(client: Client<Compat<TcpStream>>) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    pub async fn connect(settings: &MssqlSettings) -> Result<Self> {
        let config = settings.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Error::ConnectionFailure(format!("Failed to reach {}: {}", settings.host, e)))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        tracing::debug!(host = %settings.host, database = %settings.database, "Connected to SQL Server");

        Ok(Self::new(client))
    }
}

#[async_trait]
impl CatalogConnection for MssqlCatalog {
    async fn fetch_all(&self, sql: &str, params: &[&str]) -> Result<Vec<CatalogRow>> {
        let mut query = Query::new(sql.to_string());
        for param in params {
            query.bind(param.to_string());
        }

        let mut client = self.client.lock().await;
        let rows = query.query(&mut *client).await?.into_first_result().await?;

        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(column_value)
                    .collect::<Result<Vec<_>>>()
                    .map(CatalogRow::new)
            })
            .collect()
    }
}

fn column_value(data: ColumnData<'static>) -> Result<CatalogValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map_or(CatalogValue::Null, CatalogValue::Bool),
        ColumnData::U8(v) => v.map_or(CatalogValue::Null, |i| CatalogValue::Int(i64::from(i))),
        ColumnData::I16(v) => v.map_or(CatalogValue::Null, |i| CatalogValue::Int(i64::from(i))),
        ColumnData::I32(v) => v.map_or(CatalogValue::Null, |i| CatalogValue::Int(i64::from(i))),
        ColumnData::I64(v) => v.map_or(CatalogValue::Null, CatalogValue::Int),
        ColumnData::F32(v) => v.map_or(CatalogValue::Null, |f| CatalogValue::Text(f.to_string())),
        ColumnData::F64(v) => v.map_or(CatalogValue::Null, |f| CatalogValue::Text(f.to_string())),
        ColumnData::Numeric(v) => v.map_or(CatalogValue::Null, |n| CatalogValue::Text(n.to_string())),
        ColumnData::String(v) => v.map_or(CatalogValue::Null, |s| CatalogValue::Text(s.into_owned())),
        ColumnData::Binary(v) => v.map_or(CatalogValue::Null, |b| CatalogValue::Bytes(b.into_owned())),
        ColumnData::Guid(v) => v.map_or(CatalogValue::Null, |g| CatalogValue::Text(g.to_string())),
        other => {
            return Err(Error::CatalogValue(format!(
                "Unsupported SQL Server catalog value: {:?}",
                other
            )))
        }
    };

    Ok(value)
}
