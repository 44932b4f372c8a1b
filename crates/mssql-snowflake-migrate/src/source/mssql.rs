//! MSSQL source connection over Tiberius (TDS).
//!
//! One [`MssqlConnection`] is opened per table job and closed when the job
//! leaves extraction. Rows are fully materialised as owned [`SqlValue`]s.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{Client, ColumnData, ColumnType, Config, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::SourceConfig;
use crate::core::schema::ResultColumn;
use crate::core::traits::{QueryResult, SourceConnection, SourceConnector};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

/// Opens Tiberius connections from an ADO.NET connection string.
pub struct MssqlConnector {
    config: SourceConfig,
}

impl MssqlConnector {
    /// Create a connector, rejecting connection strings Tiberius cannot parse.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let connector = Self { config };
        connector.tiberius_config()?;
        Ok(connector)
    }

    fn tiberius_config(&self) -> Result<Config> {
        Config::from_ado_string(&self.config.connection_string).map_err(|e| {
            MigrateError::Config(format!("source.connection_string is invalid: {}", e))
        })
    }

    /// `host:port` the connector dials.
    pub fn addr(&self) -> Result<String> {
        Ok(self.tiberius_config()?.get_addr())
    }
}

#[async_trait]
impl SourceConnector for MssqlConnector {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>> {
        let config = self.tiberius_config()?;
        let addr = config.get_addr();
        let timeout = self.config.connect_timeout();

        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MigrateError::SourceConnection {
                code: None,
                state: None,
                message: format!("timed out after {}s connecting to {}", timeout.as_secs(), addr),
            })?
            .map_err(|e| MigrateError::SourceConnection {
                code: None,
                state: None,
                message: format!("{}: {}", addr, e),
            })?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(MigrateError::source_connection)?;
        debug!("Connected to MSSQL at {}", addr);

        Ok(Box::new(MssqlConnection {
            client: Some(client),
        }))
    }

    fn db_type(&self) -> &str {
        "mssql"
    }
}

/// A live Tiberius client. `None` once closed.
pub struct MssqlConnection {
    client: Option<Client<Compat<TcpStream>>>,
}

#[async_trait]
impl SourceConnection for MssqlConnection {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<QueryResult> {
        let client = self.client.as_mut().ok_or_else(|| MigrateError::SourceQuery {
            code: None,
            state: None,
            message: "connection is closed".to_string(),
        })?;

        let mut query = Query::new(sql);
        for param in params {
            query.bind(param.to_string());
        }

        let mut stream = query
            .query(client)
            .await
            .map_err(MigrateError::source_query)?;

        // Metadata arrives before the first row, so columns are known even
        // for an empty result.
        let columns: Vec<ResultColumn> = match stream.columns().await.map_err(MigrateError::source_query)? {
            Some(cols) => cols
                .iter()
                .map(|c| ResultColumn::new(c.name(), native_type_name(c.column_type())))
                .collect(),
            None => Vec::new(),
        };

        let rows: Vec<Row> = stream
            .into_first_result()
            .await
            .map_err(MigrateError::source_query)?
            .into_iter()
            .map(|row| row.into_iter().map(convert_value).collect())
            .collect();

        debug!("Query returned {} rows, {} columns", rows.len(), columns.len());
        Ok(QueryResult { columns, rows })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await.map_err(MigrateError::source_connection)?;
        }
        Ok(())
    }
}

/// SQL Server type name for result-set metadata.
fn native_type_name(ty: ColumnType) -> Option<&'static str> {
    let name = match ty {
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money => "money",
        ColumnType::Money4 => "smallmoney",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::BigChar => "char",
        ColumnType::BigVarChar => "varchar",
        ColumnType::NChar => "nchar",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::BigBinary => "binary",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::Image => "image",
        ColumnType::Xml => "xml",
        _ => return None,
    };
    Some(name)
}

/// Convert one TDS value to an owned [`SqlValue`].
fn convert_value(data: ColumnData<'static>) -> SqlValue {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::I16(i16::from(v))),
        ColumnData::I16(v) => v.map(SqlValue::I16),
        ColumnData::I32(v) => v.map(SqlValue::I32),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(SqlValue::F32),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.map(|s| SqlValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.map(|b| SqlValue::Bytes(b.into_owned())),
        ColumnData::Xml(v) => v.map(|x| SqlValue::Text(x.into_owned().into_string())),
        ColumnData::Numeric(v) => v.map(|n| convert_numeric(n.value(), n.scale())),
        other => convert_typed(&other),
    };
    value.unwrap_or(SqlValue::Null)
}

/// SQL Server decimals reach 38 digits and scale 38, past what `Decimal`
/// holds. Those values are carried as their exact text instead.
fn convert_numeric(value: i128, scale: u8) -> SqlValue {
    match Decimal::try_from_i128_with_scale(value, u32::from(scale)) {
        Ok(d) => SqlValue::Decimal(d),
        Err(_) => SqlValue::Text(numeric_text(value, scale)),
    }
}

fn numeric_text(value: i128, scale: u8) -> String {
    let digits = value.unsigned_abs().to_string();
    let sign = if value < 0 { "-" } else { "" };
    let scale = usize::from(scale);
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }
    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int_part, frac_part)
}

/// Temporal values, decoded through Tiberius' chrono conversions.
fn convert_typed(data: &ColumnData<'static>) -> Option<SqlValue> {
    match data {
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .ok()
                .flatten()
                .map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data).ok().flatten().map(SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data).ok().flatten().map(SqlValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .ok()
            .flatten()
            .map(SqlValue::DateTimeOffset),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::str::FromStr;

    fn source(conn: &str) -> SourceConfig {
        SourceConfig {
            connection_string: conn.to_string(),
            connect_timeout_secs: 5,
        }
    }

    #[test]
    fn test_connector_resolves_address() {
        let connector = MssqlConnector::new(source(
            "Server=tcp:sql01.corp.local,1433;Database=Data_Lab_NCL;User Id=etl;Password=pw;TrustServerCertificate=true",
        ))
        .unwrap();
        assert_eq!(connector.addr().unwrap(), "sql01.corp.local:1433");
        assert_eq!(connector.db_type(), "mssql");
    }

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(convert_value(ColumnData::I32(Some(42))), SqlValue::I32(42));
        assert_eq!(convert_value(ColumnData::U8(Some(7))), SqlValue::I16(7));
        assert_eq!(convert_value(ColumnData::Bit(Some(true))), SqlValue::Bool(true));
        assert_eq!(
            convert_value(ColumnData::String(Some(Cow::Borrowed("north")))),
            SqlValue::Text("north".into())
        );
        assert_eq!(
            convert_value(ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad])))),
            SqlValue::Bytes(vec![0xde, 0xad])
        );
    }

    #[test]
    fn test_nulls_of_any_type() {
        assert_eq!(convert_value(ColumnData::I64(None)), SqlValue::Null);
        assert_eq!(convert_value(ColumnData::String(None)), SqlValue::Null);
        assert_eq!(convert_value(ColumnData::Numeric(None)), SqlValue::Null);
        assert_eq!(convert_value(ColumnData::DateTime2(None)), SqlValue::Null);
    }

    #[test]
    fn test_numeric_to_decimal() {
        let value = convert_value(ColumnData::Numeric(Some(
            tiberius::numeric::Numeric::new_with_scale(12345, 2),
        )));
        assert_eq!(value, SqlValue::Decimal(Decimal::from_str("123.45").unwrap()));
    }

    #[test]
    fn test_numeric_beyond_decimal_range_keeps_exact_text() {
        let wide = convert_value(ColumnData::Numeric(Some(
            tiberius::numeric::Numeric::new_with_scale(10i128.pow(30), 0),
        )));
        assert_eq!(wide, SqlValue::Text(format!("1{}", "0".repeat(30))));

        let deep = convert_value(ColumnData::Numeric(Some(
            tiberius::numeric::Numeric::new_with_scale(15 * 10i128.pow(29), 30),
        )));
        assert_eq!(deep, SqlValue::Text(format!("1.5{}", "0".repeat(29))));
    }

    #[test]
    fn test_numeric_text_rendering() {
        assert_eq!(numeric_text(-5, 2), "-0.05");
        assert_eq!(numeric_text(12345, 2), "123.45");
        assert_eq!(numeric_text(-42, 0), "-42");
        assert_eq!(convert_numeric(-5, 2), SqlValue::Decimal(Decimal::new(-5, 2)));
    }

    #[test]
    fn test_native_type_names() {
        assert_eq!(native_type_name(ColumnType::Int4), Some("int"));
        assert_eq!(native_type_name(ColumnType::NVarchar), Some("nvarchar"));
        assert_eq!(native_type_name(ColumnType::Datetime2), Some("datetime2"));
        assert_eq!(native_type_name(ColumnType::DatetimeOffsetn), Some("datetimeoffset"));
        assert_eq!(native_type_name(ColumnType::SSVariant), None);
    }
}
