//! Snowflake destination over the session/query REST protocol.
//!
//! - `POST /session/v1/login-request`: authenticate, returns a session token
//! - `POST /queries/v1/query-request`: run one statement, optionally with
//!   array bindings (one request inserts a whole batch)
//! - `POST /session?delete=true`: log out
//!
//! Statement failures come back as HTTP 200 with `success: false` and a
//! vendor error code; those become [`MigrateError::DestinationProgramming`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DestinationConfig;
use crate::core::traits::{DestinationConnection, DestinationConnector, StatementResult};
use crate::core::value::Row;
use crate::error::{MigrateError, Result};

use super::auth::{external_browser_login, AuthMode, SsoPrompt};

const CLIENT_APP_ID: &str = "mssql-snowflake-migrate";

/// Accept header Snowflake expects on query requests.
const SNOWFLAKE_ACCEPT: &str = "application/snowflake";

/// Codes returned while a statement is still running.
const QUERY_IN_PROGRESS: &str = "333333";
const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

/// Delay between result polls for long-running statements.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Envelope of every Snowflake REST response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub code: Option<Value>,
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(rename = "queryId", default)]
    query_id: Option<String>,
    #[serde(default)]
    rowset: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    stats: Option<QueryStats>,
    #[serde(rename = "getResultUrl", default)]
    get_result_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryStats {
    #[serde(rename = "numRowsInserted", default)]
    num_rows_inserted: Option<u64>,
    #[serde(rename = "numRowsUpdated", default)]
    num_rows_updated: Option<u64>,
    #[serde(rename = "numRowsDeleted", default)]
    num_rows_deleted: Option<u64>,
}

impl QueryData {
    /// Rows affected, from the DML stats or the single-cell result rowset.
    fn rows_affected(&self) -> Option<u64> {
        if let Some(stats) = &self.stats {
            let total = [
                stats.num_rows_inserted,
                stats.num_rows_updated,
                stats.num_rows_deleted,
            ]
            .into_iter()
            .flatten()
            .reduce(|a, b| a + b);
            if total.is_some() {
                return total;
            }
        }
        let cell = self.rowset.as_ref()?.first()?.first()?;
        match cell {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Account locator part used as `ACCOUNT_NAME` (`xy12345.eu-west-1` → `XY12345`).
pub(crate) fn account_name(account: &str) -> String {
    account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase()
}

/// Client identification fields sent with login and authenticator requests.
pub(crate) fn client_app_fields() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("CLIENT_APP_ID".into(), json!(CLIENT_APP_ID));
    data.insert("CLIENT_APP_VERSION".into(), json!(env!("CARGO_PKG_VERSION")));
    data
}

/// Render a response's error code and message.
pub(crate) fn error_text(code: &Option<Value>, message: &Option<String>) -> String {
    format!(
        "{}: {}",
        code_text(code),
        message.as_deref().unwrap_or("no message")
    )
}

fn code_text(code: &Option<Value>) -> String {
    match code {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

/// `https://<account>.snowflakecomputing.com`, or the configured host.
pub fn base_url(config: &DestinationConfig) -> Result<Url> {
    let raw = match config.host.as_deref().map(str::trim) {
        Some(host) if host.contains("://") => host.to_string(),
        Some(host) if !host.is_empty() => format!("https://{}", host),
        _ => format!(
            "https://{}.snowflakecomputing.com",
            config.account.trim().to_lowercase()
        ),
    };
    Url::parse(&raw)
        .map_err(|e| MigrateError::Config(format!("invalid Snowflake host '{}': {}", raw, e)))
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| MigrateError::DestinationConnection(format!("invalid URL {}: {}", path, e)))
}

/// Opens authenticated Snowflake sessions.
pub struct SnowflakeConnector {
    config: DestinationConfig,
    auth: AuthMode,
    base_url: Url,
    client: Client,
    sso_prompt: Option<SsoPrompt>,
}

impl SnowflakeConnector {
    pub fn new(config: DestinationConfig) -> Result<Self> {
        let base_url = base_url(&config)?;
        Self::with_base_url(config, base_url)
    }

    /// Use an explicit endpoint instead of the account URL.
    pub fn with_base_url(config: DestinationConfig, base_url: Url) -> Result<Self> {
        let auth = AuthMode::from_config(&config)?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("mssql-snowflake-migrate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            auth,
            base_url,
            client,
            sso_prompt: None,
        })
    }

    /// Deliver the external-browser sign-in URL through `prompt`.
    pub fn with_sso_prompt(mut self, prompt: SsoPrompt) -> Self {
        self.sso_prompt = Some(prompt);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn login_url(&self) -> Result<Url> {
        let mut url = endpoint(&self.base_url, "/session/v1/login-request")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("databaseName", &self.config.database);
            query.append_pair("schemaName", &self.config.schema);
            query.append_pair("warehouse", &self.config.warehouse);
            if let Some(role) = &self.config.role {
                query.append_pair("roleName", role);
            }
            query.append_pair("request_id", &Uuid::new_v4().to_string());
        }
        Ok(url)
    }

    fn login_body(&self, sso: Option<(&str, &str)>) -> Value {
        let mut data = client_app_fields();
        data.insert(
            "ACCOUNT_NAME".into(),
            json!(account_name(&self.config.account)),
        );
        data.insert("LOGIN_NAME".into(), json!(self.config.user));
        data.insert("AUTHENTICATOR".into(), json!(self.auth.authenticator()));
        match (&self.auth, sso) {
            (AuthMode::Password(password), _) => {
                data.insert("PASSWORD".into(), json!(password));
            }
            (AuthMode::OAuth(token), _) => {
                data.insert("TOKEN".into(), json!(token));
            }
            (AuthMode::ExternalBrowser, Some((token, proof_key))) => {
                data.insert("TOKEN".into(), json!(token));
                data.insert("PROOF_KEY".into(), json!(proof_key));
            }
            (AuthMode::ExternalBrowser, None) => {}
        }
        data.insert(
            "SESSION_PARAMETERS".into(),
            json!({ "AUTOCOMMIT": true, "TIMESTAMP_TYPE_MAPPING": "TIMESTAMP_NTZ" }),
        );
        json!({ "data": data })
    }

    async fn login(&self) -> Result<String> {
        let sso = match self.auth {
            AuthMode::ExternalBrowser => {
                Some(external_browser_login(
                    &self.client,
                    &self.base_url,
                    &self.config,
                    self.sso_prompt.as_ref(),
                )
                .await?)
            }
            _ => None,
        };
        let body = self.login_body(
            sso.as_ref()
                .map(|c| (c.token.as_str(), c.proof_key.as_str())),
        );

        let response = self
            .client
            .post(self.login_url()?)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| MigrateError::DestinationConnection(format!("login request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MigrateError::DestinationConnection(format!(
                "login request returned HTTP {}",
                status
            )));
        }

        let envelope: ApiResponse<LoginData> = response.json().await?;
        match envelope {
            ApiResponse {
                success: true,
                data: Some(data),
                ..
            } => Ok(data.token),
            other => Err(MigrateError::DestinationConnection(error_text(
                &other.code,
                &other.message,
            ))),
        }
    }
}

#[async_trait]
impl DestinationConnector for SnowflakeConnector {
    async fn connect(&self) -> Result<Box<dyn DestinationConnection>> {
        info!(
            "Connecting to Snowflake account {} as {} ({})",
            self.config.account,
            self.config.user,
            self.auth.authenticator()
        );
        let token = self.login().await?;
        info!(
            "Connected to Snowflake: {}.{} (warehouse {})",
            self.config.database, self.config.schema, self.config.warehouse
        );
        Ok(Box::new(SnowflakeSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
            sequence_id: 0,
            poll_timeout: self.config.request_timeout(),
        }))
    }

    fn db_type(&self) -> &str {
        "snowflake"
    }
}

/// An authenticated Snowflake session.
pub struct SnowflakeSession {
    client: Client,
    base_url: Url,
    token: Option<String>,
    sequence_id: u64,
    poll_timeout: Duration,
}

impl SnowflakeSession {
    fn auth_header(&self) -> Result<HeaderValue> {
        let token = self.token.as_deref().ok_or_else(|| {
            MigrateError::DestinationConnection("session is closed".to_string())
        })?;
        HeaderValue::from_str(&format!("Snowflake Token=\"{}\"", token))
            .map_err(|e| MigrateError::DestinationConnection(format!("invalid session token: {}", e)))
    }

    async fn post_query(&mut self, sql: &str, bindings: Option<Value>) -> Result<QueryData> {
        self.sequence_id += 1;
        let mut url = endpoint(&self.base_url, "/queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let mut body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence_id,
        });
        if let Some(bindings) = bindings {
            body["bindings"] = bindings;
        }

        let envelope: ApiResponse<QueryData> = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header()?)
            .header(ACCEPT, SNOWFLAKE_ACCEPT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.finish_query(envelope).await
    }

    /// Follow `getResultUrl` while the statement is still running.
    async fn finish_query(&self, mut envelope: ApiResponse<QueryData>) -> Result<QueryData> {
        let started = Instant::now();
        loop {
            let code = code_text(&envelope.code);
            let in_progress = code == QUERY_IN_PROGRESS || code == QUERY_IN_PROGRESS_ASYNC;
            if envelope.success && !in_progress {
                return Ok(envelope.data.unwrap_or_default());
            }
            if !in_progress {
                return Err(MigrateError::programming(
                    code,
                    envelope.message.unwrap_or_default(),
                ));
            }

            let result_url = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| MigrateError::programming(code.clone(), "query in progress without result URL"))?;
            if started.elapsed() > self.poll_timeout {
                return Err(MigrateError::programming(
                    code,
                    format!("query still running after {}s", self.poll_timeout.as_secs()),
                ));
            }
            debug!("Statement still running, polling {}", result_url);
            tokio::time::sleep(POLL_INTERVAL).await;
            envelope = self.get_json(&result_url).await?;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        Ok(self
            .client
            .get(endpoint(&self.base_url, path)?)
            .header(AUTHORIZATION, self.auth_header()?)
            .header(ACCEPT, SNOWFLAKE_ACCEPT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

/// Column-major `TEXT` array bindings for a positional INSERT.
fn array_bindings(rows: &[Row]) -> Value {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    let mut bindings = Map::new();
    for col in 0..width {
        let values: Vec<Value> = rows
            .iter()
            .map(|row| {
                row.get(col)
                    .and_then(|v| v.to_binding_text())
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            })
            .collect();
        bindings.insert(
            (col + 1).to_string(),
            json!({ "type": "TEXT", "value": values }),
        );
    }
    Value::Object(bindings)
}

#[async_trait]
impl DestinationConnection for SnowflakeSession {
    async fn execute(&mut self, sql: &str) -> Result<StatementResult> {
        let data = self.post_query(sql, None).await?;
        debug!("Executed statement, query id {:?}", data.query_id);
        Ok(StatementResult {
            rows_affected: data.rows_affected(),
            query_id: data.query_id,
        })
    }

    async fn insert_rows(&mut self, insert_sql: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let data = self
            .post_query(insert_sql, Some(array_bindings(rows)))
            .await?;
        Ok(data.rows_affected().unwrap_or(rows.len() as u64))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let mut url = endpoint(&self.base_url, "/session")?;
        url.query_pairs_mut().append_pair("delete", "true");

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Snowflake Token=\"{}\"", token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            warn!("Snowflake logout returned HTTP {}", response.status());
            return Err(MigrateError::DestinationConnection(format!(
                "logout returned HTTP {}",
                response.status()
            )));
        }
        debug!("Snowflake session closed");
        Ok(())
    }
}
