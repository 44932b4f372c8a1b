//! Snowflake authentication modes and the external-browser SSO flow.
//!
//! External-browser login runs in three steps:
//!
//! 1. `POST /session/authenticator-request` announces a local redirect port
//!    and returns the identity provider URL plus a proof key.
//! 2. The user opens that URL; after sign-in the browser is redirected to
//!    `http://localhost:<port>/?token=...`.
//! 3. The token and proof key are exchanged for a session in the regular
//!    login request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::{Authenticator, DestinationConfig};
use crate::error::{MigrateError, Result};

use super::snowflake::{account_name, client_app_fields, error_text, ApiResponse};

/// Largest redirect request we are willing to buffer.
const MAX_CALLBACK_BYTES: usize = 16 * 1024;

const CALLBACK_OK_BODY: &str = "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"/>\
<title>SAML Response for Snowflake</title></head><body>\
Your identity was confirmed and propagated to Snowflake. \
You can close this window now and go back where you started from.</body></html>";

/// Credentials used for the login request.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// `authenticator: snowflake`.
    Password(String),

    /// `authenticator: oauth`.
    OAuth(String),

    /// `authenticator: externalbrowser`.
    ExternalBrowser,
}

impl AuthMode {
    pub fn from_config(config: &DestinationConfig) -> Result<Self> {
        match config.authenticator {
            Authenticator::Snowflake => config
                .password
                .clone()
                .map(AuthMode::Password)
                .ok_or_else(|| MigrateError::Config("destination.password is required".into())),
            Authenticator::Oauth => config
                .token
                .clone()
                .map(AuthMode::OAuth)
                .ok_or_else(|| MigrateError::Config("destination.token is required".into())),
            Authenticator::Externalbrowser => Ok(AuthMode::ExternalBrowser),
        }
    }

    /// Value of the `AUTHENTICATOR` login field.
    pub fn authenticator(&self) -> &'static str {
        match self {
            AuthMode::Password(_) => "SNOWFLAKE",
            AuthMode::OAuth(_) => "OAUTH",
            AuthMode::ExternalBrowser => "EXTERNALBROWSER",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Password(_) => f.write_str("Password([REDACTED])"),
            AuthMode::OAuth(_) => f.write_str("OAuth([REDACTED])"),
            AuthMode::ExternalBrowser => f.write_str("ExternalBrowser"),
        }
    }
}

/// Token and proof key from a completed SSO round trip.
#[derive(Clone, PartialEq, Eq)]
pub struct SsoCredentials {
    pub token: String,
    pub proof_key: String,
}

impl fmt::Debug for SsoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoCredentials")
            .field("token", &"[REDACTED]")
            .field("proof_key", &"[REDACTED]")
            .finish()
    }
}

/// Hands the identity provider URL to whoever can open it (a CLI prompt, a
/// desktop launcher). Without one the URL is logged at `warn`.
pub type SsoPrompt = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct AuthenticatorData {
    #[serde(rename = "ssoUrl")]
    sso_url: String,
    #[serde(rename = "proofKey")]
    proof_key: String,
}

/// Run the external-browser flow and return the credentials for login.
pub async fn external_browser_login(
    client: &Client,
    base_url: &Url,
    config: &DestinationConfig,
    prompt: Option<&SsoPrompt>,
) -> Result<SsoCredentials> {
    let listener = TcpListener::bind(("127.0.0.1", config.sso_redirect_port)).await?;
    let port = listener.local_addr()?.port();
    debug!("SSO redirect listener on 127.0.0.1:{}", port);

    let (sso_url, proof_key) =
        request_sso_url(client, base_url, &config.account, &config.user, port).await?;

    info!("Waiting for browser sign-in (timeout {}s)", config.sso_timeout_secs);
    match prompt {
        Some(prompt) => prompt(&sso_url),
        None => warn!("Open this URL in a browser to sign in to Snowflake: {}", sso_url),
    }

    let token = wait_for_token(&listener, config.sso_timeout()).await?;
    info!("Received SSO token from browser redirect");

    Ok(SsoCredentials { token, proof_key })
}

/// Ask Snowflake for the identity provider URL. Returns `(sso_url, proof_key)`.
pub async fn request_sso_url(
    client: &Client,
    base_url: &Url,
    account: &str,
    user: &str,
    redirect_port: u16,
) -> Result<(String, String)> {
    let url = base_url
        .join("/session/authenticator-request")
        .map_err(|e| MigrateError::DestinationConnection(format!("invalid URL: {}", e)))?;

    let mut data = client_app_fields();
    data.insert("ACCOUNT_NAME".into(), json!(account_name(account)));
    data.insert("LOGIN_NAME".into(), json!(user));
    data.insert("AUTHENTICATOR".into(), json!("EXTERNALBROWSER"));
    data.insert(
        "BROWSER_MODE_REDIRECT_PORT".into(),
        json!(redirect_port.to_string()),
    );

    let response: ApiResponse<AuthenticatorData> = client
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(&json!({ "data": data }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    match response {
        ApiResponse {
            success: true,
            data: Some(data),
            ..
        } => Ok((data.sso_url, data.proof_key)),
        other => Err(MigrateError::DestinationConnection(format!(
            "SSO authenticator request failed: {}",
            error_text(&other.code, &other.message)
        ))),
    }
}

/// Accept redirects on `listener` until one carries a `token` parameter.
pub async fn wait_for_token(listener: &TcpListener, timeout: Duration) -> Result<String> {
    let accept_loop = async {
        loop {
            let (mut stream, peer) = listener.accept().await?;
            debug!("SSO redirect connection from {}", peer);
            match read_callback(&mut stream).await {
                Ok(Some(token)) => {
                    respond(&mut stream, "200 OK", CALLBACK_OK_BODY).await;
                    return Ok::<String, MigrateError>(token);
                }
                Ok(None) => {
                    respond(&mut stream, "400 Bad Request", "Missing token parameter.").await;
                }
                Err(e) => warn!("Ignoring malformed SSO redirect: {}", e),
            }
        }
    };

    tokio::time::timeout(timeout, accept_loop)
        .await
        .map_err(|_| {
            MigrateError::DestinationConnection(format!(
                "timed out after {}s waiting for the SSO browser redirect",
                timeout.as_secs()
            ))
        })?
}

async fn read_callback(stream: &mut TcpStream) -> Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.len() < MAX_CALLBACK_BYTES {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(token_from_request(&String::from_utf8_lossy(&buf)))
}

/// Pull the `token` query parameter out of a raw HTTP request head.
pub fn token_from_request(request: &str) -> Option<String> {
    let request_line = request.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    let url = Url::parse("http://localhost").ok()?.join(target).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!("Writing SSO redirect response failed: {}", e);
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_auth_mode_debug_redacts() {
        let debug = format!("{:?}", AuthMode::Password("hunter2".into()));
        assert_eq!(debug, "Password([REDACTED])");
        assert!(!format!("{:?}", AuthMode::OAuth("abc".into())).contains("abc"));
        assert_eq!(AuthMode::ExternalBrowser.authenticator(), "EXTERNALBROWSER");
    }

    #[test]
    fn test_token_from_request() {
        let request = "GET /?token=ver%3A1-hint%3A123&confirm=true HTTP/1.1\r\nHost: localhost:5000\r\n\r\n";
        assert_eq!(token_from_request(request).as_deref(), Some("ver:1-hint:123"));
        assert_eq!(token_from_request("GET /favicon.ico HTTP/1.1\r\n\r\n"), None);
        assert_eq!(token_from_request("GET /?token= HTTP/1.1\r\n\r\n"), None);
        assert_eq!(token_from_request(""), None);
    }

    #[tokio::test]
    async fn test_wait_for_token_skips_requests_without_token() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let browser = tokio::spawn(async move {
            let mut favicon = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            favicon
                .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            favicon.read_to_string(&mut response).await.unwrap();
            assert!(response.starts_with("HTTP/1.1 400"));

            let mut redirect = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            redirect
                .write_all(b"GET /?token=abc123 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                .await
                .unwrap();
            let mut response = String::new();
            redirect.read_to_string(&mut response).await.unwrap();
            response
        });

        let token = wait_for_token(&listener, Duration::from_secs(5)).await.unwrap();
        assert_eq!(token, "abc123");
        let response = browser.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Your identity was confirmed"));
    }

    #[tokio::test]
    async fn test_wait_for_token_times_out() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let err = wait_for_token(&listener, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::DestinationConnection(_)));
        assert!(err.to_string().contains("SSO browser redirect"));
    }

    #[tokio::test]
    async fn test_request_sso_url() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/session/authenticator-request")
            .match_body(Matcher::PartialJson(json!({
                "data": {
                    "ACCOUNT_NAME": "XY12345",
                    "LOGIN_NAME": "jane@example.com",
                    "AUTHENTICATOR": "EXTERNALBROWSER",
                    "BROWSER_MODE_REDIRECT_PORT": "5123"
                }
            })))
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"ssoUrl":"https://idp.example.com/sso?x=1","proofKey":"pk-1"}}"#)
            .create_async()
            .await;

        let base = Url::parse(&server.url()).unwrap();
        let (sso_url, proof_key) = request_sso_url(
            &Client::new(),
            &base,
            "xy12345.eu-west-1",
            "jane@example.com",
            5123,
        )
        .await
        .unwrap();

        assert_eq!(sso_url, "https://idp.example.com/sso?x=1");
        assert_eq!(proof_key, "pk-1");
        mock.assert_async().await;
    }

    fn sso_config(port: u16) -> DestinationConfig {
        DestinationConfig {
            account: "xy12345".to_string(),
            user: "jane@example.com".to_string(),
            database: "DATA_LAB".to_string(),
            schema: "DATA_ENGINEER".to_string(),
            warehouse: "WH_XS".to_string(),
            role: None,
            host: None,
            authenticator: Authenticator::Externalbrowser,
            password: None,
            token: None,
            request_timeout_secs: 30,
            sso_timeout_secs: 5,
            sso_redirect_port: port,
        }
    }

    #[tokio::test]
    async fn test_external_browser_login_hands_url_to_prompt() {
        let port = std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/session/authenticator-request")
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"ssoUrl":"https://idp.example.com/sso","proofKey":"pk-9"}}"#)
            .create_async()
            .await;

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let prompt: SsoPrompt = {
            let seen = Arc::clone(&seen);
            Arc::new(move |url: &str| {
                seen.lock().unwrap().push(url.to_string());
                tokio::spawn(async move {
                    let mut browser = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                    browser
                        .write_all(b"GET /?token=tok-9 HTTP/1.1\r\nHost: localhost\r\n\r\n")
                        .await
                        .unwrap();
                    let mut response = String::new();
                    let _ = browser.read_to_string(&mut response).await;
                });
            })
        };

        let base = Url::parse(&server.url()).unwrap();
        let creds = external_browser_login(&Client::new(), &base, &sso_config(port), Some(&prompt))
            .await
            .unwrap();

        assert_eq!(creds.token, "tok-9");
        assert_eq!(creds.proof_key, "pk-9");
        assert_eq!(*seen.lock().unwrap(), vec!["https://idp.example.com/sso".to_string()]);
    }

    #[tokio::test]
    async fn test_request_sso_url_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/session/authenticator-request")
            .with_status(200)
            .with_body(r#"{"success":false,"code":"390190","message":"There was an error related to the SAML Identity Provider account parameter.","data":null}"#)
            .create_async()
            .await;

        let base = Url::parse(&server.url()).unwrap();
        let err = request_sso_url(&Client::new(), &base, "acct", "jane", 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("390190"), "{}", err);
    }
}
