// Stove HTTP client
//
// Wraps `reqwest::Client` with the stove's single endpoint, the
// cache-busting status poll, and the header set the firmware expects on
// authenticated writes. Session state (nonce, HSPIN) is owned by the
// caller; every write takes the secret explicitly so headers are always
// built from the value current at send time.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, preview};
use crate::status::StatusDocument;
use crate::transport::TransportConfig;

/// The only path the stove serves. GET reads status, POST writes commands.
pub const STATUS_PATH: &str = "/status.cgi";

/// Fixed token the vendor app sends with every write.
const APP_TOKEN: &str = "32bytes";

/// Backend the vendor app claims to relay for.
const APP_BACKEND: &str = "https://app.haassohn.com";

const HS_PIN_HEADER: &str = "x-hs-pin";
const BACKEND_HEADER: &str = "x-backend-ip";
const TOKEN_HEADER: &str = "token";

/// A single-field write accepted by `POST /status.cgi`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBody {
    /// Program selector (`prg`): heating program on or off.
    #[serde(rename = "prg")]
    Program(bool),
    /// Target room temperature (`sp_temp`) in °C.
    #[serde(rename = "sp_temp")]
    TargetTemperature(f64),
    /// Eco mode toggle (`eco_mode`).
    EcoMode(bool),
}

impl CommandBody {
    /// Wire name of the written field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Program(_) => "prg",
            Self::TargetTemperature(_) => "sp_temp",
            Self::EcoMode(_) => "eco_mode",
        }
    }

    /// JSON body, e.g. `{"sp_temp":21.5}`.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Deserialization {
            message: format!("failed to encode command: {e}"),
            body: String::new(),
        })
    }
}

/// Build the header set for an authenticated write.
///
/// Pure function of the target host, the body length and the current
/// session secret. Never cache the result: the secret rotates with the
/// nonce.
pub fn command_headers(host: &str, body_len: usize, secret: &SecretString) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, header_value(host)?);
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        HeaderName::from_static(BACKEND_HEADER),
        HeaderValue::from_static(APP_BACKEND),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("de-DE;q=1.0, en-DE;q=0.9"),
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip;q=1.0, compress;q=0.5"),
    );
    headers.insert(
        HeaderName::from_static(TOKEN_HEADER),
        HeaderValue::from_static(APP_TOKEN),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

    let mut pin = header_value(secret.expose_secret())?;
    pin.set_sensitive(true);
    headers.insert(HeaderName::from_static(HS_PIN_HEADER), pin);

    Ok(headers)
}

fn header_value(raw: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(raw).map_err(|e| Error::ClientBuild(format!("invalid header value: {e}")))
}

/// Raw HTTP client for one stove.
///
/// Holds no session state. [`poll_status`](Self::poll_status) is
/// unauthenticated; [`send_command`](Self::send_command) needs the
/// current session secret.
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl DeviceClient {
    /// Create a client for the stove at `base_url` (e.g. `http://192.168.1.50`).
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, transport.timeout.as_secs()))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, timeout_secs: u64) -> Self {
        Self {
            http,
            base_url,
            timeout_secs,
        }
    }

    /// The stove base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `host[:port]` as sent in the `Host` header.
    pub fn host(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    fn status_url(&self) -> Result<Url, Error> {
        Ok(self.base_url.join(STATUS_PATH)?)
    }

    /// Fetch the current status document.
    ///
    /// Adds a millisecond timestamp query parameter and no-cache headers;
    /// the stove's embedded server otherwise serves stale snapshots.
    pub async fn poll_status(&self) -> Result<StatusDocument, Error> {
        let mut url = self.status_url()?;
        url.query_pairs_mut()
            .append_pair("_", &chrono::Utc::now().timestamp_millis().to_string());

        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let body = Self::expect_ok(resp).await?;
        trace!(bytes = body.len(), "status body received");
        StatusDocument::from_body(&body)
    }

    /// Send one authenticated write.
    ///
    /// Succeeds only on HTTP 200; the response body (a fresh status
    /// document on most firmwares) is discarded.
    pub async fn send_command(&self, command: &CommandBody, secret: &SecretString) -> Result<(), Error> {
        let url = self.status_url()?;
        let body = command.to_json()?;
        let headers = command_headers(&self.host(), body.len(), secret)?;

        debug!(field = command.field(), "POST {}", url);

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        Self::expect_ok(resp).await.map(|_| ())
    }

    async fn expect_ok(resp: reqwest::Response) -> Result<String, Error> {
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: preview(&body),
            });
        }
        resp.text()
            .await
            .map_err(|e| Error::from_send(e, 0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_owned())
    }

    #[test]
    fn command_body_serializes_single_field() {
        assert_eq!(CommandBody::Program(true).to_json().unwrap(), r#"{"prg":true}"#);
        assert_eq!(
            CommandBody::TargetTemperature(21.5).to_json().unwrap(),
            r#"{"sp_temp":21.5}"#
        );
        assert_eq!(
            CommandBody::EcoMode(false).to_json().unwrap(),
            r#"{"eco_mode":false}"#
        );
    }

    #[test]
    fn headers_carry_secret_and_length() {
        let headers = command_headers("192.168.1.50", 14, &secret("deadbeef")).unwrap();
        assert_eq!(headers.get(HS_PIN_HEADER).unwrap(), "deadbeef");
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "14");
        assert_eq!(headers.get(header::HOST).unwrap(), "192.168.1.50");
        assert_eq!(headers.get(TOKEN_HEADER).unwrap(), APP_TOKEN);
        assert_eq!(headers.get(BACKEND_HEADER).unwrap(), APP_BACKEND);
        assert!(headers.get(HS_PIN_HEADER).unwrap().is_sensitive());
    }

    #[test]
    fn headers_follow_the_secret() {
        let a = command_headers("stove", 10, &secret("aaa")).unwrap();
        let b = command_headers("stove", 10, &secret("bbb")).unwrap();
        assert_ne!(a.get(HS_PIN_HEADER), b.get(HS_PIN_HEADER));
    }

    #[test]
    fn host_includes_explicit_port() {
        let client = DeviceClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://10.0.0.7:8080").unwrap(),
            5,
        );
        assert_eq!(client.host(), "10.0.0.7:8080");

        let client = DeviceClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://stove.local").unwrap(),
            5,
        );
        assert_eq!(client.host(), "stove.local");
    }
}
