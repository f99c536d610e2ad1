//! HTTP client for the trust broker's logical API.
//!
//! Only the two primitives the provider needs: read a path and write a JSON
//! body to a path. Both talk to `{address}/v1/{path}`.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, trace, Instrument};

use crate::broker_span;
use crate::secrets::{Result, SecretString, SecretsError};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Thin client over the broker's `/v1/` API.
#[derive(Debug, Clone)]
pub struct VaultHttpClient {
    client: Client,
    address: String,
    namespace: Option<String>,
}

impl VaultHttpClient {
    /// Create a client with a per-request timeout.
    pub fn new(address: &str, namespace: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            SecretsError::config_error(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client, address: address.trim_end_matches('/').to_string(), namespace })
    }

    /// Base address, without trailing slash.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn with_headers(&self, builder: RequestBuilder, token: Option<&SecretString>) -> RequestBuilder {
        let builder = match token {
            Some(token) => builder.header(TOKEN_HEADER, token.expose_secret()),
            None => builder,
        };
        match &self.namespace {
            Some(ns) => builder.header(NAMESPACE_HEADER, ns),
            None => builder,
        }
    }

    /// GET `path` and return the response's `data` object.
    ///
    /// `Ok(None)` when the path does not exist (404) or the response carries no data.
    pub async fn read(
        &self,
        token: &SecretString,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Map<String, Value>>> {
        self.get_data(token, path, query).instrument(broker_span!("GET", path)).await
    }

    async fn get_data(
        &self,
        token: &SecretString,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Map<String, Value>>> {
        let builder = self.with_headers(self.client.get(self.url(path)), Some(token));
        let builder = if query.is_empty() { builder } else { builder.query(query) };
        let response = builder.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Nothing stored at path");
            return Ok(None);
        }

        match handle_response(path, response).await? {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Object(data)) => Ok(Some(data)),
                Some(Value::Null) | None => Ok(None),
                Some(_) => Err(SecretsError::unexpected_response(path, "data is not an object")),
            },
            Value::Null => Ok(None),
            _ => Err(SecretsError::unexpected_response(path, "response is not an object")),
        }
    }

    /// POST `body` as JSON to `path` and return the parsed response.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        token: Option<&SecretString>,
        path: &str,
        body: &T,
    ) -> Result<Value> {
        let send = self.with_headers(self.client.post(self.url(path)), token).json(body).send();
        let response = send.instrument(broker_span!("POST", path)).await?;
        handle_response(path, response).await
    }
}

/// Check the status, then parse the body as JSON. An empty body is `Null`.
async fn handle_response(path: &str, response: Response) -> Result<Value> {
    let status = response.status();
    debug!(status = %status, "Response status");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_else(|_| "<unable to read error>".to_string());
        trace!(body = %body, "Error response");
        return Err(SecretsError::Http { path: path.to_string(), status: status.as_u16(), body });
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| SecretsError::unexpected_response(path, e.to_string()))
}
