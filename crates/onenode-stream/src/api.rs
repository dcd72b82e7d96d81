//! Plain JSON calls that share the streaming client's error surfacing.

use http::Method;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{http_error, send, with_timeout, StreamClient};
use crate::{StreamError, StreamResult};

/// `GET /api/config` on the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub default_locale: String,
    #[serde(default)]
    pub support_file_formats: Value,
}

impl StreamClient {
    /// One request with a JSON response decoded into `T`.
    ///
    /// Non-2xx responses become [`StreamError::Http`] with the same detail
    /// extraction as streamed requests.
    pub async fn fetch_json<T>(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> StreamResult<T>
    where
        T: DeserializeOwned,
    {
        let req = self.build_request(method.clone(), url, token, body)?;
        let result = with_timeout(self.timeout, async {
            let response = send(&self.http, req).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(http_error(status, response.into_body()).await);
            }
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| StreamError::Body(e.to_string()))?
                .to_bytes();
            serde_json::from_slice(&bytes).map_err(StreamError::Deserialize)
        })
        .await;

        match &result {
            Ok(_) => debug!(%method, %url, "json request succeeded"),
            Err(e) => warn!(%method, %url, error = %e, "json request failed"),
        }
        result
    }

    pub async fn backend_config(&self) -> StreamResult<BackendConfig> {
        let url = self.config.backend_url("/api/config");
        self.fetch_json(Method::GET, &url, None, None).await
    }

    /// Ask the agent service to title a conversation.
    pub async fn generate_title(&self, token: Option<&str>, prompt: &Value) -> StreamResult<Value> {
        let url = self.config.agent_url("/generate_title");
        self.fetch_json(Method::POST, &url, token, Some(prompt)).await
    }
}
