// Copyright 2024 The DocAssert Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::HttpMethod;
use crate::error::ReconcileError;

/// Fetches `url` and returns its body as a document.
///
/// Failures never abort the run: an error status keeps its body, a body that
/// is not JSON becomes a JSON string, and a request that got no response at
/// all becomes `{"error": "<message>"}`.
pub(crate) async fn fetch_document(client: &Client, url: &str, method: HttpMethod) -> Value {
    match get_body(client, url, method).await {
        Ok(body) => serde_json::from_str(&body).unwrap_or_else(|_| {
            debug!(url, "response body is not JSON, comparing it as text");
            Value::String(body)
        }),
        Err(err) => {
            warn!(error = %err, "transport failure, using the error as the document");
            json!({ "error": err.to_string() })
        }
    }
}

async fn get_body(client: &Client, url: &str, method: HttpMethod) -> Result<String, ReconcileError> {
    let transport = |source| ReconcileError::Transport {
        url: url.to_string(),
        source,
    };

    let response = client
        .request(map_method(method), url)
        .send()
        .await
        .map_err(transport)?;

    let status = response.status();
    if !status.is_success() {
        debug!(url, status = status.as_u16(), "error status, keeping its body");
    }

    response.text().await.map_err(transport)
}

fn map_method(http_method: HttpMethod) -> Method {
    match http_method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_json() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tokens")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"tokens": ["a"]}"#)
            .create_async()
            .await;

        let url = format!("{}/tokens", server.url());
        let document = fetch_document(&Client::new(), &url, HttpMethod::Get).await;
        assert_eq!(document, json!({ "tokens": ["a"] }));
    }

    #[tokio::test]
    async fn test_fetch_error_status_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/orders")
            .with_status(400)
            .with_body(r#"{"error": {"message": "Invalid timestamp"}}"#)
            .create_async()
            .await;

        let url = format!("{}/orders", server.url());
        let document = fetch_document(&Client::new(), &url, HttpMethod::Post).await;
        assert_eq!(document, json!({ "error": { "message": "Invalid timestamp" } }));
    }

    #[tokio::test]
    async fn test_fetch_non_json_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let url = format!("{}/health", server.url());
        let document = fetch_document(&Client::new(), &url, HttpMethod::Get).await;
        assert_eq!(document, json!("Bad Gateway"));
    }

    #[tokio::test]
    async fn test_fetch_transport_failure() {
        let document =
            fetch_document(&Client::new(), "http://127.0.0.1:1/unreachable", HttpMethod::Get).await;
        assert!(document.get("error").and_then(Value::as_str).is_some());
    }
}
