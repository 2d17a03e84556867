//! HTTP client for the airport search service.
//!
//! Each agent owns one [`BackendClient`]. Tool calls go through
//! [`BackendClient::get`], which drops unset query parameters, attaches
//! auth headers, and shapes non-2xx responses into plain error strings the
//! model can read.

use anyhow::{Context, Result};
use std::sync::RwLock;
use std::time::Duration;

use crate::config::BackendConfig;

pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    /// Static bearer token for authenticated deployments, from config.
    auth_token: Option<String>,
    /// Per-user identity token attached after `/login/google`.
    id_token: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build backend HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            id_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach (or replace) the user identity token for this client.
    pub fn set_id_token(&self, token: &str) {
        *self.id_token.write().expect("id_token lock poisoned") = Some(token.to_string());
    }

    pub fn has_id_token(&self) -> bool {
        self.id_token
            .read()
            .expect("id_token lock poisoned")
            .is_some()
    }

    /// GET a search endpoint with the given query parameters.
    ///
    /// Parameters with a `None` value are omitted from the query string
    /// entirely; the backend treats absent and null filters the same way.
    ///
    /// On a non-2xx status the response body is folded into an error so the
    /// agent can surface what the backend said.
    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        let query = filter_none_params(params);
        let mut request = self.http.get(&url).query(&query);

        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        if let Some(ref token) = *self.id_token.read().expect("id_token lock poisoned") {
            request = request.header("User-Id-Token", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach backend at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Error sending GET request to {}: {}", url, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Backend returned non-JSON body from {}", url))
    }
}

/// Drop pairs whose value is `None` before they reach the query string.
pub fn filter_none_params(params: &[(&str, Option<String>)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            auth_token: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = BackendClient::new(&test_config("http://127.0.0.1:8080/")).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_filter_none_params() {
        let params: [(&str, Option<String>); 3] = [
            ("country", Some("Mexico".to_string())),
            ("city", None),
            ("name", None),
        ];
        let filtered = filter_none_params(&params);
        assert_eq!(filtered, vec![("country".to_string(), "Mexico".to_string())]);
    }

    #[test]
    fn test_filter_none_params_all_set() {
        let params: [(&str, Option<String>); 2] = [
            ("airline", Some("UA".to_string())),
            ("flight_number", Some("1532".to_string())),
        ];
        assert_eq!(filter_none_params(&params).len(), 2);
    }

    #[test]
    fn test_id_token_attach() {
        let client = BackendClient::new(&test_config("http://127.0.0.1:8080")).unwrap();
        assert!(!client.has_id_token());
        client.set_id_token("tok");
        assert!(client.has_id_token());
    }
}
