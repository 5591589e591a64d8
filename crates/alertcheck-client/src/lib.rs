//! HTTP client for Prometheus-compatible rule and query APIs
//! (Prometheus, vmalert, vmselect).

pub mod error;
pub mod model;


use crate::error::{truncate_body, ApiError, Result, MAX_BODY_LENGTH};
use crate::model::{QueryResponse, RulesResponse};
use alertcheck_common::types::{Rule, Target};
use alertcheck_engine::source::{QueryBackend, RuleSource};
use anyhow::Context;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to the rule endpoint and the query endpoint of one target.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    rules_endpoint: String,
    query_endpoint: String,
    client: Client,
}

impl PrometheusClient {
    pub fn new(rule_url: &str, query_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            rules_endpoint: format!("{}/api/v1/rules", rule_url.trim_end_matches('/')),
            query_endpoint: format!("{}/api/v1/query", query_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn for_target(target: &Target, timeout: Duration) -> anyhow::Result<Self> {
        Self::new(&target.rule_url, &target.query_url, timeout)
    }

    /// `GET <rule_url>/api/v1/rules`, flattened across groups.
    pub async fn rules(&self) -> Result<Vec<Rule>> {
        let request = self.client.get(&self.rules_endpoint);
        let response: RulesResponse = self.send(&self.rules_endpoint, request).await?;
        if response.status == "error" {
            return Err(ApiError::Api {
                url: self.rules_endpoint.clone(),
                error_type: response.error_type,
                message: response.error,
            });
        }
        Ok(response.into_rules())
    }

    /// `POST <query_url>/api/v1/query` with a form-encoded `query`; true when
    /// the result is non-empty.
    pub async fn has_data(&self, query: &str) -> Result<bool> {
        let request = self.client.post(&self.query_endpoint).form(&[("query", query)]);
        let response: QueryResponse = self.send(&self.query_endpoint, request).await?;
        if response.status == "error" {
            return Err(ApiError::Api {
                url: self.query_endpoint.clone(),
                error_type: response.error_type,
                message: response.error,
            });
        }
        Ok(!response.data.result.is_empty())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let unavailable = |source: reqwest::Error| ApiError::Unavailable {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        let body = response.text().await.map_err(unavailable)?;
        tracing::debug!(url, status = status.as_u16(), bytes = body.len(), "API response");

        if !status.is_success() {
            return Err(ApiError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body, MAX_BODY_LENGTH),
            });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait::async_trait]
impl RuleSource for PrometheusClient {
    async fn fetch_rules(&self) -> anyhow::Result<Vec<Rule>> {
        Ok(self.rules().await?)
    }
}

#[async_trait::async_trait]
impl QueryBackend for PrometheusClient {
    async fn check_presence(&self, query: &str) -> anyhow::Result<bool> {
        Ok(self.has_data(query).await?)
    }
}
