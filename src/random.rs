//! Random value provider.
//!
//! Draws true random integers from random.org and degrades to a local
//! pseudo-random generator whenever the service cannot be used. Callers
//! never see a failure from this module.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RandomConfig;
use crate::error::{Error, Result};
use crate::{ilog_debug, ilog_warn};

pub const RANDOM_ORG_ENDPOINT: &str = "https://api.random.org/json-rpc/4/invoke";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A remote source of random integers.
#[async_trait]
pub trait RandomSource: Send + Sync {
    fn name(&self) -> &str;

    /// Return exactly `count` integers in `[min, max]`.
    async fn generate(&self, min: i64, max: i64, count: usize) -> Result<Vec<i64>>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcParams<'a> {
    api_key: &'a str,
    n: usize,
    min: i64,
    max: i64,
    replacement: bool,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    random: RpcRandom,
}

#[derive(Debug, Deserialize)]
struct RpcRandom {
    data: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

/// random.org JSON-RPC `generateIntegers` client.
pub struct RandomOrgClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RandomOrgClient {
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_endpoint(api_key, RANDOM_ORG_ENDPOINT)
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn parse_response(body: &str) -> Result<Vec<i64>> {
        let response: RpcResponse = serde_json::from_str(body)?;
        if let Some(error) = response.error {
            return Err(Error::RandomService(format!("API Error: {}", error.message)));
        }
        response
            .result
            .map(|r| r.random.data)
            .ok_or_else(|| Error::RandomService("response has no result".to_string()))
    }
}

#[async_trait]
impl RandomSource for RandomOrgClient {
    fn name(&self) -> &str {
        "random.org"
    }

    async fn generate(&self, min: i64, max: i64, count: usize) -> Result<Vec<i64>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "generateIntegers",
            params: RpcParams {
                api_key: &self.api_key,
                n: count,
                min,
                max,
                replacement: true,
            },
            id: 1,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        Self::parse_response(&body)
    }
}

/// Never-failing random integer provider.
#[derive(Clone, Default)]
pub struct RandomProvider {
    remote: Option<Arc<dyn RandomSource>>,
}

impl RandomProvider {
    pub fn new(remote: Arc<dyn RandomSource>) -> Self {
        Self {
            remote: Some(remote),
        }
    }

    /// Provider that only uses the local pseudo-random generator.
    pub fn pseudo() -> Self {
        Self { remote: None }
    }

    pub fn from_config(config: &RandomConfig) -> Self {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            ilog_warn!("RANDOM_ORG_API_KEY not set, using pseudo-random numbers");
            return Self::pseudo();
        };
        let endpoint = config.endpoint.as_deref().unwrap_or(RANDOM_ORG_ENDPOINT);
        match RandomOrgClient::with_endpoint(api_key, endpoint) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                ilog_warn!("Failed to build random.org client: {}", e);
                Self::pseudo()
            }
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// One uniform draw in `[min, max]`.
    pub async fn get_random_int(&self, min: i64, max: i64) -> i64 {
        let values = self.get_random_ints(min, max, 1).await;
        values.first().copied().unwrap_or(min)
    }

    /// `count` independent uniform draws in `[min, max]`.
    pub async fn get_random_ints(&self, min: i64, max: i64, count: usize) -> Vec<i64> {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        if count == 0 {
            return Vec::new();
        }

        if let Some(remote) = &self.remote {
            match remote.generate(min, max, count).await {
                Ok(values)
                    if values.len() == count && values.iter().all(|v| (min..=max).contains(v)) =>
                {
                    ilog_debug!(
                        "{} returned {} value(s) in [{}, {}]",
                        remote.name(),
                        count,
                        min,
                        max
                    );
                    return values;
                }
                Ok(values) => {
                    ilog_warn!(
                        "Failed to get true random numbers from {}: \
                         expected {} value(s) in [{}, {}], got {:?}",
                        remote.name(),
                        count,
                        min,
                        max,
                        values
                    );
                }
                Err(e) => {
                    ilog_warn!(
                        "Failed to get true random numbers from {}: {}",
                        remote.name(),
                        e
                    );
                }
            }
            ilog_warn!("Falling back to pseudo-random numbers");
        }

        pseudo_draws(min, max, count)
    }
}

fn pseudo_draws(min: i64, max: i64, count: usize) -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_range(min..=max)).collect()
}
