// src/rpc_pool.rs

use crate::settings::Settings;
use anyhow::{Context, Result};
use ethers::prelude::{Http, Provider};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct Endpoint {
    url: String,
    provider: Arc<Provider<Http>>,
    limiter: DefaultDirectRateLimiter,
    semaphore: Arc<Semaphore>,
}

/// Round-robin pool over the configured HTTP endpoints.
///
/// Each endpoint has its own rate limiter and concurrency cap. Consecutive
/// calls land on consecutive endpoints, so a retried read is served by the
/// next node in the list rather than the one that just failed.
///
/// ## Usage
///
/// ```rust,ignore
/// let pool = Arc::new(RpcPool::new(&settings)?);
/// let (provider, _permit, url) = pool.get_next_provider().await?;
/// ```
pub struct RpcPool {
    endpoints: Vec<Endpoint>,
    current_index: AtomicUsize,
}

impl RpcPool {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::from_urls(
            &settings.rpc.http_urls,
            settings.rpc.qps_limit,
            settings.rpc.max_concurrency,
        )
    }

    pub fn from_urls(urls: &[String], qps_limit: u32, max_concurrency: usize) -> Result<Self> {
        let qps = NonZeroU32::new(qps_limit).ok_or_else(|| anyhow::anyhow!("QPS must be non-zero"))?;
        let quota = Quota::per_second(qps);

        let mut endpoints = Vec::with_capacity(urls.len());
        for url in urls {
            let provider = Provider::<Http>::try_from(url.as_str())
                .with_context(|| format!("invalid RPC url {}", url))?;
            endpoints.push(Endpoint {
                url: url.clone(),
                provider: Arc::new(provider),
                limiter: RateLimiter::direct(quota.clone()),
                semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            });
        }

        if endpoints.is_empty() {
            anyhow::bail!("RPC pool needs at least one endpoint");
        }
        info!("RPC pool created with {} endpoint(s)", endpoints.len());

        Ok(Self {
            endpoints,
            current_index: AtomicUsize::new(0),
        })
    }

    /// Picks the next endpoint, waiting for its rate limiter and a
    /// concurrency permit. The permit must be held for the duration of the call.
    pub async fn get_next_provider(
        &self,
    ) -> Result<(Arc<Provider<Http>>, OwnedSemaphorePermit, String)> {
        let index = self.current_index.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        let endpoint = &self.endpoints[index];

        let permit = endpoint.semaphore.clone().acquire_owned().await?;
        endpoint.limiter.until_ready().await;
        debug!("RPC pool selected endpoint {} ({})", index, endpoint.url);

        Ok((Arc::clone(&endpoint.provider), permit, endpoint.url.clone()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.url.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://127.0.0.1:{}", 8545 + i)).collect()
    }

    #[test]
    fn test_rejects_empty_and_zero_qps() {
        assert!(RpcPool::from_urls(&[], 10, 4).is_err());
        assert!(RpcPool::from_urls(&urls(1), 0, 4).is_err());
    }

    #[tokio::test]
    async fn test_round_robin_rotates_endpoints() {
        let pool = RpcPool::from_urls(&urls(3), 100, 4).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            let (_, _permit, url) = pool.get_next_provider().await.unwrap();
            seen.push(url);
        }
        assert_eq!(
            seen,
            vec![
                "http://127.0.0.1:8545",
                "http://127.0.0.1:8546",
                "http://127.0.0.1:8547",
                "http://127.0.0.1:8545",
            ]
        );
    }
}
