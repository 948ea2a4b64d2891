//! # Plant Name Resolver
//!
//! Single entry point for turning "name of plant `id` as of block `block`"
//! into a string. Resolution is best-effort and total: every path ends in a
//! name, falling back to `Plant #<id>` when the node has nothing usable.
//!
//! ## Policy
//!
//! Single id ([`NameResolver::resolve_one`]):
//!
//! 1. A fresh cache entry wins, even over the cutover gate.
//! 2. At or before the network's cutover block the fallback is cached and
//!    returned without touching the node.
//! 3. Otherwise `getPlantName` is called under the retry policy; an empty
//!    result, the `0x` sentinel or exhausted retries all yield the fallback.
//!    Whatever comes out is cached.
//!
//! Several ids ([`NameResolver::resolve_many`]):
//!
//! 1. Before the cutover the whole batch resolves to fallbacks.
//! 2. Cached ids are served from the cache; the rest are fetched with one
//!    retried multicall, each id judged on its own sub-result.
//! 3. Output order always matches input order.
//!
//! A fallback caused by a transient outage is cached like any other result,
//! so an outage can pin `Plant #<id>` for up to one TTL.

use ethers::types::U256;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cutover::CutoverTable;
use crate::metrics;
use crate::name_cache::{CacheKey, NameCache};
use crate::name_source::{CallOutcome, NameSource};
use crate::retry::RetryPolicy;
use crate::settings::Settings;

/// Placeholder used whenever no real name is available.
pub fn fallback_name(id: U256) -> String {
    format!("Plant #{}", id)
}

/// Empty strings and the bare `0x` some nodes return for empty bytes are not names.
fn is_usable_name(name: &str) -> bool {
    !name.is_empty() && name != "0x"
}

/// Why a fallback name was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The block is at or before the network's cutover.
    BeforeCutover,
    /// The node answered, but with no usable name.
    EmptyName,
    /// The call failed after all retries, or reverted inside a batch.
    RemoteFailure,
    /// The batch response had no entry for this id.
    MissingResult,
}

/// How a name was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    CacheHit(String),
    Fallback(String, FallbackReason),
    Resolved(String),
}

impl ResolutionOutcome {
    pub fn name(&self) -> &str {
        match self {
            ResolutionOutcome::CacheHit(name)
            | ResolutionOutcome::Fallback(name, _)
            | ResolutionOutcome::Resolved(name) => name,
        }
    }

    pub fn into_name(self) -> String {
        match self {
            ResolutionOutcome::CacheHit(name)
            | ResolutionOutcome::Fallback(name, _)
            | ResolutionOutcome::Resolved(name) => name,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ResolutionOutcome::Fallback(..))
    }

    fn label(&self) -> &'static str {
        match self {
            ResolutionOutcome::CacheHit(_) => "cache_hit",
            ResolutionOutcome::Fallback(..) => "fallback",
            ResolutionOutcome::Resolved(_) => "resolved",
        }
    }
}

/// Resolution facade composing the cutover gate, the name cache, the retry
/// policy and a [`NameSource`].
pub struct NameResolver<S> {
    source: S,
    cache: Arc<NameCache>,
    cutovers: CutoverTable,
    retry: RetryPolicy,
}

impl<S: NameSource> NameResolver<S> {
    pub fn new(source: S, cache: Arc<NameCache>, cutovers: CutoverTable, retry: RetryPolicy) -> Self {
        Self {
            source,
            cache,
            cutovers,
            retry,
        }
    }

    /// Builds the resolver with the cutovers and retry policy from `settings`.
    pub fn from_settings(source: S, cache: Arc<NameCache>, settings: &Settings) -> Self {
        Self::new(
            source,
            cache,
            CutoverTable::from_settings(&settings.cutovers),
            settings.name_resolver.retry_policy(),
        )
    }

    pub fn cache(&self) -> &Arc<NameCache> {
        &self.cache
    }

    pub fn cutovers(&self) -> &CutoverTable {
        &self.cutovers
    }

    /// Name of plant `id` on `network` as of `block`. Never fails.
    pub async fn resolve_one(&self, network: u64, id: U256, block: u64) -> String {
        self.resolve_one_traced(network, id, block).await.into_name()
    }

    /// Names of `ids` on `network` as of `block`, in the same order. Never fails.
    pub async fn resolve_many(&self, network: u64, ids: &[U256], block: u64) -> Vec<String> {
        self.resolve_many_traced(network, ids, block)
            .await
            .into_iter()
            .map(ResolutionOutcome::into_name)
            .collect()
    }

    /// [`resolve_one`](Self::resolve_one) with the outcome kind attached.
    pub async fn resolve_one_traced(&self, network: u64, id: U256, block: u64) -> ResolutionOutcome {
        let key = CacheKey::new(network, id);
        if let Some(name) = self.cache.get(&key) {
            return record(ResolutionOutcome::CacheHit(name));
        }

        let fallback = fallback_name(id);
        if self.cutovers.is_before_cutover(network, block) {
            self.cache.put(key, fallback.clone());
            return record(ResolutionOutcome::Fallback(fallback, FallbackReason::BeforeCutover));
        }

        let label = format!("getPlantName for plant {}", id);
        let outcome = match self
            .retry
            .run(metrics::RETRY_GET_PLANT_NAME, &label, || self.source.plant_name(id, block))
            .await
        {
            Ok(name) if is_usable_name(&name) => ResolutionOutcome::Resolved(name),
            Ok(_) => ResolutionOutcome::Fallback(fallback, FallbackReason::EmptyName),
            Err(e) => {
                warn!(network, %id, block, error = %e, "plant name lookup failed, using fallback");
                ResolutionOutcome::Fallback(fallback, FallbackReason::RemoteFailure)
            }
        };

        self.cache.put(key, outcome.name());
        debug!(network, %id, block, name = outcome.name(), outcome = outcome.label(), "resolved plant name");
        record(outcome)
    }

    /// [`resolve_many`](Self::resolve_many) with the outcome kind attached.
    pub async fn resolve_many_traced(
        &self,
        network: u64,
        ids: &[U256],
        block: u64,
    ) -> Vec<ResolutionOutcome> {
        if self.cutovers.is_before_cutover(network, block) {
            return ids
                .iter()
                .map(|&id| {
                    let name = fallback_name(id);
                    self.cache.put(CacheKey::new(network, id), name.clone());
                    record(ResolutionOutcome::Fallback(name, FallbackReason::BeforeCutover))
                })
                .collect();
        }

        // Uncached slots start at the fallback so every failure path below
        // already has a usable answer.
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut pending: Vec<(usize, U256)> = Vec::new();
        for (index, &id) in ids.iter().enumerate() {
            match self.cache.get(&CacheKey::new(network, id)) {
                Some(name) => outcomes.push(ResolutionOutcome::CacheHit(name)),
                None => {
                    pending.push((index, id));
                    outcomes.push(ResolutionOutcome::Fallback(
                        fallback_name(id),
                        FallbackReason::MissingResult,
                    ));
                }
            }
        }

        if pending.is_empty() {
            return outcomes.into_iter().map(record).collect();
        }

        let pending_ids: Vec<U256> = pending.iter().map(|&(_, id)| id).collect();
        let label = format!("multicall for {} plant names", pending_ids.len());
        match self
            .retry
            .run(metrics::RETRY_AGGREGATE3, &label, || {
                self.source.plant_names(&pending_ids, block)
            })
            .await
        {
            Ok(results) => {
                if results.len() < pending.len() {
                    warn!(
                        network,
                        block,
                        requested = pending.len(),
                        received = results.len(),
                        "multicall returned fewer results than requested; missing ids keep fallback names"
                    );
                }
                for (&(index, id), result) in pending.iter().zip(results) {
                    let outcome = match result {
                        CallOutcome::Success(name) if is_usable_name(&name) => {
                            ResolutionOutcome::Resolved(name)
                        }
                        CallOutcome::Success(_) => {
                            ResolutionOutcome::Fallback(fallback_name(id), FallbackReason::EmptyName)
                        }
                        CallOutcome::Failure(reason) => {
                            debug!(network, %id, block, %reason, "plant name call failed inside batch");
                            ResolutionOutcome::Fallback(fallback_name(id), FallbackReason::RemoteFailure)
                        }
                    };
                    self.cache.put(CacheKey::new(network, id), outcome.name());
                    outcomes[index] = outcome;
                }
            }
            Err(e) => {
                warn!(
                    network,
                    block,
                    count = pending.len(),
                    error = %e,
                    "batched plant name lookup failed, using fallbacks"
                );
                for &(index, id) in &pending {
                    let outcome =
                        ResolutionOutcome::Fallback(fallback_name(id), FallbackReason::RemoteFailure);
                    self.cache.put(CacheKey::new(network, id), outcome.name());
                    outcomes[index] = outcome;
                }
            }
        }

        outcomes.into_iter().map(record).collect()
    }
}

fn record(outcome: ResolutionOutcome) -> ResolutionOutcome {
    metrics::increment_resolution(outcome.label());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_name_is_decimal() {
        assert_eq!(fallback_name(U256::from(42)), "Plant #42");
        assert_eq!(fallback_name(U256::zero()), "Plant #0");
        assert_eq!(
            fallback_name(U256::MAX),
            "Plant #115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn test_usable_name_rejects_sentinels() {
        assert!(!is_usable_name(""));
        assert!(!is_usable_name("0x"));
        assert!(is_usable_name("0xFlower"));
        assert!(is_usable_name("Sunflower"));
    }

    #[test]
    fn test_outcome_accessors() {
        let o = ResolutionOutcome::Fallback("Plant #1".to_string(), FallbackReason::EmptyName);
        assert!(o.is_fallback());
        assert_eq!(o.name(), "Plant #1");
        assert_eq!(o.label(), "fallback");
        assert_eq!(ResolutionOutcome::Resolved("x".into()).into_name(), "x");
    }
}
