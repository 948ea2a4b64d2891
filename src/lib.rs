//! # Pixotchi Name Indexer
//!
//! Plant name resolution for the Pixotchi event indexer on Base. Plant events
//! carry only a numeric plant id; the human-readable name lives behind a
//! `getPlantName(uint256)` view call on the plant NFT router. This crate
//! resolves those names as of the block of each event while keeping node
//! traffic low and never blocking ingestion.
//!
//! ## Overview
//!
//! - **Cutover gate**: blocks at or before the upgrade that introduced
//!   `getPlantName` resolve to `Plant #<id>` without a remote call.
//! - **Name cache**: a TTL cache keyed by (chain id, plant id) with a
//!   background sweep.
//! - **Retry policy**: exponential backoff with additive jitter around every
//!   remote call.
//! - **Batching**: events naming several plants resolve them with one
//!   Multicall3 `aggregate3` request.
//!
//! ## Architecture
//!
//! ```text
//! caller -> NameResolver -> CutoverTable
//!                        -> NameCache (hit? done)
//!                        -> RetryPolicy -> NameSource (getPlantName / aggregate3)
//!                        -> NameCache write
//! ```

// Resolution core
/// Historical validity gate (per-network cutover blocks)
pub mod cutover;
/// Time-expiring plant name cache and its sweeper task
pub mod name_cache;
/// Bounded retry with exponential backoff and jitter
pub mod retry;
/// Resolution facade (single and batched)
pub mod resolver;

// Remote access
/// Remote name source trait and ethers-backed implementations
pub mod name_source;
/// Multicall3 batch executor
pub mod multicall;
/// Round-robin RPC endpoint pool with rate limiting
pub mod rpc_pool;
/// Contract ABIs (read-only)
pub mod contracts;

// Handlers
/// Plant event annotation
pub mod events;

// Infrastructure
/// Configuration management
pub mod settings;
/// Metrics and observability
pub mod metrics;

// Re-exports for convenience
pub use cutover::CutoverTable;
pub use name_cache::{CacheKey, NameCache, SweeperHandle};
pub use name_source::{CallOutcome, NameSource};
pub use resolver::{fallback_name, FallbackReason, NameResolver, ResolutionOutcome};
pub use retry::RetryPolicy;
pub use settings::Settings;
