//! # Plant Name Source
//!
//! The remote side of name resolution: read-only `getPlantName(uint256)`
//! calls against the plant NFT contract, evaluated at a historical block.
//!
//! [`NameSource`] is the seam the resolver depends on. Two implementations
//! live here:
//!
//! - [`ContractNameSource`] talks to a single middleware, using the abigen
//!   binding for single reads and Multicall3 `aggregate3` for batches.
//! - [`PooledNameSource`] picks the next endpoint from an [`RpcPool`] for every
//!   call, so each retry of a failed read goes to a different node.
//!
//! Tests substitute their own `NameSource` to count and script remote calls.

use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::Function;
use ethers::prelude::*;
use std::sync::Arc;
use tracing::warn;

use crate::contracts::IPixotchiNFT;
use crate::metrics;
use crate::multicall::{Call, CallResult, Multicall, MAX_BATCH_SIZE};
use crate::rpc_pool::RpcPool;

/// Per-id result of a batched lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call succeeded and decoded to this string (possibly empty).
    Success(String),
    /// The call reverted or its return data could not be decoded.
    Failure(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NameSourceError {
    #[error("getPlantName({id}) at block {block} failed: {reason}")]
    Call { id: U256, block: u64, reason: String },
    #[error("missing calldata for getPlantName({0})")]
    Encode(U256),
    #[error("getPlantName ABI entry missing: {0}")]
    Abi(String),
}

/// Read-only access to plant names at a given block height.
#[async_trait]
pub trait NameSource: Send + Sync {
    /// Reads the name of one plant. Transport failures and reverts are errors.
    async fn plant_name(&self, id: U256, block: u64) -> Result<String>;

    /// Reads the names of several plants in one round trip.
    ///
    /// The returned vector is parallel to `ids`. An `Err` means the batch as a
    /// whole failed; individual failures are reported per entry.
    async fn plant_names(&self, ids: &[U256], block: u64) -> Result<Vec<CallOutcome>>;
}

#[async_trait]
impl<T: NameSource + ?Sized> NameSource for Arc<T> {
    async fn plant_name(&self, id: U256, block: u64) -> Result<String> {
        (**self).plant_name(id, block).await
    }

    async fn plant_names(&self, ids: &[U256], block: u64) -> Result<Vec<CallOutcome>> {
        (**self).plant_names(ids, block).await
    }
}

fn at_block(block: u64) -> BlockId {
    BlockId::Number(BlockNumber::Number(block.into()))
}

/// `NameSource` backed by one ethers middleware.
pub struct ContractNameSource<M: Middleware> {
    contract: IPixotchiNFT<M>,
    multicall: Multicall<M>,
}

impl<M: Middleware + 'static> ContractNameSource<M> {
    pub fn new(
        provider: Arc<M>,
        plant_nft: Address,
        multicall_address: Address,
        batch_size: usize,
    ) -> Self {
        Self {
            contract: IPixotchiNFT::new(plant_nft, Arc::clone(&provider)),
            multicall: Multicall::new(provider, multicall_address, batch_size),
        }
    }

    fn get_plant_name_fn(&self) -> Result<&Function> {
        self.contract
            .abi()
            .function("getPlantName")
            .map_err(|e| NameSourceError::Abi(e.to_string()).into())
    }
}

/// Maps one aggregate3 sub-result to a [`CallOutcome`].
pub fn decode_plant_name(function: &Function, result: &CallResult) -> CallOutcome {
    if !result.success {
        return CallOutcome::Failure("call reverted".to_string());
    }
    match function.decode_output(&result.return_data) {
        Ok(tokens) => match tokens.into_iter().next().and_then(|t| t.into_string()) {
            Some(name) => CallOutcome::Success(name),
            None => CallOutcome::Failure("return data is not a string".to_string()),
        },
        Err(e) => CallOutcome::Failure(format!("undecodable return data: {}", e)),
    }
}

#[async_trait]
impl<M: Middleware + 'static> NameSource for ContractNameSource<M> {
    async fn plant_name(&self, id: U256, block: u64) -> Result<String> {
        metrics::increment_rpc_call("getPlantName");
        let name = self
            .contract
            .get_plant_name(id)
            .block(at_block(block))
            .call()
            .await
            .map_err(|e| NameSourceError::Call {
                id,
                block,
                reason: e.to_string(),
            })?;
        Ok(name)
    }

    async fn plant_names(&self, ids: &[U256], block: u64) -> Result<Vec<CallOutcome>> {
        let target = self.contract.address();
        let calls = ids
            .iter()
            .map(|&id| -> Result<Call> {
                let call_data = self
                    .contract
                    .get_plant_name(id)
                    .calldata()
                    .ok_or(NameSourceError::Encode(id))?;
                Ok(Call { target, call_data })
            })
            .collect::<Result<Vec<_>>>()?;

        let results = self.multicall.run(calls, Some(at_block(block))).await?;
        let function = self.get_plant_name_fn()?;
        Ok(results
            .iter()
            .map(|result| decode_plant_name(function, result))
            .collect())
    }
}

/// `NameSource` that spreads calls across an [`RpcPool`].
pub struct PooledNameSource {
    pool: Arc<RpcPool>,
    plant_nft: Address,
    multicall_address: Address,
    batch_size: usize,
}

impl PooledNameSource {
    pub fn new(
        pool: Arc<RpcPool>,
        plant_nft: Address,
        multicall_address: Address,
        batch_size: usize,
    ) -> Self {
        // Clamped once here; the per-call Multicall would otherwise warn on every lookup.
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                batch_size,
                max = MAX_BATCH_SIZE,
                "multicall batch size exceeds the maximum, capping"
            );
        }
        Self {
            pool,
            plant_nft,
            multicall_address,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn next_source(
        &self,
    ) -> Result<(ContractNameSource<Provider<Http>>, tokio::sync::OwnedSemaphorePermit)> {
        let (provider, permit, _url) = self.pool.get_next_provider().await?;
        let source = ContractNameSource::new(
            provider,
            self.plant_nft,
            self.multicall_address,
            self.batch_size,
        );
        Ok((source, permit))
    }
}

#[async_trait]
impl NameSource for PooledNameSource {
    async fn plant_name(&self, id: U256, block: u64) -> Result<String> {
        let (source, _permit) = self.next_source().await?;
        source.plant_name(id, block).await
    }

    async fn plant_names(&self, ids: &[U256], block: u64) -> Result<Vec<CallOutcome>> {
        let (source, _permit) = self.next_source().await?;
        source.plant_names(ids, block).await
    }
}
