use crate::metrics;
use anyhow::{Context, Result};
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use futures::future::try_join_all;
use log::{debug, warn};
use std::sync::Arc;

/// Upper bound on calls per aggregate3 request; larger batches get rejected
/// by most hosted RPC providers.
pub const MAX_BATCH_SIZE: usize = 200;

/// A single contract read to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Outcome of one sub-call inside an aggregate3 batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Multicall3 `aggregate3` executor.
///
/// Every sub-call is sent with `allowFailure = true`, so a revert in one call
/// is reported through its own [`CallResult`] instead of failing the batch.
/// Only transport errors or an undecodable response fail [`Multicall::run`].
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "Batch size {} exceeds recommended maximum ({}), capping",
                batch_size,
                MAX_BATCH_SIZE
            );
        }

        Self {
            provider,
            multicall_address,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs a batch of calls, optionally at a specific block. Results come
    /// back in request order, one per call.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let mut unique_calls = indexmap::IndexMap::new();
        let mut original_indices = vec![0; calls.len()];
        for (i, call) in calls.iter().enumerate() {
            let (index, _) = unique_calls.insert_full(call.clone(), ());
            original_indices[i] = index;
        }
        let unique_call_vec: Vec<Call> = unique_calls.into_keys().collect();
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        // Chunks go out concurrently; try_join_all keeps them in chunk order.
        let chunk_futures = unique_call_vec.chunks(self.batch_size).map(|call_chunk| async move {
            metrics::record_multicall_batch_size(call_chunk.len() as f64);
            let chunk_results = self.execute_aggregate3(call_chunk, block).await?;
            if chunk_results.len() < call_chunk.len() {
                warn!(
                    "aggregate3 returned {} results for {} calls; keeping the ones that came back",
                    chunk_results.len(),
                    call_chunk.len()
                );
            }
            Ok::<_, anyhow::Error>((call_chunk.len(), chunk_results))
        });

        // Slot every returned result at its unique-call position so a short
        // chunk does not shift the chunks after it.
        let mut all_results_unique: Vec<Option<CallResult>> = Vec::with_capacity(unique_call_vec.len());
        for (chunk_len, chunk_results) in try_join_all(chunk_futures).await? {
            let mut chunk_results = chunk_results.into_iter();
            all_results_unique.extend((0..chunk_len).map(|_| chunk_results.next()));
        }

        Ok(reassemble(&original_indices, &all_results_unique))
    }

    async fn execute_aggregate3(
        &self,
        calls: &[Call],
        block: Option<BlockId>,
    ) -> Result<Vec<CallResult>> {
        let call_tokens: Vec<Token> = calls
            .iter()
            .map(|call| {
                // Call3 struct: (address target, bool allowFailure, bytes callData)
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(true),
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        let calldata = aggregate3_function().encode_input(&[Token::Array(call_tokens)])?;
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata)
            .into();

        metrics::increment_rpc_call("aggregate3");
        let response = self
            .provider
            .call(&tx, block)
            .await
            .map_err(|e| anyhow::anyhow!("aggregate3 call failed: {}", e))?;

        decode_aggregate3_output(&response)
    }
}

/// Maps per-unique-call results back to request order. The output stops at
/// the first request whose result is missing, so it is always a prefix of
/// the request and positions stay aligned for the caller.
fn reassemble(original_indices: &[usize], unique_results: &[Option<CallResult>]) -> Vec<CallResult> {
    original_indices
        .iter()
        .map_while(|&index| unique_results.get(index).cloned().flatten())
        .collect()
}

// function aggregate3(Call3[] calldata calls) public payable returns (Result[] memory returnData)
#[allow(deprecated)]
fn aggregate3_function() -> Function {
    Function {
        name: "aggregate3".to_string(),
        inputs: vec![Param {
            name: "calls".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: result_array_type(),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

fn result_array_type() -> ParamType {
    // Result struct: (bool success, bytes returnData)
    ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Bool,
        ParamType::Bytes,
    ])))
}

/// Decodes the `Result[]` returned by aggregate3.
pub fn decode_aggregate3_output(response: &[u8]) -> Result<Vec<CallResult>> {
    let decoded = ethers::abi::decode(&[result_array_type()], response)
        .context("invalid aggregate3 response")?;

    let results_array = decoded
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

    results_array
        .into_iter()
        .map(|token| match token {
            Token::Tuple(fields) => match fields.as_slice() {
                [Token::Bool(success), Token::Bytes(data)] => Ok(CallResult {
                    success: *success,
                    return_data: Bytes::from(data.clone()),
                }),
                _ => Err(anyhow::anyhow!("unexpected aggregate3 result tuple: {:?}", fields)),
            },
            other => Err(anyhow::anyhow!("unexpected aggregate3 result token: {:?}", other)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_results(results: &[(bool, Vec<u8>)]) -> Vec<u8> {
        let tokens = results
            .iter()
            .map(|(ok, data)| Token::Tuple(vec![Token::Bool(*ok), Token::Bytes(data.clone())]))
            .collect();
        ethers::abi::encode(&[Token::Array(tokens)])
    }

    #[test]
    fn test_decode_keeps_per_call_status() {
        let raw = encode_results(&[(true, vec![1, 2]), (false, vec![]), (true, vec![3])]);
        let decoded = decode_aggregate3_output(&raw).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].success);
        assert_eq!(decoded[0].return_data.to_vec(), vec![1, 2]);
        assert!(!decoded[1].success);
        assert!(decoded[2].success);
    }

    #[test]
    fn test_reassemble_stops_at_first_missing_result() {
        let ok = |byte: u8| CallResult {
            success: true,
            return_data: Bytes::from(vec![byte]),
        };
        // Unique calls 0 and 2 answered, 1 missing; request order 0, 0, 2, 1, 2.
        let unique = vec![Some(ok(0xa)), None, Some(ok(0xc))];
        let out = reassemble(&[0, 0, 2, 1, 2], &unique);
        assert_eq!(out, vec![ok(0xa), ok(0xa), ok(0xc)]);

        assert!(reassemble(&[1, 0], &unique).is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_aggregate3_output(&[0xde, 0xad]).is_err());
    }

    #[test]
    fn test_aggregate3_selector() {
        // keccak256("aggregate3((address,bool,bytes)[])")[..4]
        assert_eq!(aggregate3_function().short_signature(), [0x82, 0xad, 0x56, 0xcb]);
    }
}
