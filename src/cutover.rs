// Historical validity gate for plant name lookups.
// `getPlantName` only exists on the router after the upgrade block; reads
// at or below it can never return a real name.

use std::collections::HashMap;

use crate::settings::Cutovers;

/// Base mainnet chain id.
pub const BASE_MAINNET: u64 = 8453;
/// Base Sepolia chain id.
pub const BASE_SEPOLIA: u64 = 84532;

/// Upgrade block on Base mainnet that introduced `getPlantName`.
pub const BASE_MAINNET_CUTOVER: u64 = 15_119_426;
/// Upgrade block on Base Sepolia.
pub const BASE_SEPOLIA_CUTOVER: u64 = 11_004_255;

/// Per-network cutover heights, fixed for the lifetime of the process.
///
/// Networks without an explicit entry fall back to `default_block` when one
/// is configured; with no default, an unknown network has no cutover and every
/// lookup goes to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverTable {
    by_network: HashMap<u64, u64>,
    default_block: Option<u64>,
}

impl CutoverTable {
    pub fn new(by_network: HashMap<u64, u64>, default_block: Option<u64>) -> Self {
        Self {
            by_network,
            default_block,
        }
    }

    /// Builds the table from the `[cutovers]` config section. Network keys
    /// that are not valid chain ids are skipped with a warning.
    pub fn from_settings(cutovers: &Cutovers) -> Self {
        let mut by_network = HashMap::with_capacity(cutovers.networks.len());
        for (network, block) in &cutovers.networks {
            match network.trim().parse::<u64>() {
                Ok(chain_id) => {
                    by_network.insert(chain_id, *block);
                }
                Err(e) => {
                    tracing::warn!(network = %network, error = %e, "ignoring cutover entry with invalid chain id");
                }
            }
        }
        Self::new(by_network, cutovers.default_block)
    }

    /// Cutover height for `network`, if any.
    pub fn cutover_for(&self, network: u64) -> Option<u64> {
        self.by_network.get(&network).copied().or(self.default_block)
    }

    /// True when `block` is at or before the network's cutover, i.e. a remote
    /// lookup there cannot succeed and the fallback name applies.
    pub fn is_before_cutover(&self, network: u64, block: u64) -> bool {
        match self.cutover_for(network) {
            Some(cutover) => block <= cutover,
            None => false,
        }
    }
}

impl Default for CutoverTable {
    /// Base mainnet and Base Sepolia; anything else uses the Sepolia height.
    fn default() -> Self {
        let by_network = HashMap::from([
            (BASE_MAINNET, BASE_MAINNET_CUTOVER),
            (BASE_SEPOLIA, BASE_SEPOLIA_CUTOVER),
        ]);
        Self::new(by_network, Some(BASE_SEPOLIA_CUTOVER))
    }
}
