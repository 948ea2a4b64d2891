//! Plant event annotation.
//!
//! The dispatch pipeline hands over decoded plant router events one at a time,
//! in block order. Each one is turned into the record its table stores, with
//! plant names resolved as of the event's block. Persisting the record is the
//! caller's job.

use ethers::types::{Address, I256, U256};
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::sync::Arc;

use crate::name_source::NameSource;
use crate::resolver::{fallback_name, NameResolver};

fn decimal<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Where an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Unique event id assigned by the pipeline (block hash + log index).
    pub event_id: String,
    pub network: u64,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// Decoded plant router events that the indexer records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlantEvent {
    ItemConsumed {
        nft_id: U256,
        giver: Address,
        item_id: U256,
    },
    ShopItemPurchased {
        nft_id: U256,
        buyer: Address,
        item_id: U256,
    },
    Played {
        id: U256,
        points: U256,
        time_extension: U256,
        game_name: String,
    },
    PlayedV2 {
        id: U256,
        points: U256,
        time_extension: U256,
        game_name: String,
    },
    SpinGameV2Played {
        nft_id: U256,
        player: Address,
        reward_index: U256,
        points_delta: I256,
        time_added: U256,
        leaf_amount: U256,
    },
    Attack {
        attacker: U256,
        winner: U256,
        loser: U256,
        scores_won: U256,
    },
    Mint {
        id: U256,
    },
    Killed {
        nft_id: U256,
        dead_id: U256,
        loser_name: String,
        reward: U256,
        killer: Address,
        winner_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: String,
    #[serde(serialize_with = "decimal")]
    pub nft_id: U256,
    pub nft_name: String,
    pub giver: Address,
    #[serde(serialize_with = "decimal")]
    pub item_id: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayedRecord {
    pub id: String,
    #[serde(serialize_with = "decimal")]
    pub nft_id: U256,
    pub nft_name: String,
    #[serde(serialize_with = "decimal")]
    pub points: Points,
    #[serde(serialize_with = "decimal")]
    pub time_extension: U256,
    pub game_name: String,
    pub timestamp: u64,
    /// Spin game only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spin: Option<SpinDetails>,
}

/// Points carried by a play. Classic games report an unsigned award; the
/// spin game reports a signed delta. Both serialize as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Points {
    Earned(U256),
    Delta(I256),
}

impl Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Points::Earned(value) => Display::fmt(value, f),
            Points::Delta(value) => Display::fmt(value, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinDetails {
    pub player: Address,
    #[serde(serialize_with = "decimal")]
    pub reward_index: U256,
    #[serde(serialize_with = "decimal")]
    pub time_added: U256,
    #[serde(serialize_with = "decimal")]
    pub leaf_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackRecord {
    pub id: String,
    #[serde(serialize_with = "decimal")]
    pub attacker: U256,
    pub attacker_name: String,
    #[serde(serialize_with = "decimal")]
    pub winner: U256,
    pub winner_name: String,
    #[serde(serialize_with = "decimal")]
    pub loser: U256,
    pub loser_name: String,
    #[serde(serialize_with = "decimal")]
    pub scores_won: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRecord {
    pub id: String,
    #[serde(serialize_with = "decimal")]
    pub nft_id: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KilledRecord {
    pub id: String,
    #[serde(serialize_with = "decimal")]
    pub nft_id: U256,
    #[serde(serialize_with = "decimal")]
    pub dead_id: U256,
    pub loser_name: String,
    #[serde(serialize_with = "decimal")]
    pub reward: U256,
    pub killer: Address,
    pub winner_name: String,
    pub timestamp: u64,
}

/// A record ready for its table. `table` names the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "table", content = "values")]
pub enum PlantRecord {
    ItemConsumed(ItemRecord),
    ShopItemPurchased(ItemRecord),
    Played(PlayedRecord),
    Attack(AttackRecord),
    Mint(MintRecord),
    Killed(KilledRecord),
}

impl PlantRecord {
    pub fn table(&self) -> &'static str {
        match self {
            PlantRecord::ItemConsumed(_) => "ItemConsumed",
            PlantRecord::ShopItemPurchased(_) => "ShopItemPurchased",
            PlantRecord::Played(_) => "Played",
            PlantRecord::Attack(_) => "Attack",
            PlantRecord::Mint(_) => "Mint",
            PlantRecord::Killed(_) => "Killed",
        }
    }
}

/// Resolves the plant names an event needs and builds its record.
pub struct EventAnnotator<S> {
    resolver: Arc<NameResolver<S>>,
}

impl<S: NameSource> EventAnnotator<S> {
    pub fn new(resolver: Arc<NameResolver<S>>) -> Self {
        Self { resolver }
    }

    async fn name_of(&self, ctx: &EventContext, id: U256) -> String {
        self.resolver
            .resolve_one(ctx.network, id, ctx.block_number)
            .await
    }

    pub async fn annotate(&self, ctx: &EventContext, event: PlantEvent) -> PlantRecord {
        match event {
            PlantEvent::ItemConsumed {
                nft_id,
                giver,
                item_id,
            } => PlantRecord::ItemConsumed(ItemRecord {
                id: ctx.event_id.clone(),
                nft_id,
                nft_name: self.name_of(ctx, nft_id).await,
                giver,
                item_id,
                timestamp: ctx.block_timestamp,
            }),
            PlantEvent::ShopItemPurchased {
                nft_id,
                buyer,
                item_id,
            } => PlantRecord::ShopItemPurchased(ItemRecord {
                id: ctx.event_id.clone(),
                nft_id,
                nft_name: self.name_of(ctx, nft_id).await,
                giver: buyer,
                item_id,
                timestamp: ctx.block_timestamp,
            }),
            PlantEvent::Played {
                id,
                points,
                time_extension,
                game_name,
            }
            | PlantEvent::PlayedV2 {
                id,
                points,
                time_extension,
                game_name,
            } => PlantRecord::Played(PlayedRecord {
                id: ctx.event_id.clone(),
                nft_id: id,
                nft_name: self.name_of(ctx, id).await,
                points: Points::Earned(points),
                time_extension,
                game_name,
                timestamp: ctx.block_timestamp,
                spin: None,
            }),
            PlantEvent::SpinGameV2Played {
                nft_id,
                player,
                reward_index,
                points_delta,
                time_added,
                leaf_amount,
            } => PlantRecord::Played(PlayedRecord {
                id: ctx.event_id.clone(),
                nft_id,
                nft_name: self.name_of(ctx, nft_id).await,
                points: Points::Delta(points_delta),
                time_extension: time_added,
                game_name: "SpinGameV2".to_string(),
                timestamp: ctx.block_timestamp,
                spin: Some(SpinDetails {
                    player,
                    reward_index,
                    time_added,
                    leaf_amount,
                }),
            }),
            PlantEvent::Attack {
                attacker,
                winner,
                loser,
                scores_won,
            } => {
                let ids = [attacker, winner, loser];
                let names = self
                    .resolver
                    .resolve_many(ctx.network, &ids, ctx.block_number)
                    .await;
                let name_at = |i: usize| {
                    names
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| fallback_name(ids[i]))
                };
                PlantRecord::Attack(AttackRecord {
                    id: ctx.event_id.clone(),
                    attacker,
                    attacker_name: name_at(0),
                    winner,
                    winner_name: name_at(1),
                    loser,
                    loser_name: name_at(2),
                    scores_won,
                    timestamp: ctx.block_timestamp,
                })
            }
            PlantEvent::Mint { id } => PlantRecord::Mint(MintRecord {
                id: ctx.event_id.clone(),
                nft_id: id,
                timestamp: ctx.block_timestamp,
            }),
            // Names travel in the event payload.
            PlantEvent::Killed {
                nft_id,
                dead_id,
                loser_name,
                reward,
                killer,
                winner_name,
            } => PlantRecord::Killed(KilledRecord {
                id: ctx.event_id.clone(),
                nft_id,
                dead_id,
                loser_name,
                reward,
                killer,
                winner_name,
                timestamp: ctx.block_timestamp,
            }),
        }
    }
}
