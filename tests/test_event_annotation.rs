//! Integration tests for plant event annotation
//!
//! Verifies that each event kind resolves the names it needs (and only
//! those) and produces the record its table expects.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, I256, U256};
use pixotchi_name_indexer::events::{EventAnnotator, EventContext, PlantEvent, PlantRecord};
use pixotchi_name_indexer::{
    CallOutcome, CutoverTable, NameCache, NameResolver, NameSource, RetryPolicy,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingSource {
    names: HashMap<U256, String>,
    single_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

#[async_trait]
impl NameSource for CountingSource {
    async fn plant_name(&self, id: U256, _block: u64) -> Result<String> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.names.get(&id).cloned().unwrap_or_default())
    }

    async fn plant_names(&self, ids: &[U256], _block: u64) -> Result<Vec<CallOutcome>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .map(|id| match self.names.get(id) {
                Some(name) => CallOutcome::Success(name.clone()),
                None => CallOutcome::Failure("execution reverted".to_string()),
            })
            .collect())
    }
}

fn annotator(names: &[(u64, &str)]) -> (EventAnnotator<Arc<CountingSource>>, Arc<CountingSource>) {
    let source = Arc::new(CountingSource {
        names: names
            .iter()
            .map(|(id, name)| (U256::from(*id), name.to_string()))
            .collect(),
        ..Default::default()
    });
    let resolver = NameResolver::new(
        Arc::clone(&source),
        Arc::new(NameCache::new(Duration::from_secs(300))),
        CutoverTable::default(),
        RetryPolicy::no_retries(),
    );
    (EventAnnotator::new(Arc::new(resolver)), source)
}

fn ctx(block_number: u64) -> EventContext {
    EventContext {
        event_id: "0xabc-1".to_string(),
        network: 8453,
        block_number,
        block_timestamp: 1_717_000_000,
    }
}

#[tokio::test]
async fn test_attack_resolves_all_names_in_one_batch() {
    let (annotator, source) = annotator(&[(1, "Rose"), (2, "Tulip")]);

    let record = annotator
        .annotate(
            &ctx(16_000_000),
            PlantEvent::Attack {
                attacker: U256::from(1),
                winner: U256::from(2),
                loser: U256::from(3),
                scores_won: U256::from(500),
            },
        )
        .await;

    let PlantRecord::Attack(attack) = record else {
        panic!("expected an Attack record");
    };
    assert_eq!(attack.attacker_name, "Rose");
    assert_eq!(attack.winner_name, "Tulip");
    assert_eq!(attack.loser_name, "Plant #3");
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.single_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_item_consumed_before_cutover_uses_fallback() {
    let (annotator, source) = annotator(&[(7, "Cactus")]);

    let record = annotator
        .annotate(
            &ctx(15_000_000),
            PlantEvent::ItemConsumed {
                nft_id: U256::from(7),
                giver: Address::zero(),
                item_id: U256::from(4),
            },
        )
        .await;

    assert_eq!(record.table(), "ItemConsumed");
    let PlantRecord::ItemConsumed(item) = record else {
        panic!("expected an ItemConsumed record");
    };
    assert_eq!(item.nft_name, "Plant #7");
    assert_eq!(source.single_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_killed_and_mint_make_no_lookups() {
    let (annotator, source) = annotator(&[]);

    let killed = annotator
        .annotate(
            &ctx(16_000_000),
            PlantEvent::Killed {
                nft_id: U256::from(1),
                dead_id: U256::from(2),
                loser_name: "Weed".to_string(),
                reward: U256::from(10),
                killer: Address::zero(),
                winner_name: "Oak".to_string(),
            },
        )
        .await;
    let mint = annotator
        .annotate(&ctx(16_000_000), PlantEvent::Mint { id: U256::from(9) })
        .await;

    assert_eq!(killed.table(), "Killed");
    assert_eq!(mint.table(), "Mint");
    assert_eq!(source.single_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_spin_game_lands_in_played_table() {
    let (annotator, _source) = annotator(&[(5, "Daisy")]);

    let record = annotator
        .annotate(
            &ctx(16_000_000),
            PlantEvent::SpinGameV2Played {
                nft_id: U256::from(5),
                player: Address::zero(),
                reward_index: U256::from(2),
                points_delta: I256::from(-25),
                time_added: U256::from(3600),
                leaf_amount: U256::zero(),
            },
        )
        .await;

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["table"], "Played");
    assert_eq!(json["values"]["nftId"], "5");
    assert_eq!(json["values"]["nftName"], "Daisy");
    assert_eq!(json["values"]["points"], "-25");
    assert_eq!(json["values"]["gameName"], "SpinGameV2");
    assert_eq!(json["values"]["spin"]["rewardIndex"], "2");
}

#[tokio::test]
async fn test_played_points_keep_full_unsigned_range() {
    let (annotator, _source) = annotator(&[(6, "Moss")]);

    let record = annotator
        .annotate(
            &ctx(16_000_000),
            PlantEvent::PlayedV2 {
                id: U256::from(6),
                points: U256::MAX,
                time_extension: U256::zero(),
                game_name: "BoxGame".to_string(),
            },
        )
        .await;

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["values"]["points"], U256::MAX.to_string());
    assert!(json["values"].get("spin").is_none());
}
