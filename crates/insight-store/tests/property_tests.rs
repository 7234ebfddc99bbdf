//! Property-based tests for block/chunk storage invariants.
//!
//! These tests use proptest to verify that splitting, replaying and
//! range-querying batches behave the same across randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tokio_test::block_on;

use insight_core::config::StoreConfig;
use insight_core::model::{DeploymentData, DeploymentStatus, Labels};
use insight_core::{MemoryBackend, ProjectId};
use insight_store::InsightStore;

const CHUNK_MAX: usize = 4;

fn span_start() -> i64 {
    Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap().timestamp()
}

fn span_end() -> i64 {
    Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap().timestamp()
}

fn store() -> InsightStore {
    InsightStore::new(
        Arc::new(MemoryBackend::new()),
        StoreConfig {
            chunk_max_count: CHUNK_MAX,
            ..StoreConfig::default()
        },
    )
    .unwrap()
}

fn project() -> ProjectId {
    ProjectId::new("prop").unwrap()
}

/// Generates a batch of deployments with distinct ids spread over two years.
fn arb_batch() -> impl Strategy<Value = Vec<DeploymentData>> {
    prop::collection::vec(
        (span_start()..span_end(), any::<bool>()),
        0..24,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (completed_at, failed))| DeploymentData {
                id: format!("d{i}"),
                app_id: "app".into(),
                labels: Labels::new(),
                started_at: completed_at - 30,
                completed_at,
                complete_status: if failed {
                    DeploymentStatus::Failure
                } else {
                    DeploymentStatus::Success
                },
                rollback_started_at: 0,
            })
            .collect()
    })
}

/// Everything stored, as an order-independent set.
fn stored(store: &InsightStore) -> BTreeSet<(i64, String)> {
    block_on(store.list_completed_deployments(&project(), span_start(), span_end()))
        .unwrap()
        .into_iter()
        .map(|d| (d.completed_at, d.id))
        .collect()
}

fn expected(batch: &[DeploymentData]) -> BTreeSet<(i64, String)> {
    batch.iter().map(|d| (d.completed_at, d.id.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn split_puts_store_the_same_set(batch in arb_batch(), split in 0usize..24) {
        let split = split.min(batch.len());
        let (first, second) = batch.split_at(split);

        let whole = store();
        block_on(whole.put_completed_deployments(&project(), &batch)).unwrap();

        let parts = store();
        block_on(parts.put_completed_deployments(&project(), first)).unwrap();
        block_on(parts.put_completed_deployments(&project(), second)).unwrap();

        prop_assert_eq!(stored(&whole), expected(&batch));
        prop_assert_eq!(stored(&parts), expected(&batch));
    }

    #[test]
    fn replaying_a_batch_changes_nothing(batch in arb_batch(), replays in 1usize..4) {
        let store = store();
        block_on(store.put_completed_deployments(&project(), &batch)).unwrap();
        let once = stored(&store);

        for _ in 0..replays {
            let report = block_on(store.put_completed_deployments(&project(), &batch)).unwrap();
            prop_assert_eq!(report.inserted, 0);
            prop_assert_eq!(report.duplicates, batch.len());
        }
        prop_assert_eq!(stored(&store), once);
    }

    #[test]
    fn chunks_never_exceed_the_bound(batch in arb_batch(), split in 0usize..24) {
        let store = store();
        let split = split.min(batch.len());
        let (first, second) = batch.split_at(split);
        block_on(store.put_completed_deployments(&project(), second)).unwrap();
        block_on(store.put_completed_deployments(&project(), first)).unwrap();

        for year in [2022, 2023] {
            let block = insight_core::BlockId::for_year(year);
            if let Some(meta) = block_on(store.get_block_metadata(&project(), block)).unwrap() {
                for chunk in &meta.chunk_metadata {
                    prop_assert!(chunk.count <= CHUNK_MAX);
                    prop_assert_eq!(chunk.completed, chunk.count == CHUNK_MAX);
                }
            }
        }
    }

    #[test]
    fn range_query_returns_exactly_the_covered_deployments(
        batch in arb_batch(),
        a in span_start()..span_end(),
        b in span_start()..span_end(),
    ) {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        let store = store();
        block_on(store.put_completed_deployments(&project(), &batch)).unwrap();

        let listed = block_on(store.list_completed_deployments(&project(), from, to)).unwrap();

        prop_assert!(listed.windows(2).all(|w| w[0].completed_at <= w[1].completed_at));
        let got: BTreeSet<_> = listed.iter().map(|d| (d.completed_at, d.id.clone())).collect();
        let want: BTreeSet<_> = batch
            .iter()
            .filter(|d| from <= d.completed_at && d.completed_at <= to)
            .map(|d| (d.completed_at, d.id.clone()))
            .collect();
        prop_assert_eq!(listed.len(), want.len());
        prop_assert_eq!(got, want);
    }
}
