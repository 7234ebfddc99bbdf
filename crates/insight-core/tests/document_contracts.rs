//! Contract tests for stored document encodings and the storage backends.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::Bytes;
use serde_json::json;

use insight_core::prelude::*;
use insight_core::{LocalFsBackend, StorageBackend};

#[test]
fn block_metadata_keys_are_stable() {
    let mut meta = DeploymentBlockMetadata::new(BlockId::for_year(2023));
    let mut chunk = DeploymentChunkMetadata::new(0, 100);
    chunk.count = 3;
    chunk.max_timestamp = 300;
    chunk.completed = true;
    meta.chunk_metadata.push(chunk);

    assert_eq!(
        serde_json::to_value(&meta).unwrap(),
        json!({
            "block_id": "block_2023",
            "chunk_metadata": [{
                "chunk_id": "chunk_0",
                "chunk_index": 0,
                "min_timestamp": 100,
                "max_timestamp": 300,
                "count": 3,
                "completed": true
            }]
        })
    );
}

#[test]
fn deployment_keys_are_stable() {
    let deployment = DeploymentData {
        id: "d1".into(),
        app_id: "app".into(),
        labels: Labels::from([("env".to_string(), "prod".to_string())]),
        started_at: 10,
        completed_at: 20,
        complete_status: DeploymentStatus::Failure,
        rollback_started_at: 15,
    };
    assert_eq!(
        serde_json::to_value(&deployment).unwrap(),
        json!({
            "id": "d1",
            "app_id": "app",
            "labels": { "env": "prod" },
            "started_at": 10,
            "completed_at": 20,
            "complete_status": "DEPLOYMENT_FAILURE",
            "rollback_started_at": 15
        })
    );
}

#[test]
fn unknown_keys_are_tolerated_and_dropped_on_rewrite() {
    let raw = json!({
        "applications": [{
            "id": "a",
            "labels": {},
            "kind": "ECS",
            "status": "DISABLED",
            "owner": "team-x"
        }],
        "updated_at": 5,
        "schema": 2
    });
    let snapshot: ProjectApplicationData = serde_json::from_value(raw).unwrap();
    assert_eq!(snapshot.applications[0].kind, ApplicationKind::Ecs);
    assert_eq!(
        snapshot.applications[0].status,
        ApplicationActiveStatus::Disabled
    );

    let rewritten = serde_json::to_value(&snapshot).unwrap();
    assert!(rewritten.get("schema").is_none());
    assert!(rewritten["applications"][0].get("owner").is_none());
}

#[test]
fn milestone_key_is_stable() {
    let milestone = Milestone {
        deployment_completed_at_milestone: 1_700_000_000,
    };
    assert_eq!(
        serde_json::to_string(&milestone).unwrap(),
        r#"{"deployment_completed_at_milestone":1700000000}"#
    );
}

async fn exercise_backend(backend: &dyn StorageBackend) {
    let path = "insights/p1/deployments/block_2023/chunk_0.json";
    assert!(backend.get(path).await.unwrap_err().is_not_found());

    backend.put(path, Bytes::from_static(b"{}")).await.unwrap();
    backend
        .put("insights/p2/applications/applications.json", Bytes::from_static(b"[]"))
        .await
        .unwrap();
    assert_eq!(backend.get(path).await.unwrap(), Bytes::from_static(b"{}"));

    backend.put(path, Bytes::from_static(b"{\"v\":2}")).await.unwrap();
    assert_eq!(
        backend.get(path).await.unwrap(),
        Bytes::from_static(b"{\"v\":2}")
    );

    let listed = backend.list("insights/p1/").await.unwrap();
    let paths: Vec<_> = listed.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec![path]);

    backend.delete(path).await.unwrap();
    backend.delete(path).await.unwrap();
    assert!(backend.get(path).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn memory_backend_honours_the_contract() {
    exercise_backend(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn local_fs_backend_honours_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_backend(&LocalFsBackend::new(dir.path())).await;
}
