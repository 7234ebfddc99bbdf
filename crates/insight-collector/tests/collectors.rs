//! Collector runs against in-memory catalogues and a traced store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use insight_collector::{ApplicationCollector, DeploymentCollector, Scheduler};
use insight_core::catalog::{FilterOperator, FilterValue, fields};
use insight_core::config::InsightConfig;
use insight_core::model::{ApplicationActiveStatus, ApplicationKind, Milestone};
use insight_core::{Error, InsightPaths, ProjectId};
use insight_test_utils::{
    ApplicationFactory, DeploymentFactory, FailOn, MemoryApplicationCatalog,
    MemoryDeploymentCatalog, TestContext, init_test_logging, ts,
};

fn at(unix: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(unix, 0).unwrap()
}

async fn milestone(ctx: &TestContext) -> Option<i64> {
    ctx.store
        .get_milestone()
        .await
        .unwrap()
        .map(|m| m.deployment_completed_at_milestone)
}

async fn set_milestone(ctx: &TestContext, value: i64) {
    ctx.store
        .put_milestone(&Milestone {
            deployment_completed_at_milestone: value,
        })
        .await
        .unwrap();
}

// ============================================================================
// Application collector
// ============================================================================

#[tokio::test]
async fn application_snapshot_is_written_per_project() {
    init_test_logging();
    let ctx = TestContext::new();
    let catalog = MemoryApplicationCatalog::new([
        ApplicationFactory::new("a", "p1").created_at(1).build(),
        ApplicationFactory::new("b", "p1").created_at(2).disabled().build(),
        ApplicationFactory::new("c", "p2")
            .created_at(3)
            .kind(ApplicationKind::Ecs)
            .build(),
        ApplicationFactory::new("gone", "p1").created_at(4).deleted().build(),
    ]);
    let collector = ApplicationCollector::new(Arc::new(catalog.clone()), ctx.store.clone());

    let now = at(ts(2024, 3, 1));
    let report = collector
        .execute_at(now, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.applications, 3);
    assert_eq!(report.projects_written, 2);
    assert!(!report.had_errors());

    let p1 = ctx
        .store
        .get_applications(&ProjectId::new("p1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p1.updated_at, now.timestamp());
    let ids: Vec<_> = p1.applications.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(p1.applications[1].status, ApplicationActiveStatus::Disabled);

    let request = &catalog.requests()[0];
    assert_eq!(request.limit, 100);
    assert_eq!(request.filters[0].field, fields::DELETED);
    assert_eq!(request.filters[0].value, FilterValue::Bool(false));
    let orders: Vec<_> = request.orders.iter().map(|o| o.field.as_str()).collect();
    assert_eq!(orders, vec![fields::CREATED_AT, fields::ID]);
}

#[tokio::test]
async fn application_listing_follows_every_page() {
    let ctx = TestContext::new();
    let catalog = MemoryApplicationCatalog::new(
        (0..7).map(|i| ApplicationFactory::new(format!("a{i}"), "p1").created_at(i).build()),
    );
    let collector = ApplicationCollector::new(Arc::new(catalog.clone()), ctx.store.clone())
        .with_page_size(3);

    let report = collector.execute(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.applications, 7);
    assert_eq!(catalog.requests().len(), 3);
}

#[tokio::test]
async fn application_listing_failure_writes_nothing() {
    let ctx = TestContext::new();
    let catalog = MemoryApplicationCatalog::new(
        (0..4).map(|i| ApplicationFactory::new(format!("a{i}"), "p1").created_at(i).build()),
    );
    catalog.fail_from_call(1);
    let collector = ApplicationCollector::new(Arc::new(catalog), ctx.store.clone())
        .with_page_size(2);

    let err = collector
        .execute(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Catalog { .. }));
    assert!(ctx.storage.paths().is_empty());
}

#[tokio::test]
async fn one_failing_snapshot_does_not_block_others() {
    let ctx = TestContext::new();
    let catalog = MemoryApplicationCatalog::new([
        ApplicationFactory::new("a", "p1").build(),
        ApplicationFactory::new("b", "p2").build(),
    ]);
    let p1 = ProjectId::new("p1").unwrap();
    ctx.storage
        .inject_failure_on(InsightPaths::applications(&p1), FailOn::Write);
    let collector = ApplicationCollector::new(Arc::new(catalog), ctx.store.clone());

    let report = collector.execute(&CancellationToken::new()).await.unwrap();
    assert!(report.had_errors());
    assert_eq!(report.projects_failed, vec!["p1".to_string()]);
    assert_eq!(report.projects_written, 1);
    assert!(
        ctx.store
            .get_applications(&ProjectId::new("p2").unwrap())
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn project_without_applications_gets_an_empty_snapshot() {
    let ctx = TestContext::new();
    let before = MemoryApplicationCatalog::new([
        ApplicationFactory::new("a", "p1").created_at(1).build(),
        ApplicationFactory::new("b", "p2").created_at(2).build(),
    ]);
    ApplicationCollector::new(Arc::new(before), ctx.store.clone())
        .execute_at(at(ts(2024, 3, 1)), &CancellationToken::new())
        .await
        .unwrap();

    // The only application of p2 was deleted.
    let after = MemoryApplicationCatalog::new([
        ApplicationFactory::new("a", "p1").created_at(1).build(),
        ApplicationFactory::new("b", "p2").created_at(2).deleted().build(),
    ]);
    let collector = ApplicationCollector::new(Arc::new(after), ctx.store.clone());
    let now = at(ts(2024, 3, 2));
    let report = collector
        .execute_at(now, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.projects_written, 1);
    assert_eq!(report.projects_cleared, 1);
    assert!(!report.had_errors());

    let p2 = ctx
        .store
        .get_applications(&ProjectId::new("p2").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(p2.applications.is_empty());
    assert_eq!(p2.updated_at, now.timestamp());

    let again = collector
        .execute_at(at(ts(2024, 3, 3)), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.projects_cleared, 0);
    let p2 = ctx
        .store
        .get_applications(&ProjectId::new("p2").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p2.updated_at, now.timestamp());
}

#[tokio::test]
async fn failed_snapshot_scan_is_reported() {
    let ctx = TestContext::new();
    let catalog = MemoryApplicationCatalog::new([ApplicationFactory::new("a", "p1").build()]);
    ctx.storage
        .inject_failure_on(format!("{}/", InsightPaths::PREFIX), FailOn::Read);
    let collector = ApplicationCollector::new(Arc::new(catalog), ctx.store.clone());

    let report = collector.execute(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.projects_written, 1);
    assert!(report.stale_scan_failed);
    assert!(report.had_errors());
}

// ============================================================================
// Deployment collector
// ============================================================================

#[tokio::test]
async fn missing_milestone_bootstraps_one_hour_back() {
    let ctx = TestContext::new();
    let now = ts(2024, 5, 1);
    let catalog = MemoryDeploymentCatalog::new([
        DeploymentFactory::new("old", "app", "p1")
            .completed_at(now - 2 * 3600)
            .build(),
        DeploymentFactory::new("recent", "app", "p1")
            .completed_at(now - 600)
            .build(),
    ]);
    let collector = DeploymentCollector::new(Arc::new(catalog.clone()), ctx.store.clone());

    let report = collector
        .execute_at(at(now), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.from, now - 3600);
    assert_eq!(report.to, now);
    assert_eq!(report.inserted, 1);
    assert!(report.milestone_advanced);
    assert_eq!(milestone(&ctx).await, Some(now));

    let request = &catalog.requests()[0];
    assert_eq!(request.limit, 50);
    assert_eq!(request.filters.len(), 2);
    assert_eq!(request.filters[0].field, fields::COMPLETED_AT);
    assert_eq!(request.filters[0].operator, FilterOperator::Ge);
    assert_eq!(request.filters[0].value, FilterValue::Int(now - 3600));
    assert_eq!(request.filters[1].operator, FilterOperator::Le);
    assert_eq!(request.filters[1].value, FilterValue::Int(now));
}

#[tokio::test]
async fn successful_run_advances_milestone_and_stores_deployments() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start).await;
    let catalog = MemoryDeploymentCatalog::new([
        DeploymentFactory::new("d1", "app", "p1")
            .completed_at(start + 10)
            .rollback_at(start + 5)
            .build(),
        DeploymentFactory::new("d2", "app", "p2")
            .completed_at(start + 20)
            .build(),
    ]);
    let collector = DeploymentCollector::new(Arc::new(catalog), ctx.store.clone());

    let now = start + 600;
    let report = collector
        .execute_at(at(now), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.listed, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(milestone(&ctx).await, Some(now));

    let p1 = ctx
        .store
        .list_completed_deployments(&ProjectId::new("p1").unwrap(), start, now)
        .await
        .unwrap();
    assert_eq!(p1.len(), 1);
    assert_eq!(p1[0].id, "d1");
    assert_eq!(p1[0].rollback_started_at, start + 5);
    assert_eq!(p1[0].started_at, start + 10 - 60);
}

#[tokio::test]
async fn failed_write_keeps_milestone() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start).await;
    let catalog = MemoryDeploymentCatalog::new([
        DeploymentFactory::new("d1", "app", "p1")
            .completed_at(start + 10)
            .build(),
        DeploymentFactory::new("d2", "app", "p2")
            .completed_at(start + 20)
            .build(),
    ]);
    let p2 = ProjectId::new("p2").unwrap();
    ctx.storage
        .inject_failure_on(InsightPaths::deployments_prefix(&p2), FailOn::Write);
    let collector = DeploymentCollector::new(Arc::new(catalog), ctx.store.clone());

    let report = collector
        .execute_at(at(start + 600), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.had_errors());
    assert!(!report.milestone_advanced);
    assert_eq!(report.projects_failed, vec!["p2".to_string()]);
    assert_eq!(milestone(&ctx).await, Some(start));

    // The retry re-lists the same window; p1 is absorbed as duplicates.
    ctx.storage.clear_failures();
    let retry = collector
        .execute_at(at(start + 700), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(retry.from, start);
    assert_eq!(retry.inserted, 1);
    assert_eq!(retry.duplicates, 1);
    assert_eq!(milestone(&ctx).await, Some(start + 700));
}

#[tokio::test]
async fn listing_failure_keeps_milestone() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start).await;
    let catalog = MemoryDeploymentCatalog::default();
    catalog.fail_always();
    let collector = DeploymentCollector::new(Arc::new(catalog), ctx.store.clone());

    let err = collector
        .execute_at(at(start + 600), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Catalog { .. }));
    assert_eq!(milestone(&ctx).await, Some(start));
}

#[tokio::test]
async fn long_outage_is_clamped_to_two_days() {
    let ctx = TestContext::new();
    let start = ts(2024, 1, 1);
    set_milestone(&ctx, start).await;
    let now = ts(2024, 1, 10);
    let catalog = MemoryDeploymentCatalog::new([
        DeploymentFactory::new("abandoned", "app", "p1")
            .completed_at(start + 3600)
            .build(),
        DeploymentFactory::new("kept", "app", "p1")
            .completed_at(now - 3600)
            .build(),
    ]);
    let collector = DeploymentCollector::new(Arc::new(catalog), ctx.store.clone());

    let report = collector
        .execute_at(at(now), &CancellationToken::new())
        .await
        .unwrap();
    let two_days = 2 * 24 * 3600;
    assert_eq!(report.from, now - two_days);
    assert_eq!(report.skipped_secs, now - two_days - start);
    assert_eq!(report.lag_secs, now - start);
    assert_eq!(report.inserted, 1);
    assert_eq!(milestone(&ctx).await, Some(now));
}

#[tokio::test]
async fn clock_behind_milestone_never_moves_it_back() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start + 1000).await;
    let catalog = MemoryDeploymentCatalog::new([DeploymentFactory::new("d1", "app", "p1")
        .completed_at(start + 100)
        .build()]);
    let collector = DeploymentCollector::new(Arc::new(catalog.clone()), ctx.store.clone());

    let report = collector
        .execute_at(at(start + 500), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.milestone_advanced);
    assert!(!report.had_errors());
    assert_eq!(report.listed, 0);
    assert!(catalog.requests().is_empty());
    assert_eq!(milestone(&ctx).await, Some(start + 1000));

    // Once the clock passes the milestone, collection resumes from it.
    let report = collector
        .execute_at(at(start + 1600), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.milestone_advanced);
    assert_eq!(report.from, start + 1000);
    assert_eq!(report.lag_secs, 600);
    assert_eq!(milestone(&ctx).await, Some(start + 1600));
}

#[tokio::test]
async fn cancelled_run_does_not_advance_milestone() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start).await;
    let catalog = MemoryDeploymentCatalog::new([DeploymentFactory::new("d1", "app", "p1")
        .completed_at(start + 10)
        .build()]);
    let collector = DeploymentCollector::new(Arc::new(catalog), ctx.store.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = collector
        .execute_at(at(start + 600), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(milestone(&ctx).await, Some(start));
}

#[tokio::test]
async fn config_settings_reach_the_collector() {
    let ctx = TestContext::new();
    let now = ts(2024, 5, 1);
    let config = InsightConfig {
        deployment_page_size: 7,
        milestone_bootstrap_secs: 60,
        ..InsightConfig::default()
    };
    let catalog = MemoryDeploymentCatalog::default();
    let collector =
        DeploymentCollector::from_config(Arc::new(catalog.clone()), ctx.store.clone(), &config);

    let report = collector
        .execute_at(at(now), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.from, now - 60);
    assert_eq!(catalog.requests()[0].limit, 7);
}

#[tokio::test]
async fn overlapping_runs_are_serialised() {
    let ctx = TestContext::new();
    let start = ts(2024, 5, 1);
    set_milestone(&ctx, start).await;
    let catalog = MemoryDeploymentCatalog::new(
        (0..20).map(|i| {
            DeploymentFactory::new(format!("d{i}"), "app", "p1")
                .completed_at(start + i)
                .build()
        }),
    );
    let collector = Arc::new(
        DeploymentCollector::new(Arc::new(catalog), ctx.store.clone()).with_page_size(3),
    );

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        collector.execute_at(at(start + 100), &cancel),
        collector.execute_at(at(start + 100), &cancel),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.inserted + b.inserted, 20);
    // The second run starts from the first run's milestone.
    assert_eq!(a.listed.min(b.listed), 0);

    let stored = ctx
        .store
        .list_completed_deployments(&ProjectId::new("p1").unwrap(), start, start + 100)
        .await
        .unwrap();
    assert_eq!(stored.len(), 20);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn scheduler_runs_enabled_jobs_and_stops_on_shutdown() {
    let ctx = TestContext::new();
    let applications = Arc::new(ApplicationCollector::new(
        Arc::new(MemoryApplicationCatalog::new([ApplicationFactory::new("a", "p1").build()])),
        ctx.store.clone(),
    ));
    let deployments = Arc::new(DeploymentCollector::new(
        Arc::new(MemoryDeploymentCatalog::default()),
        ctx.store.clone(),
    ));

    let mut config = InsightConfig::default();
    config.deployment_collector.enabled = Some(true);
    config.deployment_collector.schedule = "* * * * * *".into();
    // Application job left disabled.

    let scheduler = Scheduler::from_config(&config, applications, deployments).unwrap();
    assert_eq!(scheduler.job_names(), vec!["deployment_collector"]);

    let handle = scheduler.start(CancellationToken::new());
    let fired = tokio::time::timeout(Duration::from_secs(5), async {
        while milestone(&ctx).await.is_none() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    handle.shutdown().await;

    assert!(fired.is_ok(), "deployment job never fired");
    assert!(
        ctx.store
            .get_applications(&ProjectId::new("p1").unwrap())
            .await
            .unwrap()
            .is_none()
    );
}

#[test]
fn scheduler_installs_nothing_when_flags_are_unset() {
    let ctx = TestContext::new();
    let applications = Arc::new(ApplicationCollector::new(
        Arc::new(MemoryApplicationCatalog::default()),
        ctx.store.clone(),
    ));
    let deployments = Arc::new(DeploymentCollector::new(
        Arc::new(MemoryDeploymentCatalog::default()),
        ctx.store.clone(),
    ));
    let scheduler =
        Scheduler::from_config(&InsightConfig::default(), applications, deployments).unwrap();
    assert!(scheduler.is_empty());
}
