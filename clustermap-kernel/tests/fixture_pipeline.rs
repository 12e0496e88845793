use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use clustermap_kernel::config::CommandsConf;
use clustermap_kernel::health::HealthTracker;
use clustermap_kernel::models::{Confidence, JobSpec};
use clustermap_kernel::poller::{spawn_poller, Poller};
use clustermap_kernel::query::ClusterQuery;
use clustermap_kernel::runner::FixtureRunner;
use clustermap_kernel::state::SnapshotStore;

fn sample_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sample_data")
}

fn fixture_poller(dir: impl Into<PathBuf>) -> (Poller<FixtureRunner>, ClusterQuery, HealthTracker) {
    fixture_poller_every(dir, Duration::from_secs(12))
}

fn fixture_poller_every(
    dir: impl Into<PathBuf>,
    interval: Duration,
) -> (Poller<FixtureRunner>, ClusterQuery, HealthTracker) {
    let store = SnapshotStore::shared();
    let health = HealthTracker::new("fixtures");
    let poller = Poller::new(
        FixtureRunner::new(dir),
        store.clone(),
        health.clone(),
        CommandsConf::default(),
        interval,
    );
    (poller, ClusterQuery::new(store), health)
}

#[tokio::test]
async fn test_sample_data_cycle() {
    let (poller, query, _) = fixture_poller(sample_dir());
    let summary = poller.run_cycle().await.unwrap();

    // en-têtes ignorés, cn001,cn002 -> 2 noeuds
    assert_eq!(summary.nodes, 8);
    assert_eq!(summary.jobs, 10);
    assert_eq!(summary.clamped_nodes, 0);

    let nodes = query.get_nodes().unwrap();
    assert!(nodes.nodes.iter().all(|n| n.cpus_allocated + n.cpus_idle <= n.cpus_total));
    let bracketed = nodes.nodes.iter().find(|n| n.name == "gpu[01-02]").unwrap();
    assert_eq!(bracketed.cpus_idle, 16);

    let jobs = query.get_jobs().unwrap();
    let big = jobs.jobs.iter().find(|j| j.id == "41012").unwrap();
    assert_eq!(big.reason, "(ReqNodeNotAvail, UnavailableNodes:gpu04)");
    assert_eq!(big.requested_gres.as_deref(), Some("gres:gpu:4"));
}

#[tokio::test]
async fn test_sample_data_estimates() {
    let (poller, query, _) = fixture_poller(sample_dir());
    poller.run_cycle().await.unwrap();

    // gpu : 48 CPUs en attente (Priority) pour 16 idle
    let gpu = query
        .estimate_eta(&JobSpec { partition: Some("gpu".into()), ..Default::default() })
        .unwrap();
    assert_eq!(gpu.idle_cpus, 16);
    assert_eq!(gpu.queued_cpus, 48);
    assert_eq!(gpu.confidence, Confidence::Low);
    assert!(gpu.eta_minutes_low < gpu.eta_minutes_high);

    // cpu : 64 en attente pour 288 idle, un job R de 12:07:33
    let cpu = query
        .estimate_eta(&JobSpec { partition: Some("cpu".into()), ..Default::default() })
        .unwrap();
    assert_eq!(cpu.idle_cpus, 288);
    assert_eq!(cpu.confidence, Confidence::High);
    assert_eq!(cpu.eta_minutes_low, 81);
    assert_eq!(cpu.eta_minutes_high, 162);
}

#[tokio::test]
async fn test_missing_fixtures_publish_empty_snapshot() {
    let dir = TempDir::new().unwrap();
    let (poller, query, _) = fixture_poller(dir.path());
    poller.run_cycle().await.unwrap();

    assert!(query.get_nodes().unwrap().nodes.is_empty());
    assert!(query.get_partitions().unwrap().is_empty());
}

#[tokio::test]
async fn test_fixture_edits_show_up_next_cycle() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("sinfo.txt"), "p|n1|idle|0/4/0/4|1000|(null)\n").unwrap();
    let (poller, query, _) = fixture_poller(dir.path());

    poller.run_cycle().await.unwrap();
    assert_eq!(query.get_nodes().unwrap().nodes[0].state, "idle");

    std::fs::write(dir.path().join("sinfo.txt"), "p|n1|alloc|4/0/0/4|1000|(null)\n").unwrap();
    poller.run_cycle().await.unwrap();
    assert_eq!(query.get_nodes().unwrap().nodes[0].state, "alloc");
}

#[tokio::test]
async fn test_background_poller_stops_on_cancel() {
    let (poller, query, health) = fixture_poller_every(sample_dir(), Duration::from_millis(20));
    let shutdown = CancellationToken::new();
    let handle = spawn_poller(poller, shutdown.clone());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(health.cycles_ok() >= 2);
    assert!(query.get_nodes().is_ok());

    shutdown.cancel();
    handle.await.unwrap();
}
