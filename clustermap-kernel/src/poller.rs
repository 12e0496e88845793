/**
 * POLLER - Rafraîchissement périodique du snapshot cluster
 *
 * RÔLE :
 * Unique écrivain du `SnapshotStore`. Un cycle = sinfo + squeue via le
 * transport, parsing, réconciliation, publication atomique.
 *
 * FONCTIONNEMENT :
 * - Chaque cycle tourne dans sa propre task : erreur ou panic = cycle ignoré,
 *   le snapshot précédent reste visible, la boucle continue
 * - Intervalle mesuré fin de cycle -> début du suivant ("sleep after work"),
 *   un SSH lent allonge donc la période effective
 * - Arrêt uniquement via le `CancellationToken` ; un cycle en cours est abandonné
 */

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CommandsConf;
use crate::health::HealthTracker;
use crate::models::Snapshot;
use crate::parsers::{parse_sinfo, parse_squeue, ParseNote};
use crate::reconcile::reconcile_nodes;
use crate::runner::{CommandRunner, TransportError};
use crate::state::SharedStore;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("node listing failed: {0}")]
    Nodes(TransportError),
    #[error("job listing failed: {0}")]
    Jobs(TransportError),
}

/// Bilan d'un cycle réussi (pour les logs).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub nodes: usize,
    pub jobs: usize,
    pub clamped_nodes: usize,
    pub parse_notes: usize,
}

/// Texte brut -> snapshot réconcilié. Ne peut pas échouer.
pub fn build_snapshot(nodes_text: &str, jobs_text: &str) -> (Snapshot, CycleSummary, Vec<ParseNote>) {
    let node_report = parse_sinfo(nodes_text);
    let job_report = parse_squeue(jobs_text);

    let mut nodes = node_report.records;
    let clamped_nodes = reconcile_nodes(&mut nodes);

    let mut notes = node_report.notes;
    notes.extend(job_report.notes);

    let summary = CycleSummary {
        nodes: nodes.len(),
        jobs: job_report.records.len(),
        clamped_nodes,
        parse_notes: notes.len(),
    };
    (Snapshot::new(nodes, job_report.records), summary, notes)
}

pub struct Poller<R: CommandRunner> {
    runner: Arc<R>,
    store: SharedStore,
    health: HealthTracker,
    commands: CommandsConf,
    interval: Duration,
}

impl<R: CommandRunner> Poller<R> {
    pub fn new(runner: R, store: SharedStore, health: HealthTracker, commands: CommandsConf, interval: Duration) -> Self {
        Self { runner: Arc::new(runner), store, health, commands, interval }
    }

    /// Un cycle complet. En cas d'erreur rien n'est publié.
    pub async fn run_cycle(&self) -> Result<CycleSummary, CycleError> {
        let nodes_text = self.runner.run(&self.commands.nodes).await.map_err(CycleError::Nodes)?;
        let jobs_text = self.runner.run(&self.commands.jobs).await.map_err(CycleError::Jobs)?;

        let (snapshot, summary, notes) = build_snapshot(&nodes_text, &jobs_text);
        for note in &notes {
            debug!(line = note.line, "parse: {}", note.message);
        }
        if summary.clamped_nodes > 0 {
            debug!(count = summary.clamped_nodes, "clamped inconsistent idle cpu counts");
        }
        self.store.publish(snapshot);
        Ok(summary)
    }

    /// Boucle principale, jusqu'à annulation du token.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "poller started");
        let poller = Arc::new(self);

        loop {
            let started = Instant::now();
            let cycle = tokio::spawn({
                let poller = poller.clone();
                async move { poller.run_cycle().await }
            });
            let abort = cycle.abort_handle();

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    abort.abort();
                    info!("poller stopping, current cycle abandoned");
                    return;
                }
                outcome = cycle => outcome,
            };

            let took = started.elapsed();
            match outcome {
                Ok(Ok(summary)) => {
                    poller.health.mark_cycle_ok(took);
                    info!(
                        nodes = summary.nodes,
                        jobs = summary.jobs,
                        notes = summary.parse_notes,
                        took_ms = took.as_millis() as u64,
                        "snapshot published"
                    );
                }
                Ok(Err(e)) => {
                    poller.health.mark_cycle_failed(&e.to_string(), took);
                    error!("poll cycle failed, keeping previous snapshot: {e}");
                }
                Err(join_err) => {
                    let msg = format!("poll cycle aborted: {join_err}");
                    poller.health.mark_cycle_failed(&msg, took);
                    warn!("{msg}");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("poller stopped");
                    return;
                }
                _ = tokio::time::sleep(poller.interval) => {}
            }
        }
    }
}

/// Démarre l'unique poller du processus.
pub fn spawn_poller<R: CommandRunner>(poller: Poller<R>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(poller.run(shutdown))
}
