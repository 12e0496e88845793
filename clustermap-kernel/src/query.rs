/**
 * REQUÊTES CLUSTER - Lecture du snapshot courant
 *
 * RÔLE :
 * Surface de lecture utilisée par l'API HTTP : vues filtrées, agrégats par
 * partition, catalogue des raisons, estimation d'attente.
 *
 * Tant qu'aucun snapshot n'est publié : `QueryError::NotReady`.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;

use crate::eta::estimate;
use crate::models::{EtaEstimate, Job, JobSpec, Node, PartitionSummary, Snapshot};
use crate::reasons::{reason_catalog, ReasonCatalog};
use crate::state::SharedStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Aucun snapshot publié pour l'instant : à réessayer plus tard.
    #[error("No data yet; polling HPC.")]
    NotReady,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NodesView {
    #[serde(with = "time::serde::timestamp")]
    pub generated_at: OffsetDateTime,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobsView {
    #[serde(with = "time::serde::timestamp")]
    pub generated_at: OffsetDateTime,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct NodeFilter {
    pub partition: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct JobFilter {
    pub partition: Option<String>,
    pub user: Option<String>,
    pub state: Option<String>,
}

impl NodeFilter {
    fn matches(&self, n: &Node) -> bool {
        self.partition.as_deref().map_or(true, |p| n.partition == p)
            && self.state.as_deref().map_or(true, |s| n.state.eq_ignore_ascii_case(s))
    }
}

impl JobFilter {
    fn matches(&self, j: &Job) -> bool {
        self.partition.as_deref().map_or(true, |p| j.partition == p)
            && self.user.as_deref().map_or(true, |u| j.user == u)
            && self.state.as_deref().map_or(true, |s| j.state.eq_ignore_ascii_case(s))
    }
}

#[derive(Clone)]
pub struct ClusterQuery {
    store: SharedStore,
}

impl ClusterQuery {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>, QueryError> {
        self.store.current().ok_or(QueryError::NotReady)
    }

    pub fn get_nodes(&self) -> Result<NodesView, QueryError> {
        self.get_nodes_filtered(&NodeFilter::default())
    }

    pub fn get_nodes_filtered(&self, filter: &NodeFilter) -> Result<NodesView, QueryError> {
        let snap = self.snapshot()?;
        Ok(NodesView {
            generated_at: snap.generated_at,
            nodes: snap.nodes.iter().filter(|n| filter.matches(n)).cloned().collect(),
        })
    }

    pub fn get_jobs(&self) -> Result<JobsView, QueryError> {
        self.get_jobs_filtered(&JobFilter::default())
    }

    pub fn get_jobs_filtered(&self, filter: &JobFilter) -> Result<JobsView, QueryError> {
        let snap = self.snapshot()?;
        Ok(JobsView {
            generated_at: snap.generated_at,
            jobs: snap.jobs.iter().filter(|j| filter.matches(j)).cloned().collect(),
        })
    }

    pub fn get_partitions(&self) -> Result<Vec<PartitionSummary>, QueryError> {
        let snap = self.snapshot()?;
        Ok(summarize_partitions(&snap))
    }

    pub fn reason_catalog(&self) -> &'static ReasonCatalog {
        reason_catalog()
    }

    pub fn estimate_eta(&self, spec: &JobSpec) -> Result<EtaEstimate, QueryError> {
        let snap = self.snapshot()?;
        Ok(estimate(spec, &snap))
    }
}

fn partition_entry<'a, 'm>(
    map: &'m mut BTreeMap<&'a str, PartitionSummary>,
    name: &'a str,
) -> &'m mut PartitionSummary {
    map.entry(name)
        .or_insert_with(|| PartitionSummary { partition: name.to_string(), ..Default::default() })
}

/// Agrégats par partition, triés par nom.
pub fn summarize_partitions(snapshot: &Snapshot) -> Vec<PartitionSummary> {
    let mut by_name: BTreeMap<&str, PartitionSummary> = BTreeMap::new();

    for n in &snapshot.nodes {
        let p = partition_entry(&mut by_name, &n.partition);
        p.nodes += 1;
        p.cpus_idle += u64::from(n.cpus_idle);
        p.cpus_total += u64::from(n.cpus_total);
    }
    for j in &snapshot.jobs {
        let p = partition_entry(&mut by_name, &j.partition);
        if j.is_running() {
            p.jobs_running += 1;
        } else if j.is_pending() {
            p.jobs_pending += 1;
        }
    }
    by_name.into_values().collect()
}
