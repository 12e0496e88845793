use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Un noeud de calcul tel que vu par `sinfo` (une ligne par partition).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Node {
    pub partition: String,
    pub name: String,
    pub state: String,            // idle|mix|alloc|drain|down|...
    pub cpus_allocated: u32,
    pub cpus_idle: u32,
    pub cpus_other: u32,
    pub cpus_total: u32,
    pub memory_mb: u64,
    pub gres: Option<String>,     // ex: gpu:a40:4
}

/// Un job tel que vu par `squeue`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub partition: String,
    pub name: String,
    pub user: String,
    pub state: String,            // R|PD|CG|...
    pub runtime: String,          // HH:MM:SS ou D-HH:MM:SS
    pub node_count: u32,
    pub reason: String,           // (Priority), (Resources), ou nodelist si R
    pub requested_cpus: u32,
    pub requested_memory: String,
    pub requested_gres: Option<String>,
}

impl Job {
    pub fn is_pending(&self) -> bool {
        self.state == "PD"
    }

    pub fn is_running(&self) -> bool {
        self.state == "R"
    }

    /// Bloqué uniquement par la priorité/fairshare (heuristique par sous-chaîne).
    pub fn waits_on_priority(&self) -> bool {
        self.reason.contains("Priority")
    }
}

/// Vue immuable et horodatée du cluster, remplacée en bloc à chaque cycle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    #[serde(with = "time::serde::timestamp")]
    pub generated_at: OffsetDateTime,
    pub nodes: Vec<Node>,
    pub jobs: Vec<Job>,
}

impl Snapshot {
    pub fn new(nodes: Vec<Node>, jobs: Vec<Job>) -> Self {
        Self::at(OffsetDateTime::now_utc(), nodes, jobs)
    }

    pub fn at(generated_at: OffsetDateTime, nodes: Vec<Node>, jobs: Vec<Job>) -> Self {
        Self { generated_at, nodes, jobs }
    }

    pub fn nodes_in<'a>(&'a self, partition: Option<&'a str>) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| partition.map_or(true, |p| n.partition == p))
    }

    /// Jobs d'une partition précise (pas de repli "toutes partitions").
    pub fn jobs_in<'a>(&'a self, partition: &'a str) -> impl Iterator<Item = &'a Job> + 'a {
        self.jobs.iter().filter(move |j| j.partition == partition)
    }
}

/// Job hypothétique soumis à l'estimateur. Seule la partition est exploitée,
/// les autres champs sont renvoyés tels quels dans la réponse.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct JobSpec {
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpus: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Med,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EtaEstimate {
    pub spec: JobSpec,
    pub eta_minutes_low: u32,
    pub eta_minutes_high: u32,
    pub confidence: Confidence,
    pub rationale: String,
    pub idle_cpus: u64,
    pub queued_cpus: u64,
    pub avg_runtime_hours: f64,
    pub load_ratio: f64,
}

/// Résumé par partition pour `GET /partitions`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PartitionSummary {
    pub partition: String,
    pub nodes: u32,
    pub cpus_idle: u64,
    pub cpus_total: u64,
    pub jobs_running: u32,
    pub jobs_pending: u32,
}
