use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Explication humaine d'un code "pending reason" de Slurm.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ReasonInfo {
    pub title: &'static str,
    pub explanation: &'static str,
    pub remedies: &'static [&'static str],
}

/// Catalogue statique, initialisé une fois, jamais modifié.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReasonCatalog {
    entries: BTreeMap<&'static str, ReasonInfo>,
}

const ENTRIES: &[(&str, ReasonInfo)] = &[
    (
        "Priority",
        ReasonInfo {
            title: "Waiting on priority",
            explanation: "Your job is queued behind others with higher priority/fairshare.",
            remedies: &[
                "Try a less busy partition",
                "Reduce walltime to enable backfilling",
                "Submit during off-peak hours (night/weekend)",
            ],
        },
    ),
    (
        "ReqNodeNotAvail",
        ReasonInfo {
            title: "Requested node type not available",
            explanation: "Nodes matching your constraints (e.g., GPU model) are busy/reserved.",
            remedies: &[
                "Relax GPU type/constraints if acceptable",
                "Switch to an equivalent partition",
                "Lower requested GPUs or time limit",
            ],
        },
    ),
    (
        "Resources",
        ReasonInfo {
            title: "Insufficient resources",
            explanation: "Cluster cannot currently meet your CPU/MEM/GPU request.",
            remedies: &[
                "Request fewer CPUs/GPUs or less memory",
                "Try a different partition",
                "Shorten the requested time limit",
            ],
        },
    ),
    (
        "QOSMaxMemoryPerUser",
        ReasonInfo {
            title: "QoS memory cap reached",
            explanation: "You've reached the memory allowed by your QoS/user policy.",
            remedies: &[
                "Lower memory request",
                "Split into smaller jobs",
                "Contact support for appropriate QoS",
            ],
        },
    ),
    (
        "Licenses",
        ReasonInfo {
            title: "License availability",
            explanation: "Needed software license is not available at the moment.",
            remedies: &[
                "Run at a different time when licenses free up",
                "Use alternative software if possible",
            ],
        },
    ),
];

impl ReasonCatalog {
    fn build() -> Self {
        Self { entries: ENTRIES.iter().cloned().collect() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accepte le code brut ou tel qu'affiché par squeue :
    /// `Priority`, `(Priority)`, `(ReqNodeNotAvail, UnavailableNodes:n[01-02])`.
    pub fn lookup(&self, reason: &str) -> Option<&ReasonInfo> {
        self.entries.get(normalize_reason(reason))
    }
}

pub fn normalize_reason(reason: &str) -> &str {
    let r = reason.trim();
    let r = r.strip_prefix('(').unwrap_or(r);
    let r = r.strip_suffix(')').unwrap_or(r);
    r.split(',').next().unwrap_or(r).trim()
}

pub fn reason_catalog() -> &'static ReasonCatalog {
    static CATALOG: OnceLock<ReasonCatalog> = OnceLock::new();
    CATALOG.get_or_init(ReasonCatalog::build)
}
