/**
 * ESTIMATION ETA - Heuristique de temps d'attente en file
 *
 * FONCTIONNEMENT :
 * - Offre   : CPUs idle de la partition (tout le cluster si non précisée), min 1
 * - Demande : CPUs des jobs PD bloqués par "Priority" dans la partition
 * - Durée   : moyenne des runtimes des jobs R de la partition (min 0.5 h, 2 h si aucun)
 * - ETA     : demande / offre * durée, bornée en bandes de minutes
 *
 * Sans partition, aucun job n'est rattaché : demande nulle, durée par défaut.
 */

use crate::models::{Confidence, EtaEstimate, JobSpec, Snapshot};

const DEFAULT_RUNTIME_HOURS: f64 = 2.0;
const MIN_AVG_RUNTIME_HOURS: f64 = 0.5;
const MALFORMED_RUNTIME_HOURS: f64 = 1.0;

/// `D-HH:MM:SS`, `HH:MM:SS` or squeue's short `MM:SS` to fractional hours.
/// Anything else yields 1.0.
pub fn runtime_to_hours(s: &str) -> f64 {
    parse_runtime(s.trim()).unwrap_or(MALFORMED_RUNTIME_HOURS)
}

fn parse_runtime(s: &str) -> Option<f64> {
    let (days, rest) = match s.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, s),
    };
    let parts = rest
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (h, m, sec) = match parts.as_slice() {
        [h, m, sec] => (*h, *m, *sec),
        [m, sec] => (0, *m, *sec),
        _ => return None,
    };
    Some(days as f64 * 24.0 + h as f64 + m as f64 / 60.0 + sec as f64 / 3600.0)
}

fn confidence_for(load_ratio: f64) -> Confidence {
    if load_ratio > 2.0 {
        Confidence::Low
    } else if load_ratio >= 0.5 {
        Confidence::Med
    } else {
        Confidence::High
    }
}

/// Estimation pure et déterministe ; le snapshot doit exister (NotReady géré en amont).
pub fn estimate(spec: &JobSpec, snapshot: &Snapshot) -> EtaEstimate {
    let partition = spec.partition.as_deref().filter(|p| !p.is_empty());

    let idle_cpus = snapshot
        .nodes_in(partition)
        .map(|n| u64::from(n.cpus_idle))
        .sum::<u64>()
        .max(1);

    // les jobs ne sont comptés que dans la partition demandée
    let partition_jobs = move || partition.into_iter().flat_map(move |p| snapshot.jobs_in(p));

    let queued_cpus: u64 = partition_jobs()
        .filter(|j| j.is_pending() && j.waits_on_priority())
        .map(|j| u64::from(j.requested_cpus))
        .sum();

    let runtimes: Vec<f64> = partition_jobs()
        .filter(|j| j.is_running())
        .map(|j| runtime_to_hours(&j.runtime))
        .collect();
    let avg_runtime_hours = if runtimes.is_empty() {
        DEFAULT_RUNTIME_HOURS
    } else {
        (runtimes.iter().sum::<f64>() / runtimes.len() as f64).max(MIN_AVG_RUNTIME_HOURS)
    };

    let load_ratio = queued_cpus as f64 / idle_cpus as f64;
    let eta_hours = load_ratio * avg_runtime_hours;

    let eta_minutes_low = (eta_hours * 30.0).round().max(5.0) as u32;
    let eta_minutes_high = (eta_hours * 60.0).round().max(10.0) as u32;

    let scope = partition.unwrap_or("all partitions");
    EtaEstimate {
        spec: spec.clone(),
        eta_minutes_low,
        eta_minutes_high,
        confidence: confidence_for(load_ratio),
        rationale: format!(
            "Heuristic using current idle CPUs vs queued demand in partition: \
             {queued_cpus} CPUs pending on priority vs {idle_cpus} idle in {scope}, \
             average running job at {avg_runtime_hours:.2} h"
        ),
        idle_cpus,
        queued_cpus,
        avg_runtime_hours,
        load_ratio,
    }
}
