use crate::models::Node;

/// Corrige les compteurs CPU incohérents (course de reporting côté Slurm) :
/// si allocated + idle > total, idle est ramené à total - allocated (min 0).
/// Un allocated seul supérieur à total est borné à total.
/// Les jobs ne passent pas par ici : ils sont publiés tels quels.
/// Retourne le nombre de noeuds corrigés.
pub fn reconcile_nodes(nodes: &mut [Node]) -> usize {
    let mut clamped = 0;
    for n in nodes.iter_mut() {
        if u64::from(n.cpus_allocated) + u64::from(n.cpus_idle) > u64::from(n.cpus_total) {
            n.cpus_idle = n.cpus_total.saturating_sub(n.cpus_allocated);
            n.cpus_allocated = n.cpus_allocated.min(n.cpus_total);
            clamped += 1;
        }
    }
    clamped
}
