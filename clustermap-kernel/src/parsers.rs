/**
 * PARSERS SLURM - Conversion des sorties texte sinfo/squeue en records typés
 *
 * RÔLE :
 * Transforme une sortie de commande délimitée par `|` en `Node` / `Job`.
 *
 * FONCTIONNEMENT :
 * - Fonctions totales : aucune ligne ne fait échouer le parsing
 * - Ligne sans `|` = bannière/bruit, ignorée
 * - Champs manquants en fin de ligne = chaînes vides
 * - Chaque valeur par défaut appliquée laisse une `ParseNote` (diagnostic)
 *
 * FORMATS :
 * - sinfo  : partition|nodes|state|A/I/O/T|memory_mb|gres
 * - squeue : id|partition|name|user|state|runtime|nodes|reason|cpus|mem|gres
 */

use crate::models::{Job, Node};

pub const NODE_FIELDS: usize = 6;
pub const JOB_FIELDS: usize = 11;

const DEFAULT_RUNTIME: &str = "00:00:00";
const DEFAULT_REASON: &str = "None";

/// Diagnostic non bloquant attaché à une ligne (numérotée à partir de 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNote {
    pub line: usize,
    pub message: String,
}

/// Résultat best-effort d'un parsing complet.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport<T> {
    pub records: Vec<T>,
    pub notes: Vec<ParseNote>,
}

impl<T> Default for ParseReport<T> {
    fn default() -> Self {
        Self { records: Vec::new(), notes: Vec::new() }
    }
}

/// Compteurs CPU au format sinfo `%C` : Allocated/Idle/Other/Total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounts {
    pub allocated: u32,
    pub idle: u32,
    pub other: u32,
    pub total: u32,
}

impl CpuCounts {
    /// Strict : exactement 4 entiers séparés par `/`.
    pub fn parse(field: &str) -> Option<Self> {
        let mut parts = field.trim().split('/').map(|p| p.trim().parse::<u32>());
        let counts = Self {
            allocated: parts.next()?.ok()?,
            idle: parts.next()?.ok()?,
            other: parts.next()?.ok()?,
            total: parts.next()?.ok()?,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(counts)
    }
}

impl std::fmt::Display for CpuCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.allocated, self.idle, self.other, self.total)
    }
}

/// `(null)`, vide et `N/A` signifient "pas de ressource générique".
pub fn normalize_gres(field: &str) -> Option<String> {
    match field.trim() {
        "" | "(null)" | "N/A" => None,
        other => Some(other.to_string()),
    }
}

/// Découpe une ligne en exactement `expected` champs (le dernier garde les `|` restants).
/// `None` si la ligne ne contient aucun délimiteur.
fn split_fields(raw: &str, expected: usize) -> Option<(Vec<&str>, usize)> {
    if !raw.contains('|') {
        return None;
    }
    let mut fields: Vec<&str> = raw.splitn(expected, '|').map(str::trim).collect();
    let found = fields.len();
    fields.resize(expected, "");
    Some((fields, found))
}

/// Sépare une liste de noeuds sur les virgules hors crochets :
/// `a01,b[01-02,05]` -> `a01`, `b[01-02,05]`.
pub fn split_node_names(field: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in field.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => names.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    names.push(current);
    names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

fn is_node_header(fields: &[&str]) -> bool {
    fields[0].eq_ignore_ascii_case("PARTITION") && fields[3].starts_with("CPUS")
}

fn is_job_header(fields: &[&str]) -> bool {
    fields[0].eq_ignore_ascii_case("JOBID")
}

/// Parse une ligne sinfo. `None` = ligne ignorée (bruit ou en-tête).
/// Une ligne peut produire plusieurs noeuds (liste séparée par virgules).
pub fn parse_node_line(raw: &str) -> Option<(Vec<Node>, Vec<String>)> {
    let (fields, found) = split_fields(raw, NODE_FIELDS)?;
    if is_node_header(&fields) {
        return None;
    }
    let mut notes = Vec::new();
    if found < NODE_FIELDS {
        notes.push(format!("expected {NODE_FIELDS} fields, got {found}"));
    }

    let [partition, names, state, cpus, memory, gres] = [
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5],
    ];

    let cpus = CpuCounts::parse(cpus).unwrap_or_else(|| {
        notes.push(format!("unparseable cpu field {cpus:?}, using 0/0/0/0"));
        CpuCounts::default()
    });
    let memory_mb = memory.parse::<u64>().unwrap_or_else(|_| {
        notes.push(format!("unparseable memory {memory:?}, using 0"));
        0
    });
    let gres = normalize_gres(gres);
    let state = state.to_lowercase();

    let nodes = split_node_names(names)
        .into_iter()
        .map(|name| Node {
            partition: partition.to_string(),
            name,
            state: state.clone(),
            cpus_allocated: cpus.allocated,
            cpus_idle: cpus.idle,
            cpus_other: cpus.other,
            cpus_total: cpus.total,
            memory_mb,
            gres: gres.clone(),
        })
        .collect();

    Some((nodes, notes))
}

/// Parse une ligne squeue. `None` = ligne ignorée (bruit ou en-tête).
pub fn parse_job_line(raw: &str) -> Option<(Job, Vec<String>)> {
    let (fields, found) = split_fields(raw, JOB_FIELDS)?;
    if is_job_header(&fields) {
        return None;
    }
    let mut notes = Vec::new();
    if found < JOB_FIELDS {
        notes.push(format!("expected {JOB_FIELDS} fields, got {found}"));
    }

    let node_count = match fields[6].parse::<u32>() {
        Ok(n) if n >= 1 => n,
        _ => {
            notes.push(format!("unparseable node count {:?}, using 1", fields[6]));
            1
        }
    };
    let requested_cpus = fields[8].parse::<u32>().unwrap_or_else(|_| {
        notes.push(format!("unparseable cpu count {:?}, using 0", fields[8]));
        0
    });
    let or_default = |value: &str, default: &str| {
        if value.is_empty() { default.to_string() } else { value.to_string() }
    };

    let job = Job {
        id: fields[0].to_string(),
        partition: fields[1].to_string(),
        name: fields[2].to_string(),
        user: fields[3].to_string(),
        state: fields[4].to_string(),
        runtime: or_default(fields[5], DEFAULT_RUNTIME),
        node_count,
        reason: or_default(fields[7], DEFAULT_REASON),
        requested_cpus,
        requested_memory: fields[9].to_string(),
        requested_gres: normalize_gres(fields[10]),
    };
    Some((job, notes))
}

fn parse_lines<T, I>(text: &str, mut parse_line: impl FnMut(&str) -> Option<(I, Vec<String>)>) -> ParseReport<T>
where
    I: IntoIterator<Item = T>,
{
    let mut report = ParseReport::default();
    for (idx, raw) in text.trim().lines().enumerate() {
        let Some((records, notes)) = parse_line(raw) else { continue };
        report.records.extend(records);
        report.notes.extend(notes.into_iter().map(|message| ParseNote { line: idx + 1, message }));
    }
    report
}

/// Parse la sortie complète de sinfo, ordre des lignes conservé.
pub fn parse_sinfo(text: &str) -> ParseReport<Node> {
    parse_lines(text, parse_node_line)
}

/// Parse la sortie complète de squeue, ordre des lignes conservé.
pub fn parse_squeue(text: &str) -> ParseReport<Job> {
    parse_lines(text, |raw| parse_job_line(raw).map(|(job, notes)| (Some(job), notes)))
}
