/**
 * TRANSPORT - Exécution des commandes Slurm (SSH, fixtures, texte statique)
 *
 * RÔLE :
 * Fournit au poller le texte brut renvoyé par `sinfo` / `squeue`.
 * Le poller ne connaît que le trait `CommandRunner` : passer du cluster réel
 * au mode mock ne touche ni aux parsers ni au poller.
 *
 * IMPLÉMENTATIONS :
 * - SshRunner     : `ssh [-i key] user@host <commande>` avec timeout
 * - FixtureRunner : lit `<dir>/sinfo.txt` / `<dir>/squeue.txt` (MOCK_MODE)
 * - StaticRunner  : textes en mémoire (tests, démo hors-ligne)
 *
 * Aucun retry ici : le cycle suivant du poller fait office de retry.
 */

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{KernelConfig, SshConf};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid transport command: {0}")]
    InvalidCommand(String),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote command failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("cannot read fixture {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Collaborateur d'exécution : commande -> texte brut (stdout, ou stderr si stdout vide).
pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, command: &str) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Clé d'une commande = nom du binaire : "/usr/bin/sinfo -o ..." -> "sinfo".
pub fn command_key(command: &str) -> &str {
    let program = command.split_whitespace().next().unwrap_or("");
    Path::new(program)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(program)
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SshRunner {
    client: String,
    destination: String,
    key_path: Option<PathBuf>,
    timeout: Duration,
}

impl SshRunner {
    pub fn from_conf(conf: &SshConf) -> Result<Self, TransportError> {
        let host = conf
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| TransportError::InvalidCommand("HPC_HOST is not configured".into()))?;
        let destination = match conf.user.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        };
        Ok(Self {
            client: conf.command.clone(),
            destination,
            key_path: conf.key_path.clone(),
            timeout: Duration::from_secs(conf.timeout_seconds),
        })
    }

    /// Ligne de commande complète passée à `Command` (programme en tête).
    fn argv(&self, command: &str) -> Result<Vec<String>, TransportError> {
        let mut argv = shell_words::split(&self.client)
            .map_err(|e| TransportError::InvalidCommand(format!("{}: {e}", self.client)))?;
        if argv.is_empty() {
            return Err(TransportError::InvalidCommand("empty ssh command".into()));
        }
        if let Some(key) = &self.key_path {
            argv.push("-i".into());
            argv.push(key.to_string_lossy().into_owned());
        }
        argv.push(self.destination.clone());
        argv.push(command.to_string());
        Ok(argv)
    }
}

/// stdout si non vide, sinon stderr. Un échec sans stdout est une erreur de transport.
fn select_output(stdout: &str, stderr: &str, success: bool, status: &str) -> Result<String, TransportError> {
    if !stdout.trim().is_empty() {
        if !success {
            warn!(%status, "remote command exited non-zero, using its output anyway");
        }
        return Ok(stdout.to_string());
    }
    if !success {
        return Err(TransportError::CommandFailed {
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stderr.to_string())
}

impl CommandRunner for SshRunner {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        let argv = self.argv(command)?;
        debug!(destination = %self.destination, %command, "executing remote command");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|source| TransportError::Spawn { program: argv[0].clone(), source })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        select_output(&stdout, &stderr, output.status.success(), &output.status.to_string())
    }
}

// ---------------------------------------------------------------------------
// Fixtures (mode mock)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FixtureRunner {
    data_dir: PathBuf,
}

impl FixtureRunner {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn fixture_path(&self, command: &str) -> PathBuf {
        let key = if command_key(command) == "sinfo" { "sinfo" } else { "squeue" };
        self.data_dir.join(format!("{key}.txt"))
    }
}

impl CommandRunner for FixtureRunner {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        let path = self.fixture_path(command);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            // fichier absent = sortie vide, comme un cluster sans noeuds
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(TransportError::Io { path, source }),
        }
    }
}

// ---------------------------------------------------------------------------
// Texte statique
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StaticRunner {
    outputs: HashMap<String, String>,
}

impl StaticRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associe une sortie à un binaire ("sinfo", "squeue").
    pub fn with(mut self, program: &str, output: impl Into<String>) -> Self {
        self.outputs.insert(program.to_string(), output.into());
        self
    }
}

impl CommandRunner for StaticRunner {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        Ok(self.outputs.get(command_key(command)).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Sélection selon la config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Transport {
    Ssh(SshRunner),
    Fixture(FixtureRunner),
}

impl Transport {
    pub fn from_config(cfg: &KernelConfig) -> Result<Self, TransportError> {
        if cfg.mock.enabled {
            Ok(Transport::Fixture(FixtureRunner::new(&cfg.mock.data_dir)))
        } else {
            Ok(Transport::Ssh(SshRunner::from_conf(&cfg.ssh)?))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Transport::Ssh(r) => format!("ssh {}", r.destination),
            Transport::Fixture(r) => format!("fixtures in {}", r.data_dir.display()),
        }
    }
}

impl CommandRunner for Transport {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        match self {
            Transport::Ssh(r) => r.run(command).await,
            Transport::Fixture(r) => r.run(command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_conf() -> SshConf {
        SshConf {
            host: Some("login.hpc.example".into()),
            user: Some("alice".into()),
            key_path: Some(PathBuf::from("/home/alice/.ssh/id_rsa")),
            command: "ssh -o BatchMode=yes -o 'ConnectTimeout=20'".into(),
            timeout_seconds: 25,
        }
    }

    #[test]
    fn test_command_key() {
        assert_eq!(command_key(r#"sinfo -o "%P|%N""#), "sinfo");
        assert_eq!(command_key("/usr/bin/squeue -o x"), "squeue");
        assert_eq!(command_key(""), "");
    }

    #[test]
    fn test_ssh_argv() {
        let runner = SshRunner::from_conf(&ssh_conf()).unwrap();
        let argv = runner.argv(r#"sinfo -o "%P|%N""#).unwrap();
        assert_eq!(
            argv,
            vec![
                "ssh",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=20",
                "-i",
                "/home/alice/.ssh/id_rsa",
                "alice@login.hpc.example",
                r#"sinfo -o "%P|%N""#,
            ]
        );
    }

    #[test]
    fn test_ssh_requires_host() {
        let mut conf = ssh_conf();
        conf.host = None;
        assert!(matches!(SshRunner::from_conf(&conf), Err(TransportError::InvalidCommand(_))));
    }

    #[test]
    fn test_ssh_without_user_or_key() {
        let mut conf = ssh_conf();
        conf.user = None;
        conf.key_path = None;
        let argv = SshRunner::from_conf(&conf).unwrap().argv("squeue").unwrap();
        assert_eq!(argv[argv.len() - 2], "login.hpc.example");
        assert!(!argv.contains(&"-i".to_string()));
    }

    #[test]
    fn test_select_output() {
        assert_eq!(select_output("a|b\n", "warn", true, "0").unwrap(), "a|b\n");
        assert_eq!(select_output("  \n", "only stderr", true, "0").unwrap(), "only stderr");
        assert_eq!(select_output("a|b", "boom", false, "1").unwrap(), "a|b");
        assert!(matches!(
            select_output("", "Permission denied", false, "exit status: 255"),
            Err(TransportError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fixture_runner_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sinfo.txt"), "p|n1|idle|0/4/0/4|1000|(null)\n").unwrap();
        let runner = FixtureRunner::new(dir.path());

        let nodes = runner.run(r#"sinfo -o "%P|%N|%T|%C|%m|%G""#).await.unwrap();
        assert!(nodes.starts_with("p|n1"));

        // squeue.txt absent -> sortie vide
        let jobs = runner.run("squeue -o x").await.unwrap();
        assert_eq!(jobs, "");
    }

    #[tokio::test]
    async fn test_static_runner() {
        let runner = StaticRunner::new().with("sinfo", "a|b").with("squeue", "1|p");
        assert_eq!(runner.run("sinfo -o x").await.unwrap(), "a|b");
        assert_eq!(runner.run("squeue").await.unwrap(), "1|p");
        assert_eq!(runner.run("scontrol show").await.unwrap(), "");
    }

    #[test]
    fn test_transport_from_config() {
        let mut cfg = KernelConfig::default();
        cfg.mock.enabled = true;
        assert!(matches!(Transport::from_config(&cfg), Ok(Transport::Fixture(_))));

        cfg.mock.enabled = false;
        cfg.ssh.host = None;
        assert!(Transport::from_config(&cfg).is_err());
        cfg.ssh.host = Some("hpc".into());
        assert!(matches!(Transport::from_config(&cfg), Ok(Transport::Ssh(_))));
    }
}
