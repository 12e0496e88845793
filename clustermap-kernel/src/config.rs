use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub const DEFAULT_NODES_COMMAND: &str = r#"sinfo -o "%P|%N|%T|%C|%m|%G""#;
pub const DEFAULT_JOBS_COMMAND: &str = r#"squeue -o "%i|%P|%j|%u|%t|%M|%D|%R|%C|%m|%b""#;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub poll_seconds: u64,
    pub mock: MockConf,
    pub ssh: SshConf,
    pub commands: CommandsConf,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MockConf {
    pub enabled: bool,
    pub data_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SshConf {
    pub host: Option<String>,
    pub user: Option<String>,
    pub key_path: Option<PathBuf>,
    pub command: String,          // client ssh + options, ex: "ssh -o BatchMode=yes"
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CommandsConf {
    pub nodes: String,
    pub jobs: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            poll_seconds: 12,
            mock: MockConf::default(),
            ssh: SshConf::default(),
            commands: CommandsConf::default(),
            api_key: None,
        }
    }
}

impl Default for MockConf {
    fn default() -> Self {
        Self { enabled: false, data_dir: PathBuf::from("./sample_data") }
    }
}

impl Default for SshConf {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            key_path: None,
            command: "ssh -o BatchMode=yes -o ConnectTimeout=20".into(),
            timeout_seconds: 25,
        }
    }
}

impl Default for CommandsConf {
    fn default() -> Self {
        Self { nodes: DEFAULT_NODES_COMMAND.into(), jobs: DEFAULT_JOBS_COMMAND.into() }
    }
}

impl KernelConfig {
    /// Surcharges par variables d'environnement (mêmes noms que le déploiement historique).
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("HPC_HOST") { self.ssh.host = Some(v); }
        if let Some(v) = var("HPC_USER") { self.ssh.user = Some(v); }
        if let Some(v) = var("SSH_KEY_PATH") { self.ssh.key_path = Some(PathBuf::from(v)); }
        if let Some(v) = var("POLL_SECONDS") {
            match v.trim().parse::<u64>() {
                Ok(secs) => self.poll_seconds = secs,
                Err(_) => warn!("ignoring invalid POLL_SECONDS={v:?}"),
            }
        }
        if let Some(v) = var("MOCK_MODE") { self.mock.enabled = v.trim().eq_ignore_ascii_case("true"); }
        if let Some(v) = var("MOCK_DATA_DIR") { self.mock.data_dir = PathBuf::from(v); }
        if let Some(v) = var("CLUSTERMAP_LISTEN") { self.listen = v; }
        if let Some(v) = var("CLUSTERMAP_API_KEY") {
            self.api_key = Some(v).filter(|k| !k.is_empty());
        }
        // un intervalle nul ferait tourner le poller en boucle serrée
        if self.poll_seconds == 0 {
            warn!("poll_seconds=0 is not allowed, using 1");
            self.poll_seconds = 1;
        }
    }
}

async fn read_config_file(path: &Path) -> KernelConfig {
    if !path.exists() {
        warn!("no {} found, using default config", path.display());
        return KernelConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("cannot read config {}: {e}, using defaults", path.display());
            return KernelConfig::default();
        }
    };
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("invalid config {}: {e}", path.display());
        KernelConfig::default()
    })
}

/// Charge `clustermap.yaml` (ou `$CLUSTERMAP_CONFIG`) puis applique l'environnement.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("CLUSTERMAP_CONFIG").unwrap_or_else(|_| "clustermap.yaml".into());
    let mut cfg = read_config_file(Path::new(&path)).await;
    cfg.apply_env(|k| std::env::var(k).ok());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.poll_seconds, 12);
        assert!(!cfg.mock.enabled);
        assert_eq!(cfg.mock.data_dir, PathBuf::from("./sample_data"));
        assert_eq!(cfg.commands.nodes, DEFAULT_NODES_COMMAND);
        assert_eq!(cfg.ssh.timeout_seconds, 25);
    }

    #[test]
    fn test_partial_yaml() {
        let cfg: KernelConfig = serde_yaml::from_str(
            "poll_seconds: 30\nssh:\n  host: login.hpc\n  user: bob\nmock:\n  enabled: true\n",
        )
        .unwrap();
        assert_eq!(cfg.poll_seconds, 30);
        assert_eq!(cfg.ssh.host.as_deref(), Some("login.hpc"));
        assert_eq!(cfg.ssh.timeout_seconds, 25);
        assert!(cfg.mock.enabled);
        assert_eq!(cfg.commands.jobs, DEFAULT_JOBS_COMMAND);
        assert_eq!(cfg.listen, "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HPC_HOST", "hpc.example"),
            ("HPC_USER", "carol"),
            ("SSH_KEY_PATH", "/keys/id"),
            ("POLL_SECONDS", "5"),
            ("MOCK_MODE", "TRUE"),
            ("MOCK_DATA_DIR", "/fixtures"),
            ("CLUSTERMAP_API_KEY", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut cfg = KernelConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.ssh.host.as_deref(), Some("hpc.example"));
        assert_eq!(cfg.ssh.user.as_deref(), Some("carol"));
        assert_eq!(cfg.ssh.key_path, Some(PathBuf::from("/keys/id")));
        assert_eq!(cfg.poll_seconds, 5);
        assert!(cfg.mock.enabled);
        assert_eq!(cfg.mock.data_dir, PathBuf::from("/fixtures"));
        assert_eq!(cfg.api_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_bad_env_values_ignored() {
        let mut cfg = KernelConfig::default();
        cfg.apply_env(|k| match k {
            "POLL_SECONDS" => Some("soon".into()),
            "MOCK_MODE" => Some("yes".into()),
            "CLUSTERMAP_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.poll_seconds, 12);
        assert!(!cfg.mock.enabled);
        assert_eq!(cfg.api_key, None);

        cfg.apply_env(|k| (k == "POLL_SECONDS").then(|| "0".to_string()));
        assert_eq!(cfg.poll_seconds, 1);
    }

    #[tokio::test]
    async fn test_missing_or_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = read_config_file(&dir.path().join("nope.yaml")).await;
        assert_eq!(missing, KernelConfig::default());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "poll_seconds: [not, a, number]").unwrap();
        assert_eq!(read_config_file(&bad).await, KernelConfig::default());
    }

    #[tokio::test]
    async fn test_unreadable_file_falls_back() {
        // un répertoire existe mais ne se lit pas comme un fichier
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_config_file(dir.path()).await, KernelConfig::default());
    }
}
