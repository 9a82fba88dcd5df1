//! Server configuration: TOML file + CLI overrides.

use relay_core::{Identity, RelayError, RelayResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub directory: DirectorySection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_admin")]
    pub admin_identity: String,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            admin_identity: default_admin(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// `[directory]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySection {
    /// Registered identities listed inline.
    #[serde(default)]
    pub identities: Vec<String>,
    /// File with one registered identity per line.
    #[serde(default)]
    pub roster_file: Option<String>,
    /// Refuse announcements for identities the directory doesn't know.
    #[serde(default)]
    pub enforce: bool,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_admin() -> String {
    "admin".to_string()
}
fn default_outbound_queue() -> usize {
    64
}

/// CLI values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub admin_identity: Option<String>,
    pub roster_file: Option<String>,
    pub enforce_directory: bool,
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub admin_identity: Identity,
    pub outbound_queue: usize,
    pub directory_identities: Vec<Identity>,
    pub roster_file: Option<PathBuf>,
    pub enforce_directory: bool,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, overrides)
    }

    fn resolve(file: ConfigFile, cli: Overrides) -> RelayResult<Self> {
        let admin_str = cli.admin_identity.unwrap_or(file.server.admin_identity);
        let admin_identity = Identity::new(admin_str)
            .map_err(|e| RelayError::Config(format!("admin_identity: {e}")))?;

        if file.server.outbound_queue == 0 {
            return Err(RelayError::Config("outbound_queue must be at least 1".into()));
        }

        let directory_identities = file
            .directory
            .identities
            .into_iter()
            .map(|s| {
                Identity::new(s).map_err(|e| RelayError::Config(format!("directory.identities: {e}")))
            })
            .collect::<RelayResult<Vec<_>>>()?;

        let roster_file = cli
            .roster_file
            .or(file.directory.roster_file)
            .map(|s| expand_tilde_str(&s));

        Ok(Self {
            bind: cli.bind.unwrap_or(file.server.bind),
            port: cli.port.unwrap_or(file.server.port),
            admin_identity,
            outbound_queue: file.server.outbound_queue,
            directory_identities,
            roster_file,
            enforce_directory: cli.enforce_directory || file.directory.enforce,
        })
    }

    /// `bind:port` as a socket address.
    pub fn listen_addr(&self) -> RelayResult<std::net::SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid listen address: {e}")))
    }
}

fn parse(content: &str) -> RelayResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| RelayError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), Overrides::default()).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.admin_identity.as_str(), "admin");
        assert_eq!(cfg.outbound_queue, 64);
        assert!(!cfg.enforce_directory);
        assert!(cfg.directory_identities.is_empty());
    }

    #[test]
    fn file_values() {
        let file = parse(
            r#"
            [server]
            port = 9000
            admin_identity = "vishal"

            [directory]
            identities = ["alice", "bob"]
            enforce = true
            "#,
        )
        .unwrap();
        let cfg = ServerConfig::resolve(file, Overrides::default()).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.admin_identity.as_str(), "vishal");
        assert_eq!(cfg.directory_identities.len(), 2);
        assert!(cfg.enforce_directory);
    }

    #[test]
    fn cli_overrides_file() {
        let file = parse("[server]\nport = 9000\nadmin_identity = \"vishal\"\n").unwrap();
        let cli = Overrides {
            port: Some(4000),
            admin_identity: Some("root".into()),
            ..Default::default()
        };
        let cfg = ServerConfig::resolve(file, cli).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.admin_identity.as_str(), "root");
    }

    #[test]
    fn empty_admin_rejected() {
        let file = parse("[server]\nadmin_identity = \"\"\n").unwrap();
        let err = ServerConfig::resolve(file, Overrides::default()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn zero_queue_rejected() {
        let file = parse("[server]\noutbound_queue = 0\n").unwrap();
        assert!(ServerConfig::resolve(file, Overrides::default()).is_err());
    }

    #[test]
    fn listen_addr_parses() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), Overrides::default()).unwrap();
        assert_eq!(cfg.listen_addr().unwrap().port(), 3001);
    }
}
