//! The `ConfContext` holds the state shared by every caller of the crate:
//! configuration, the domain cache and the repository writing through it.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dns::conf_store::ConfStore;
use crate::dns::corefile::{CorefileGenerator, DEFAULT_FORWARD};
use crate::dns::errors::{ConfError, Result};
use crate::dns::filesystem::Filesystem;
use crate::dns::repository::ConfRepository;

/// Whether domains must carry a tenant ACL
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantMode {
    /// Every domain needs at least one tenant
    Scoped,
    /// Tenants are optional, as in deployments predating tenant support
    Legacy,
}

impl Default for TenantMode {
    fn default() -> Self {
        TenantMode::Scoped
    }
}

impl fmt::Display for TenantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantMode::Scoped => write!(f, "scoped"),
            TenantMode::Legacy => write!(f, "legacy"),
        }
    }
}

impl FromStr for TenantMode {
    type Err = ConfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scoped" => Ok(TenantMode::Scoped),
            "legacy" => Ok(TenantMode::Legacy),
            other => Err(ConfError::Config(format!("unknown tenant mode: {}", other))),
        }
    }
}

/// Runtime configuration.
///
/// Values come from the defaults, then an optional TOML file, then the
/// environment, each layer overriding the previous one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfConfig {
    /// Directory holding one zone file per domain
    pub hosts_dir: PathBuf,
    /// Location of the generated Corefile
    pub conf_path: PathBuf,
    /// Upstream resolver for the catch-all block
    pub forward: String,
    pub tenant_mode: TenantMode,
    /// Abort startup on a malformed zone file instead of skipping it
    pub strict_load: bool,
    pub log_level: String,
}

impl Default for ConfConfig {
    fn default() -> Self {
        ConfConfig {
            hosts_dir: PathBuf::from("hosts"),
            conf_path: PathBuf::from("Corefile"),
            forward: DEFAULT_FORWARD.to_string(),
            tenant_mode: TenantMode::default(),
            strict_load: true,
            log_level: "info".to_string(),
        }
    }
}

impl ConfConfig {
    /// Read a TOML file. Keys missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<ConfConfig> {
        let content = fs::read_to_string(path)?;
        ConfConfig::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<ConfConfig> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `HOSTS_DIR`, `CONF_PATH`, `FORWARD`,
    /// `TENANT_MODE`, `STRICT_LOAD` and `LOG_LEVEL`
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| env::var(key).ok())
    }

    /// Same as [`ConfConfig::apply_env`] with a custom variable lookup
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hosts_dir) = lookup("HOSTS_DIR") {
            self.hosts_dir = PathBuf::from(hosts_dir);
        }
        if let Some(conf_path) = lookup("CONF_PATH") {
            self.conf_path = PathBuf::from(conf_path);
        }
        if let Some(forward) = lookup("FORWARD") {
            self.forward = forward;
        }
        if let Some(mode) = lookup("TENANT_MODE") {
            self.tenant_mode = mode.parse()?;
        }
        if let Some(strict) = lookup("STRICT_LOAD") {
            self.strict_load = parse_bool("STRICT_LOAD", &strict)?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.forward.trim().is_empty() {
            return Err(ConfError::Config("forward must not be empty".to_string()));
        }
        if self.conf_path.as_os_str().is_empty() {
            return Err(ConfError::Config("conf_path must not be empty".to_string()));
        }

        // The Corefile would otherwise be loaded back as a zone file
        let conf_dir = self.conf_path.parent().unwrap_or_else(|| Path::new(""));
        if same_directory(conf_dir, &self.hosts_dir) {
            return Err(ConfError::Config(format!(
                "conf_path {} must not live inside hosts_dir",
                self.conf_path.display()
            )));
        }

        Ok(())
    }
}

/// Directories that exist are compared after resolving links, anything
/// else after lexical normalization against the working directory
fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(or_current(a)), fs::canonicalize(or_current(b))) {
        (Ok(a), Ok(b)) => a == b,
        _ => normalize(a) == normalize(b),
    }
}

fn or_current(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    }
}

/// Drop `.` components and fold `dir/..` pairs
fn normalize(path: &Path) -> PathBuf {
    let absolute = match env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfError::Config(format!("{}: not a boolean: {}", key, other))),
    }
}

/// Composition root. Owns the cache and the repository built on top of it;
/// several contexts may live side by side.
pub struct ConfContext {
    config: ConfConfig,
    store: Arc<ConfStore>,
    repository: ConfRepository,
}

impl ConfContext {
    /// Validate `config`, load every zone file from the hosts directory and
    /// wire up the repository
    pub fn new(config: ConfConfig, filesystem: Arc<dyn Filesystem>) -> Result<ConfContext> {
        config.validate()?;
        filesystem.create_dir_all(&config.hosts_dir)?;

        let domains =
            ConfRepository::load_domains(filesystem.as_ref(), &config.hosts_dir, config.strict_load)?;
        log::info!(
            "Loaded {} domains from {}",
            domains.len(),
            config.hosts_dir.display()
        );

        let generator = CorefileGenerator::new(&config.hosts_dir, &config.forward)?;
        let store = Arc::new(ConfStore::with_domains(domains, generator, &config.conf_path));
        let repository = ConfRepository::new(store.clone(), filesystem, config.tenant_mode);

        Ok(ConfContext {
            config,
            store,
            repository,
        })
    }

    pub fn config(&self) -> &ConfConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ConfStore> {
        &self.store
    }

    pub fn repository(&self) -> &ConfRepository {
        &self.repository
    }
}
