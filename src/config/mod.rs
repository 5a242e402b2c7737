//! Configuration management for simq.
//!
//! This module handles loading and saving configuration for remote hosts:
//! SSH connection settings, scheduler selection, and default scheduler
//! parameters that are snapshotted into jobs at submission time.
//!
//! # Configuration File Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/simq/config.yml`
//! - macOS: `~/Library/Application Support/simq/config.yml`
//!
//! # Example Configuration
//!
//! ```yaml
//! hosts:
//!   cluster-a:
//!     host: "cluster-a.example.com"
//!     user: "simuser"
//!     port: 22
//!     ssh_key: "~/.ssh/id_rsa"
//!     scheduler: pbs
//!     work_base_dir: "/work/simuser/simq"
//!     default_host_parameters:
//!       queue: "batch"
//!       walltime: "24:00:00"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::remote::scheduler::SchedulerKind;

/// Default SSH port
const DEFAULT_SSH_PORT: u16 = 22;

/// Default remote base directory for job work directories
const DEFAULT_WORK_BASE_DIR: &str = "simq_work";

/// Default SSH connection timeout in seconds
const DEFAULT_TIMEOUT: u64 = 60;

/// Main configuration structure for simq.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote execution hosts, keyed by a user-chosen name
    #[serde(default)]
    pub hosts: HashMap<String, HostConfig>,
}

/// Configuration for a remote execution host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// User-visible name of this host entry
    #[serde(default)]
    pub name: String,

    /// Hostname or IP address of the remote machine
    pub host: String,

    /// SSH username for authentication
    pub user: String,

    /// SSH port (default: 22)
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Path to SSH private key file (optional, falls back to agent auth)
    pub ssh_key: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Batch scheduler family running on this host
    #[serde(default)]
    pub scheduler: SchedulerKind,

    /// Base directory on the remote host under which job work
    /// directories are created
    #[serde(default = "default_work_base_dir")]
    pub work_base_dir: String,

    /// Local mount point of `work_base_dir`, when the remote work area is
    /// also visible on the local filesystem (e.g. NFS). Input files are
    /// staged with a plain copy instead of an upload when set.
    pub mounted_work_base_dir: Option<String>,

    /// Scheduler directives applied to jobs that carry none of their own.
    /// Snapshotted into the job record when it is bound to this host.
    #[serde(default)]
    pub default_host_parameters: HashMap<String, String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_work_base_dir() -> String {
    DEFAULT_WORK_BASE_DIR.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

impl Config {
    /// Returns the default configuration file path for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("simq").join("config.yml"))
    }

    /// Loads configuration from the default location.
    ///
    /// Returns `Ok(Config::default())` if no config file exists.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Loads configuration from a specific file path.
    ///
    /// Returns `Ok(Config::default())` if the file doesn't exist.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file {}: {}", path.display(), e),
            ))
        })?;

        let mut config: Config = serde_yaml::from_str(&contents).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Host entries carry their map key as the display name.
        for (name, host) in config.hosts.iter_mut() {
            if host.name.is_empty() {
                host.name = name.clone();
            }
        }

        Ok(config)
    }

    /// Saves configuration to the default location.
    pub fn save(&self) -> Result<()> {
        match Self::default_path() {
            Some(path) => self.save_to(&path),
            None => Err(Error::Config(
                "Could not determine config directory".to_string(),
            )),
        }
    }

    /// Saves configuration to a specific file path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::Io)?;
        }

        let contents = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents).map_err(Error::Io)?;
        Ok(())
    }

    /// Gets a host configuration by name.
    pub fn get_host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.get(name)
    }

    /// Adds or updates a host configuration.
    pub fn set_host(&mut self, name: String, mut config: HostConfig) {
        if config.name.is_empty() {
            config.name = name.clone();
        }
        self.hosts.insert(name, config);
    }

    /// Removes a host configuration.
    pub fn remove_host(&mut self, name: &str) -> Option<HostConfig> {
        self.hosts.remove(name)
    }

    /// Lists all configured host names.
    pub fn host_names(&self) -> Vec<&String> {
        self.hosts.keys().collect()
    }
}

impl HostConfig {
    /// Creates a new host configuration with required fields.
    pub fn new(host: String, user: String) -> Self {
        Self {
            name: host.clone(),
            host,
            user,
            port: DEFAULT_SSH_PORT,
            ssh_key: None,
            timeout: DEFAULT_TIMEOUT,
            scheduler: SchedulerKind::default(),
            work_base_dir: DEFAULT_WORK_BASE_DIR.to_string(),
            mounted_work_base_dir: None,
            default_host_parameters: HashMap::new(),
        }
    }

    /// Builder method to set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the SSH key path.
    pub fn with_ssh_key(mut self, key_path: String) -> Self {
        self.ssh_key = Some(key_path);
        self
    }

    /// Builder method to set the scheduler family.
    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Builder method to set the remote work base directory.
    pub fn with_work_base_dir(mut self, dir: String) -> Self {
        self.work_base_dir = dir;
        self
    }

    /// Builder method to set the locally mounted work base directory.
    pub fn with_mounted_work_base_dir(mut self, dir: String) -> Self {
        self.mounted_work_base_dir = Some(dir);
        self
    }

    /// Builder method to set the default scheduler parameters.
    pub fn with_default_host_parameters(mut self, params: HashMap<String, String>) -> Self {
        self.default_host_parameters = params;
        self
    }

    /// Returns the SSH connection string (user@host:port).
    pub fn connection_string(&self) -> String {
        if self.port == DEFAULT_SSH_PORT {
            format!("{}@{}", self.user, self.host)
        } else {
            format!("{}@{}:{}", self.user, self.host, self.port)
        }
    }

    /// Expands the SSH key path, replacing ~ with the home directory.
    pub fn expanded_ssh_key(&self) -> Option<PathBuf> {
        self.ssh_key.as_ref().map(|key| {
            if let Some(stripped) = key.strip_prefix("~/") {
                if let Some(home) = dirs::home_dir() {
                    return home.join(stripped);
                }
            }
            PathBuf::from(key)
        })
    }
}
