//! CLI command for managing simq configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{Config, HostConfig};
use crate::remote::SchedulerKind;

#[derive(Args)]
#[command(about = "Manage simq configuration")]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show the configuration file path
    Path,

    /// List all configured hosts
    ListHosts,

    /// Add a new host configuration
    AddHost {
        /// Name for the host (e.g., "cluster-a")
        name: String,

        /// Hostname or IP address
        #[arg(long)]
        host: String,

        /// SSH username
        #[arg(long)]
        user: String,

        /// SSH port (default: 22)
        #[arg(long, default_value = "22")]
        port: u16,

        /// Path to SSH private key
        #[arg(long)]
        ssh_key: Option<String>,

        /// Scheduler family: forked, pbs, sge or slurm
        #[arg(long, default_value = "forked")]
        scheduler: String,

        /// Remote base directory for job work directories
        #[arg(long, default_value = "simq_work")]
        work_base_dir: String,

        /// Local mount point of the work base directory, if any
        #[arg(long)]
        mounted_work_base_dir: Option<String>,

        /// Connection timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Remove a host configuration
    RemoveHost {
        /// Name of the host to remove
        name: String,
    },

    /// Initialize a new configuration file with an example host
    Init {
        /// Overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show details of a specific host
    ShowHost {
        /// Name of the host to show
        name: String,
    },
}

impl ConfigCommand {
    pub fn execute(&self) -> Result<()> {
        match &self.action {
            ConfigAction::Show => self.show_config(),
            ConfigAction::Path => self.show_path(),
            ConfigAction::ListHosts => self.list_hosts(),
            ConfigAction::AddHost {
                name,
                host,
                user,
                port,
                ssh_key,
                scheduler,
                work_base_dir,
                mounted_work_base_dir,
                timeout,
            } => self.add_host(
                name,
                host,
                user,
                *port,
                ssh_key.clone(),
                scheduler,
                work_base_dir,
                mounted_work_base_dir.clone(),
                *timeout,
            ),
            ConfigAction::RemoveHost { name } => self.remove_host(name),
            ConfigAction::Init { force } => self.init_config(*force),
            ConfigAction::ShowHost { name } => self.show_host(name),
        }
    }

    fn show_config(&self) -> Result<()> {
        let config = Config::load()?;

        if config.hosts.is_empty() {
            println!("No configuration file found or no hosts configured.");
            println!();
            println!("Add a host with:");
            println!("  simq config add-host my-cluster --host example.com --user myuser");
            return Ok(());
        }

        let yaml = serde_yaml::to_string(&config)?;
        println!("{}", yaml);

        Ok(())
    }

    fn show_path(&self) -> Result<()> {
        match Config::default_path() {
            Some(path) => {
                println!("Configuration file path: {}", path.display());
                if path.exists() {
                    println!("Status: File exists");
                } else {
                    println!("Status: File does not exist");
                }
            }
            None => {
                println!("Could not determine configuration directory");
            }
        }

        Ok(())
    }

    fn list_hosts(&self) -> Result<()> {
        let config = Config::load()?;

        if config.hosts.is_empty() {
            println!("No hosts configured.");
            return Ok(());
        }

        println!("Configured hosts:");
        println!();

        for (name, host) in &config.hosts {
            println!(
                "  {} - {}@{}:{} (scheduler: {:?})",
                name, host.user, host.host, host.port, host.scheduler
            );
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_host(
        &self,
        name: &str,
        host: &str,
        user: &str,
        port: u16,
        ssh_key: Option<String>,
        scheduler: &str,
        work_base_dir: &str,
        mounted_work_base_dir: Option<String>,
        timeout: u64,
    ) -> Result<()> {
        let scheduler = parse_scheduler(scheduler)?;

        let mut config = Config::load()?;
        if config.get_host(name).is_some() {
            println!("Warning: Host '{}' already exists, updating...", name);
        }

        let mut entry = HostConfig::new(host.to_string(), user.to_string())
            .with_port(port)
            .with_scheduler(scheduler)
            .with_work_base_dir(work_base_dir.to_string());
        entry.timeout = timeout;

        if let Some(key) = ssh_key {
            entry = entry.with_ssh_key(key);
        }
        if let Some(mounted) = mounted_work_base_dir {
            entry = entry.with_mounted_work_base_dir(mounted);
        }

        config.set_host(name.to_string(), entry);
        config.save()?;

        println!("Added host '{}'", name);
        if let Some(path) = Config::default_path() {
            println!("Configuration saved to: {}", path.display());
        }

        Ok(())
    }

    fn remove_host(&self, name: &str) -> Result<()> {
        let mut config = Config::load()?;

        if config.remove_host(name).is_some() {
            config.save()?;
            println!("Removed host '{}'", name);
        } else {
            println!("Host '{}' not found", name);
        }

        Ok(())
    }

    fn init_config(&self, force: bool) -> Result<()> {
        let path = Config::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine configuration directory"))?;

        if path.exists() && !force {
            println!("Configuration file already exists at: {}", path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        let mut config = Config::default();
        let mut defaults = std::collections::HashMap::new();
        defaults.insert("queue".to_string(), "batch".to_string());
        defaults.insert("walltime".to_string(), "24:00:00".to_string());

        config.set_host(
            "cluster-a".to_string(),
            HostConfig::new("cluster-a.example.com".to_string(), "simuser".to_string())
                .with_ssh_key("~/.ssh/id_rsa".to_string())
                .with_scheduler(SchedulerKind::Pbs)
                .with_work_base_dir("/work/simuser/simq".to_string())
                .with_default_host_parameters(defaults),
        );

        config.save()?;

        println!("Created configuration file at: {}", path.display());
        println!();
        println!("An example host has been added. Edit it for your actual cluster:");
        println!("  simq config show");
        println!();
        println!("Or add hosts via CLI:");
        println!("  simq config add-host my-cluster --host example.com --user myuser");

        Ok(())
    }

    fn show_host(&self, name: &str) -> Result<()> {
        let config = Config::load()?;

        match config.get_host(name) {
            Some(host) => {
                println!("Host: {}", name);
                println!("  Address: {}", host.host);
                println!("  User: {}", host.user);
                println!("  Port: {}", host.port);
                println!(
                    "  SSH key: {}",
                    host.ssh_key.as_deref().unwrap_or("(agent)")
                );
                println!("  Scheduler: {:?}", host.scheduler);
                println!("  Work base dir: {}", host.work_base_dir);
                println!(
                    "  Mounted work base dir: {}",
                    host.mounted_work_base_dir.as_deref().unwrap_or("(none)")
                );
                println!("  Timeout: {}s", host.timeout);
                if !host.default_host_parameters.is_empty() {
                    println!("  Default host parameters:");
                    for (key, value) in &host.default_host_parameters {
                        println!("    {}: {}", key, value);
                    }
                }
                println!();
                println!("Connection string: {}", host.connection_string());
            }
            None => {
                println!("Host '{}' not found", name);
            }
        }

        Ok(())
    }
}

fn parse_scheduler(name: &str) -> Result<SchedulerKind> {
    match name.to_lowercase().as_str() {
        "forked" | "none" => Ok(SchedulerKind::Forked),
        "pbs" | "torque" => Ok(SchedulerKind::Pbs),
        "sge" => Ok(SchedulerKind::Sge),
        "slurm" => Ok(SchedulerKind::Slurm),
        other => Err(anyhow::anyhow!(
            "unknown scheduler '{}' (expected forked, pbs, sge or slurm)",
            other
        )),
    }
}
