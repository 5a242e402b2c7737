//! Transport sessions: shell command execution and file transfer against a
//! single remote host.
//!
//! `TransportChannel` is the seam the orchestrator drives; `SshSession` is
//! the production implementation over libssh2. A session is a scoped
//! acquisition: the underlying connection is closed when the session is
//! dropped, on every exit path. Commands are synchronous and the channel
//! is used strictly sequentially; no multiplexing.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use ssh2::Session;

use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::remote::retry::{diagnose_connection_error, retry_with_backoff, RetryConfig};

/// Full result of a remote command: separate streams, exit code and the
/// terminating signal if the process died abnormally.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub signal: Option<String>,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

/// Checks the wire-level success convention: commands that need a reliable
/// result append `; echo $?`, and success is detected as the last character
/// of the trimmed output being `'0'`. Output that legitimately ends in a
/// digit can defeat this check; kept verbatim for compatibility with
/// existing wrapper scripts.
pub fn output_indicates_success(output: &str) -> bool {
    output.trim_end().ends_with('0')
}

/// A sequential channel for executing commands and transferring files
/// against one host.
pub trait TransportChannel {
    /// Runs a command, returning its stdout and exit code.
    fn execute(&mut self, command: &str) -> Result<(String, i32)>;

    /// Runs a command, capturing both streams, the exit code and the
    /// terminating signal.
    fn execute_full(&mut self, command: &str) -> Result<CommandOutput>;

    /// Writes `content` to `path` on the remote host, overwriting.
    fn write_file(&mut self, path: &Path, content: &str) -> Result<()>;

    /// Uploads a local file to the remote path.
    fn upload(&mut self, local: &Path, remote: &Path) -> Result<()>;

    /// Recursively downloads a remote directory into a local directory.
    fn download_recursive(&mut self, remote_dir: &Path, local_dir: &Path) -> Result<()>;

    /// Whether a remote path exists.
    fn exists(&mut self, path: &Path) -> Result<bool>;

    /// Removes the given remote paths recursively.
    fn remove_recursive(&mut self, paths: &[PathBuf]) -> Result<()>;
}

/// SSH-backed transport session. Holds one authenticated ssh2 session; the
/// connection is torn down on drop.
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Establishes a session to the host, with retry and backoff around
    /// the connection attempt. Returns `Error::Connection` with a
    /// diagnosis when the host cannot be reached or authenticated.
    pub fn open(config: &HostConfig) -> Result<Self> {
        info!("Connecting to {}", config.connection_string());

        let label = format!("SSH connection to {}:{}", config.host, config.port);
        let result = retry_with_backoff(
            &RetryConfig::default(),
            || Self::connect_once(config),
            &label,
        );

        match result {
            Ok(session) => Ok(Self {
                session,
                host: config.host.clone(),
            }),
            Err(e) => Err(Error::Connection(diagnose_connection_error(
                &e,
                &config.host,
                config.port,
                config.ssh_key.as_deref(),
            ))),
        }
    }

    fn connect_once(config: &HostConfig) -> Result<Session> {
        use std::net::ToSocketAddrs;

        debug!("Attempting SSH connection to {}:{}", config.host, config.port);

        let addr_str = format!("{}:{}", config.host, config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| {
                Error::Connection(format!("Failed to resolve host '{}': {}", config.host, e))
            })?
            .next()
            .ok_or_else(|| {
                Error::Connection(format!("No addresses found for host '{}'", config.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(config.timeout))
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to connect to {}: {}", config.host, e),
                ))
            })?;
        tcp.set_read_timeout(Some(Duration::from_secs(config.timeout)))
            .map_err(Error::Io)?;
        tcp.set_write_timeout(Some(Duration::from_secs(config.timeout)))
            .map_err(Error::Io)?;

        let mut sess = Session::new()
            .map_err(|e| Error::Connection(format!("Failed to create SSH session: {}", e)))?;
        sess.set_tcp_stream(tcp);
        sess.handshake()
            .map_err(|e| Error::Connection(format!("SSH handshake failed: {}", e)))?;

        Self::authenticate(config, &mut sess)?;
        Ok(sess)
    }

    fn authenticate(config: &HostConfig, sess: &mut Session) -> Result<()> {
        debug!("Authenticating as user: {}", config.user);

        if let Some(key_path) = config.expanded_ssh_key() {
            match sess.userauth_pubkey_file(&config.user, None, &key_path, None) {
                Ok(_) => return Ok(()),
                Err(e) => debug!("Public key authentication failed: {}", e),
            }
        }

        match sess.userauth_agent(&config.user) {
            Ok(_) => return Ok(()),
            Err(e) => debug!("Agent authentication failed: {}", e),
        }

        Err(Error::Connection(format!(
            "SSH authentication failed for user {} on {} (tried: {}, agent)",
            config.user,
            config.host,
            config.ssh_key.as_deref().unwrap_or("no key specified")
        )))
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] executing: {}", self.host, command);

        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(Error::Io)?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(Error::Io)?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;
        let signal = channel
            .exit_signal()
            .ok()
            .and_then(|s| s.exit_signal)
            .filter(|s| !s.is_empty());

        debug!("[{}] exit code: {}", self.host, exit_code);
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
            signal,
        })
    }

    fn scp_write(&mut self, remote: &Path, bytes: &[u8]) -> Result<()> {
        let mut channel = self
            .session
            .scp_send(remote, 0o644, bytes.len() as u64, None)?;
        channel.write_all(bytes).map_err(Error::Io)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        Ok(())
    }

    fn download_dir(&mut self, remote_dir: &Path, local_dir: &Path) -> Result<()> {
        let sftp = self.session.sftp()?;
        std::fs::create_dir_all(local_dir).map_err(Error::Io)?;

        let mut pending = vec![(remote_dir.to_path_buf(), local_dir.to_path_buf())];
        while let Some((remote, local)) = pending.pop() {
            for (entry_path, stat) in sftp.readdir(&remote)? {
                let name = match entry_path.file_name() {
                    Some(n) => n.to_owned(),
                    None => continue,
                };
                let local_path = local.join(&name);
                if stat.is_dir() {
                    std::fs::create_dir_all(&local_path).map_err(Error::Io)?;
                    pending.push((entry_path, local_path));
                } else {
                    let mut remote_file = sftp.open(&entry_path)?;
                    let mut contents = Vec::new();
                    remote_file.read_to_end(&mut contents).map_err(Error::Io)?;
                    std::fs::write(&local_path, contents).map_err(Error::Io)?;
                }
            }
        }
        Ok(())
    }
}

impl TransportChannel for SshSession {
    fn execute(&mut self, command: &str) -> Result<(String, i32)> {
        let out = self.run(command)?;
        Ok((out.stdout, out.exit_code))
    }

    fn execute_full(&mut self, command: &str) -> Result<CommandOutput> {
        self.run(command)
    }

    fn write_file(&mut self, path: &Path, content: &str) -> Result<()> {
        debug!("[{}] writing {} bytes to {}", self.host, content.len(), path.display());
        self.scp_write(path, content.as_bytes())
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<()> {
        debug!("[{}] uploading {} -> {}", self.host, local.display(), remote.display());
        let bytes = std::fs::read(local).map_err(Error::Io)?;
        self.scp_write(remote, &bytes)
    }

    fn download_recursive(&mut self, remote_dir: &Path, local_dir: &Path) -> Result<()> {
        debug!(
            "[{}] downloading {} -> {}",
            self.host,
            remote_dir.display(),
            local_dir.display()
        );
        self.download_dir(remote_dir, local_dir)
    }

    fn exists(&mut self, path: &Path) -> Result<bool> {
        let sftp = self.session.sftp()?;
        Ok(sftp.stat(path).is_ok())
    }

    fn remove_recursive(&mut self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let joined = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        let (out, _) = self.execute(&format!("rm -rf {}; echo $?", joined))?;
        if !output_indicates_success(&out) {
            return Err(Error::RemoteOperation(format!(
                "rm -rf failed for [{}]: {}",
                joined,
                out.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        // Best-effort orderly shutdown; the TCP stream closes regardless.
        let _ = self.session.disconnect(None, "closing session", None);
        debug!("[{}] session closed", self.host);
    }
}
