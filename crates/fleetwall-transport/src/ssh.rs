// ── Blocking SSH transport ──
//
// One `SshSession` wraps one authenticated libssh2 session. Every command
// opens a fresh channel on it, so the session itself is reusable across
// commands for as long as the TCP connection lives.
//
// All calls block. Callers run them on a blocking worker thread.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use secrecy::{ExposeSecret, SecretString};
use ssh2::Session;
use tracing::debug;

use crate::error::Error;
use crate::transport::{TransportConfig, SSH_PORT};

/// Output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Remote exit status. Network OS shells often report none.
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    /// Build a successful output carrying only stdout text.
    pub fn text(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_status: Some(0),
        }
    }

    /// A missing exit status counts as success.
    pub fn success(&self) -> bool {
        self.exit_status.is_none_or(|code| code == 0)
    }
}

/// Where and as whom to open an SSH session.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SshTarget {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port: SSH_PORT,
            username: username.into(),
            password,
        }
    }

    /// `host:port` label used in logs and errors.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Seams ───────────────────────────────────────────────────────────

/// A live, authenticated remote shell.
pub trait CliSession: Send {
    /// Run one command and collect its output.
    ///
    /// Multi-line input is written to an interactive shell channel line by
    /// line instead of a single exec request.
    fn exec(&mut self, command: &str) -> Result<CommandOutput, Error>;

    /// Tear the session down. Safe to call more than once.
    fn close(&mut self);
}

/// Opens new sessions. The session pool owns one of these.
pub trait CliConnector: Send + Sync {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn CliSession>, Error>;
}

// ── libssh2 implementation ──────────────────────────────────────────

/// Connector backed by `ssh2` with password authentication.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    config: TransportConfig,
}

impl SshConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl CliConnector for SshConnector {
    fn connect(&self, target: &SshTarget) -> Result<Box<dyn CliSession>, Error> {
        let addr_label = target.addr();
        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|source| Error::Connect {
                addr: addr_label.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| Error::Resolve {
                host: target.host.clone(),
            })?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout).map_err(
            |source| Error::Connect {
                addr: addr_label.clone(),
                source,
            },
        )?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.config.io_timeout_ms());
        session.handshake()?;

        session
            .userauth_password(&target.username, target.password.expose_secret())
            .map_err(|e| Error::Authentication {
                user: target.username.clone(),
                message: e.message().to_owned(),
            })?;
        if !session.authenticated() {
            return Err(Error::Authentication {
                user: target.username.clone(),
                message: "server did not accept the password".into(),
            });
        }

        debug!(addr = %addr_label, user = %target.username, "ssh session established");
        Ok(Box::new(SshSession {
            session: Some(session),
            addr: addr_label,
        }))
    }
}

/// One authenticated libssh2 session.
pub struct SshSession {
    session: Option<Session>,
    addr: String,
}

impl SshSession {
    fn live(&self) -> Result<&Session, Error> {
        self.session.as_ref().ok_or(Error::SessionClosed)
    }

    fn exec_single(&self, command: &str) -> Result<CommandOutput, Error> {
        let mut channel = self.live()?.channel_session()?;
        channel.exec(command)?;

        let mut stdout = Vec::new();
        channel.read_to_end(&mut stdout)?;
        let mut stderr = Vec::new();
        channel.stderr().read_to_end(&mut stderr)?;
        channel.wait_close()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status: channel.exit_status().ok(),
        })
    }

    fn exec_script(&self, script: &str) -> Result<CommandOutput, Error> {
        let mut channel = self.live()?.channel_session()?;
        channel.request_pty("vt100", None, None)?;
        channel.shell()?;
        for line in script.lines() {
            channel.write_all(line.as_bytes())?;
            channel.write_all(b"\n")?;
        }
        channel.write_all(b"exit\n")?;
        channel.flush()?;
        channel.send_eof()?;

        let mut stdout = Vec::new();
        channel.read_to_end(&mut stdout)?;
        channel.wait_close()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::new(),
            exit_status: channel.exit_status().ok(),
        })
    }
}

impl CliSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, Error> {
        debug!(addr = %self.addr, command, "exec");
        if command.contains('\n') {
            self.exec_script(command)
        } else {
            self.exec_single(command)
        }
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "fleetwall closing session", None) {
                debug!(addr = %self.addr, error = %e, "ssh disconnect failed (ignored)");
            }
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.close();
    }
}
