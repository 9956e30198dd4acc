//! SSH transport.
//!
//! Tasks reach hosts only through the `Transport` trait (`run`, `sudo`,
//! `put`, `get`). `SshTransport` implements it over an openssh multiplexed
//! session; tests substitute their own. Connections are opened by a
//! `Connector` and kept in a per-context `ConnectionCache`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use colored::{ColoredString, Colorize};
use colourado::{Color, ColorPalette, PaletteType};
use futures::future::join;
use openssh::{KnownHosts, Session as SSHSession, SessionBuilder, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{AdminError, Result};
use crate::host::Host;

/// Exit code `download` uses to signal a missing remote file.
const MISSING_FILE_CODE: i32 = 66;

/// What a remote command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code; `None` when the command was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a failed command into `AdminError::CommandFailed`.
    pub fn check(self, host: &str, command: &str) -> Result<Output> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(AdminError::CommandFailed {
                host: host.to_string(),
                command: command.to_string(),
                code: self.code.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Remote execution primitives for one host.
///
/// Any failure of the connection itself must come back as
/// `AdminError::Network`; a command that ran and failed is an `Output`
/// with a non-zero code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, command: &str) -> Result<Output>;

    async fn sudo(&self, command: &str) -> Result<Output>;

    /// Writes `contents` to the remote `path`, as root when `use_sudo`.
    async fn upload(&self, contents: &[u8], path: &str, use_sudo: bool) -> Result<()>;

    /// Reads the remote `path`; `None` when the file doesn't exist.
    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, local: &Path, remote: &str, use_sudo: bool) -> Result<()> {
        let contents = tokio::fs::read(local).await?;
        self.upload(&contents, remote, use_sudo).await
    }

    /// Copies the remote file to `local`. Returns false if it didn't exist.
    async fn get(&self, remote: &str, local: &Path) -> Result<bool> {
        match self.download(remote).await? {
            Some(contents) => {
                if let Some(parent) = local.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(local, contents).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) {}
}

/// Quotes `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Connection parameters for the host currently being acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Host string the connection is keyed by.
    pub host_string: String,
    pub hostname: String,
    pub user: String,
    pub port: u16,
}

impl ConnectionSettings {
    /// Resolves a host against the run's defaults.
    pub fn for_host(host: &Host, settings: &Settings) -> Self {
        Self {
            host_string: host.key(),
            hostname: host.hostname.clone(),
            user: host.user.clone().unwrap_or_else(|| settings.user.clone()),
            port: host.port.unwrap_or(settings.port),
        }
    }

    /// Settings outside any host scope.
    pub fn unbound(settings: &Settings) -> Self {
        Self {
            host_string: String::new(),
            hostname: String::new(),
            user: settings.user.clone(),
            port: settings.port,
        }
    }
}

/// Opens transports to hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectionSettings) -> Result<Arc<dyn Transport>>;
}

/// Open transports of one execution context, keyed by host string.
#[derive(Default)]
pub struct ConnectionCache {
    connections: HashMap<String, Arc<dyn Transport>>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_connect(
        &mut self,
        connector: &dyn Connector,
        target: &ConnectionSettings,
    ) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = self.connections.get(&target.host_string) {
            return Ok(Arc::clone(transport));
        }
        let transport = connector.connect(target).await?;
        self.connections
            .insert(target.host_string.clone(), Arc::clone(&transport));
        Ok(transport)
    }

    pub async fn disconnect(&mut self, host_string: &str) {
        if let Some(transport) = self.connections.remove(host_string) {
            debug!(host = host_string, "Disconnecting");
            transport.close().await;
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (host, transport) in self.connections.drain() {
            debug!(host = %host, "Disconnecting");
            transport.close().await;
        }
    }

    pub fn contains(&self, host_string: &str) -> bool {
        self.connections.contains_key(host_string)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Opens openssh sessions, giving every known host its own output color.
pub struct SshConnector {
    key_filename: Option<PathBuf>,
    password: Option<String>,
    connect_timeout: Duration,
    output_prefix: bool,
    colors: HashMap<String, Color>,
}

impl SshConnector {
    pub fn new(settings: &Settings, hosts: &[Host]) -> Self {
        let colors = ColorPalette::new(hosts.len().max(1) as u32, PaletteType::Pastel, false).colors;
        let colors = hosts.iter().map(Host::key).zip(colors).collect();
        Self {
            key_filename: settings.key_filename.clone(),
            password: settings.password.clone(),
            connect_timeout: settings.connect_timeout,
            output_prefix: settings.output_prefix,
            colors,
        }
    }

    fn prefix_for(&self, host: &Host, host_string: &str) -> ColoredString {
        match self.colors.get(host_string) {
            Some(color) => host.prettify(color),
            None => host.prefix().normal(),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, target: &ConnectionSettings) -> Result<Arc<dyn Transport>> {
        let host = target
            .host_string
            .parse()
            .unwrap_or_else(|_| Host::new(&target.hostname));
        let colorhost = self.prefix_for(&host, &target.host_string);

        let mut builder = SessionBuilder::default();
        builder
            .user(target.user.clone())
            .port(target.port)
            .connect_timeout(self.connect_timeout)
            .known_hosts_check(KnownHosts::Add);
        if let Some(key) = &self.key_filename {
            builder.keyfile(key);
        }
        let session = match builder.connect_mux(&target.hostname).await {
            Ok(session) => session,
            Err(e) => {
                warn!(host = %target.host_string, error = %e, "Failed to connect to host");
                return Err(AdminError::network(&target.host_string, e));
            }
        };
        info!(host = %target.host_string, "Connected to host");
        Ok(Arc::new(SshTransport {
            host_string: target.host_string.clone(),
            colorhost,
            session: Mutex::new(Some(session)),
            password: self.password.clone(),
            output_prefix: self.output_prefix,
        }))
    }
}

pub struct SshTransport {
    host_string: String,
    colorhost: ColoredString,
    session: Mutex<Option<SSHSession>>,
    password: Option<String>,
    output_prefix: bool,
}

impl SshTransport {
    fn network(&self, e: impl ToString) -> AdminError {
        AdminError::network(&self.host_string, e)
    }

    async fn exec(&self, program: &str, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Output> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| self.network("connection already closed"))?;

        let mut cmd = session.command(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = cmd.spawn().await.map_err(|e| self.network(e))?;

        if let Some(bytes) = stdin {
            if let Some(mut writer) = child.stdin().take() {
                writer.write_all(&bytes).await.map_err(|e| self.network(e))?;
                writer.shutdown().await.map_err(|e| self.network(e))?;
            }
        }

        let stdout = child.stdout().take();
        let stderr = child.stderr().take();
        let (stdout, stderr) = join(self.stream(stdout), self.stream(stderr)).await;
        let status = child.wait().await.map_err(|e| self.network(e))?;

        Ok(Output {
            code: status.code(),
            stdout: stdout.map_err(|e| self.network(e))?,
            stderr: stderr.map_err(|e| self.network(e))?,
        })
    }

    /// Collects a remote stream line by line, echoing each line with the
    /// colored host prefix.
    async fn stream<B: AsyncRead + Unpin>(&self, stream: Option<B>) -> std::io::Result<String> {
        let mut collected = String::new();
        let Some(stream) = stream else {
            return Ok(collected);
        };
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(reader.buffer().len());
        loop {
            buf.clear();
            read_until2(&mut reader, b'\r', b'\n', &mut buf).await?;
            // An empty buffer means that EOF was reached.
            if buf.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if self.output_prefix {
                println!("{} {}", self.colorhost, line);
            }
            collected.push_str(line);
            collected.push('\n');
        }
        Ok(collected)
    }

    fn sudo_args(&self) -> Vec<&str> {
        if self.password.is_some() {
            vec!["-S", "-p", ""]
        } else {
            vec!["-n"]
        }
    }

    fn sudo_stdin(&self) -> Option<Vec<u8>> {
        self.password
            .as_ref()
            .map(|password| format!("{}\n", password).into_bytes())
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&self, command: &str) -> Result<Output> {
        debug!(host = %self.host_string, command, "run");
        self.exec("sh", &["-c", command], None).await
    }

    async fn sudo(&self, command: &str) -> Result<Output> {
        debug!(host = %self.host_string, command, "sudo");
        let mut args = self.sudo_args();
        args.extend(["sh", "-c", command]);
        self.exec("sudo", &args, self.sudo_stdin()).await
    }

    async fn upload(&self, contents: &[u8], path: &str, use_sudo: bool) -> Result<()> {
        debug!(host = %self.host_string, path, bytes = contents.len(), "upload");
        let command = format!("cat > {}", shell_quote(path));
        let output = if use_sudo {
            let mut stdin = self.sudo_stdin().unwrap_or_default();
            stdin.extend_from_slice(contents);
            let mut args = self.sudo_args();
            args.extend(["sh", "-c", command.as_str()]);
            self.exec("sudo", &args, Some(stdin)).await?
        } else {
            self.exec("sh", &["-c", &command], Some(contents.to_vec()))
                .await?
        };
        output.check(&self.host_string, &command).map(|_| ())
    }

    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>> {
        debug!(host = %self.host_string, path, "download");
        let command = format!(
            "test -e {path} || exit {code}; cat {path}",
            path = shell_quote(path),
            code = MISSING_FILE_CODE
        );
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| self.network("connection already closed"))?;
        // Raw bytes, so no line streaming here.
        let output = session
            .command("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .await
            .map_err(|e| self.network(e))?;
        match output.status.code() {
            Some(0) => Ok(Some(output.stdout)),
            Some(MISSING_FILE_CODE) => Ok(None),
            code => Err(AdminError::CommandFailed {
                host: self.host_string.clone(),
                command,
                code: code.unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            eprintln!("{} Terminating connection.", self.colorhost);
            if let Err(e) = session.close().await {
                eprintln!("{} Error while terminating: {}", self.colorhost, e);
            }
        }
    }
}

/// Reads into `buf` until either delimiter (inclusive) or EOF.
async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}
