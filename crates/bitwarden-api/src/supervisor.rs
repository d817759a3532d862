//! Supervision of the `bw serve` child process.
//!
//! The child is owned by a background task. That task kills it when the
//! shutdown signal fires or [`ServeProcess::stop`] is called, and records
//! the state transitions `Stopped → Starting → Running → Terminating →
//! Stopped`. There is no restart: once the child is gone the caller decides
//! whether to call [`ServeProcess::start`] again.

use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Error;

/// Delay the legacy fixed-wait readiness mode sleeps for.
pub const LEGACY_STARTUP_DELAY: Duration = Duration::from_secs(2);

/// How [`ServeProcess::start`] decides the server is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Poll a TCP connect to the listen address every `interval` until it
    /// succeeds or `timeout` elapses.
    Probe {
        timeout: Duration,
        interval: Duration,
    },
    /// Sleep for a fixed time and assume the server is up.
    Fixed(Duration),
}

impl Default for Readiness {
    fn default() -> Self {
        Self::Probe {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Terminating,
}

/// How to launch `bw serve`.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Executable to run. Default: `bw`.
    pub program: String,
    /// Arguments placed before `serve`, e.g. `["@bitwarden/cli"]` when the
    /// program is `npx`. Default: none.
    pub program_args: Vec<String>,
    /// Interface `bw serve` binds. Default: `localhost`.
    pub hostname: String,
    /// Port `bw serve` listens on. Default: `8087`.
    pub port: u16,
    /// Readiness check performed before `start` returns.
    pub readiness: Readiness,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            program: "bw".to_owned(),
            program_args: Vec::new(),
            hostname: "localhost".to_owned(),
            port: 8087,
            readiness: Readiness::default(),
        }
    }
}

impl ServeConfig {
    /// Arguments passed to the executable.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.program_args.clone();
        args.extend([
            "serve".to_owned(),
            "--hostname".to_owned(),
            self.hostname.clone(),
            "--port".to_owned(),
            self.port.to_string(),
        ]);
        args
    }

    /// Base URL clients should use to reach the server.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.port)
    }

    /// Every address the listen hostname resolves to. `localhost` may map to
    /// both `127.0.0.1` and `::1` and the server binds only one of them.
    async fn probe_addrs(&self) -> Result<Vec<SocketAddr>, Error> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.hostname.as_str(), self.port))
            .await
            .map_err(|e| Error::Config(format!("cannot resolve {}: {e}", self.hostname)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Config(format!(
                "{} resolved to no addresses",
                self.hostname
            )));
        }
        Ok(addrs)
    }
}

/// Handle to a running `bw serve` child.
///
/// Dropping the handle stops the server, as does the shutdown signal.
#[derive(Debug)]
pub struct ServeProcess {
    pid: Option<u32>,
    base_url: String,
    state: watch::Receiver<ProcessState>,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: JoinHandle<Result<ExitStatus, Error>>,
}

impl ServeProcess {
    /// Launch the server and wait until it is ready.
    ///
    /// `shutdown` is the cancellation signal: once it turns `true`, or its
    /// sender is dropped, the child is killed.
    ///
    /// # Errors
    ///
    /// - `Error::Launch` if the executable cannot be spawned.
    /// - `Error::StartupTimeout` / `Error::ExitedDuringStartup` if the
    ///   readiness probe fails; the child has been killed by then.
    pub async fn start(
        config: &ServeConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, Error> {
        let (state_tx, state_rx) = watch::channel(ProcessState::Starting);

        let mut child = Command::new(&config.program)
            .args(config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Launch {
                program: config.program.clone(),
                source,
            })?;
        let pid = child.id();
        info!(program = %config.program, pid, port = config.port, "server process spawned");

        let ready = match config.readiness {
            Readiness::Probe { timeout, interval } => match config.probe_addrs().await {
                Ok(addrs) => wait_for_port(&mut child, &addrs, timeout, interval).await,
                Err(e) => Err(e),
            },
            Readiness::Fixed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        };
        if let Err(e) = ready {
            // Best effort: the child may already be gone.
            let _ = child.kill().await;
            state_tx.send_replace(ProcessState::Stopped);
            return Err(e);
        }

        state_tx.send_replace(ProcessState::Running);
        info!(pid, base_url = %config.base_url(), "server ready");

        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_child(child, shutdown, stop_rx, state_tx));

        Ok(Self {
            pid,
            base_url: config.base_url(),
            state: state_rx,
            stop_tx: Some(stop_tx),
            watcher,
        })
    }

    /// OS process id, if the child had one when spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Base URL of the server.
    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Kill the server now and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns `Error::Process` if the child could not be killed or reaped.
    pub async fn stop(mut self) -> Result<ExitStatus, Error> {
        if let Some(tx) = self.stop_tx.take() {
            // Err means the watcher already finished; `wait` picks up its result.
            let _ = tx.send(());
        }
        self.wait().await
    }

    /// Wait until the child has exited, either because it was killed or on
    /// its own.
    ///
    /// # Errors
    ///
    /// Returns `Error::Process` if waiting on the child failed.
    pub async fn wait(self) -> Result<ExitStatus, Error> {
        // Keep the stop channel open while waiting so the watcher does not
        // read its closure as a stop request.
        let _stop_tx = self.stop_tx;
        match self.watcher.await {
            Ok(result) => result,
            Err(join) => Err(Error::Process(std::io::Error::other(join))),
        }
    }
}

/// Poll `addrs` until one of them accepts a TCP connection.
async fn wait_for_port(
    child: &mut Child,
    addrs: &[SocketAddr],
    timeout: Duration,
    interval: Duration,
) -> Result<(), Error> {
    let started = Instant::now();
    let deadline = started + timeout;
    loop {
        // A blackholed SYN must not hold the attempt past the deadline.
        let budget = deadline.saturating_duration_since(Instant::now());
        if let Ok(Ok(stream)) = tokio::time::timeout(budget, TcpStream::connect(addrs)).await {
            debug!(
                addr = ?stream.peer_addr().ok(),
                waited_ms = started.elapsed().as_millis(),
                "server accepting connections"
            );
            return Ok(());
        }
        if let Some(status) = child.try_wait().map_err(Error::Process)? {
            return Err(Error::ExitedDuringStartup { status });
        }
        if Instant::now() >= deadline {
            return Err(Error::StartupTimeout {
                addrs: addrs.to_vec(),
                waited: timeout,
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// Resolve once shutdown is requested or the sender has gone away.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

async fn watch_child(
    mut child: Child,
    mut shutdown: watch::Receiver<bool>,
    stop_rx: oneshot::Receiver<()>,
    state: watch::Sender<ProcessState>,
) -> Result<ExitStatus, Error> {
    let pid = child.id();

    tokio::select! {
        exited = child.wait() => {
            state.send_replace(ProcessState::Stopped);
            let status = exited.map_err(Error::Process)?;
            warn!(pid, %status, "server process exited unexpectedly");
            return Ok(status);
        }
        () = shutdown_requested(&mut shutdown) => {
            info!(pid, "shutdown signal received, killing server");
        }
        _ = stop_rx => {
            info!(pid, "stop requested, killing server");
        }
    }

    state.send_replace(ProcessState::Terminating);
    let killed = child.kill().await;
    let status = child.wait().await;
    state.send_replace(ProcessState::Stopped);

    killed.map_err(Error::Process)?;
    let status = status.map_err(Error::Process)?;
    debug!(pid, %status, "server process reaped");
    Ok(status)
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    /// Config that runs `sleep 30` in place of `bw serve`. The trailing
    /// `serve --hostname ... --port ...` become ignored positional parameters
    /// of the `sh -c` script.
    fn sleeper(port: u16, readiness: Readiness) -> ServeConfig {
        ServeConfig {
            program: "sh".to_owned(),
            program_args: vec!["-c".to_owned(), "exec sleep 30".to_owned()],
            hostname: "127.0.0.1".to_owned(),
            port,
            readiness,
        }
    }

    fn quick() -> Readiness {
        Readiness::Fixed(Duration::from_millis(50))
    }

    #[test]
    fn default_config_matches_bw_defaults() {
        let cfg = ServeConfig::default();
        assert_eq!(cfg.program, "bw");
        assert_eq!(cfg.args(), ["serve", "--hostname", "localhost", "--port", "8087"]);
        assert_eq!(cfg.base_url(), "http://localhost:8087");
    }

    #[test]
    fn program_args_come_before_serve() {
        let cfg = ServeConfig {
            program: "npx".to_owned(),
            program_args: vec!["@bitwarden/cli".to_owned()],
            port: 9000,
            ..ServeConfig::default()
        };
        assert_eq!(
            cfg.args(),
            ["@bitwarden/cli", "serve", "--hostname", "localhost", "--port", "9000"]
        );
    }

    #[tokio::test]
    async fn missing_executable_is_launch_error() {
        let (_tx, rx) = watch::channel(false);
        let cfg = ServeConfig {
            program: "bitwarden-api-no-such-binary".to_owned(),
            readiness: quick(),
            ..ServeConfig::default()
        };
        let err = ServeProcess::start(&cfg, rx).await.unwrap_err();
        match err {
            Error::Launch { program, .. } => assert_eq!(program, "bitwarden-api-no-such-binary"),
            other => panic!("expected launch error, got {other}"),
        }
    }

    #[tokio::test]
    async fn shutdown_signal_kills_the_server() {
        let (tx, rx) = watch::channel(false);
        let server = ServeProcess::start(&sleeper(1, quick()), rx).await.unwrap();
        assert_eq!(server.state(), ProcessState::Running);
        assert!(server.pid().is_some());

        tx.send(true).unwrap();
        let status = server.wait().await.unwrap();
        assert_eq!(status.signal(), Some(9), "server was not killed: {status}");
    }

    #[tokio::test]
    async fn dropping_the_signal_sender_kills_the_server() {
        let (tx, rx) = watch::channel(false);
        let server = ServeProcess::start(&sleeper(1, quick()), rx).await.unwrap();
        drop(tx);
        let status = server.wait().await.unwrap();
        assert_eq!(status.signal(), Some(9));
    }

    #[tokio::test]
    async fn stop_kills_and_reports_stopped() {
        let (_tx, rx) = watch::channel(false);
        let server = ServeProcess::start(&sleeper(1, quick()), rx).await.unwrap();
        let state = server.state.clone();

        let status = server.stop().await.unwrap();
        assert_eq!(status.signal(), Some(9));
        assert_eq!(*state.borrow(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn probe_succeeds_once_port_accepts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (tx, rx) = watch::channel(false);
        let readiness = Readiness::Probe {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(20),
        };
        let server = ServeProcess::start(&sleeper(port, readiness), rx).await.unwrap();
        assert_eq!(server.state(), ProcessState::Running);
        assert_eq!(server.base_url(), format!("http://127.0.0.1:{port}"));

        tx.send(true).unwrap();
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn probe_times_out_when_nothing_listens() {
        // Bind then release to get a port that is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (_tx, rx) = watch::channel(false);
        let readiness = Readiness::Probe {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(20),
        };
        let err = ServeProcess::start(&sleeper(port, readiness), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StartupTimeout { .. }), "got {err}");
    }

    #[tokio::test]
    async fn probe_gives_up_on_time_when_connects_hang() {
        // TEST-NET-1 is never routed: connects either hang or fail at once.
        let (_tx, rx) = watch::channel(false);
        let mut cfg = sleeper(
            9,
            Readiness::Probe {
                timeout: Duration::from_millis(300),
                interval: Duration::from_millis(20),
            },
        );
        cfg.hostname = "192.0.2.1".to_owned();

        let started = std::time::Instant::now();
        let err = ServeProcess::start(&cfg, rx).await.unwrap_err();
        assert!(matches!(err, Error::StartupTimeout { .. }), "got {err}");
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "probe overran its timeout: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn child_exiting_during_startup_is_reported() {
        let (_tx, rx) = watch::channel(false);
        let cfg = ServeConfig {
            program: "false".to_owned(),
            hostname: "127.0.0.1".to_owned(),
            port: 1,
            readiness: Readiness::Probe {
                timeout: Duration::from_secs(5),
                interval: Duration::from_millis(20),
            },
            ..ServeConfig::default()
        };
        let err = ServeProcess::start(&cfg, rx).await.unwrap_err();
        assert!(matches!(err, Error::ExitedDuringStartup { .. }), "got {err}");
    }

    #[tokio::test]
    async fn unexpected_exit_moves_to_stopped() {
        let (_tx, rx) = watch::channel(false);
        let cfg = ServeConfig {
            program: "true".to_owned(),
            readiness: quick(),
            ..ServeConfig::default()
        };
        let server = ServeProcess::start(&cfg, rx).await.unwrap();
        let state = server.state.clone();

        let status = server.wait().await.unwrap();
        assert!(status.success());
        assert_eq!(*state.borrow(), ProcessState::Stopped);
    }
}
