use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::paths;

// ============================================================================
// Process Supervisor
// ============================================================================

const STARTUP_GRACE: Duration = Duration::from_secs(2);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_POLL_ROUNDS: u32 = 50; // 5s before escalating to SIGKILL
const RESTART_SETTLE: Duration = Duration::from_secs(1);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STARTUP_OUTPUT_LIMIT: usize = 8 * 1024;
const EVENT_CAPACITY: usize = 256;

/// Engine lifecycle events, relayed to WebSocket clients using the frame
/// names the UI already understands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    #[serde(rename = "mihomo_log")]
    Log(String),
    #[serde(rename = "mihomo_error")]
    Error(String),
    #[serde(rename = "mihomo_stopped")]
    Stopped { code: Option<i32> },
}

struct EngineProcess {
    child: Child,
    pid: u32,
    started_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub uptime_secs: Option<u64>,
}

/// Owns the single engine subprocess. The handle mutex is held across the
/// liveness check and the spawn, so two concurrent `start()` calls cannot
/// both succeed.
pub struct ProcessSupervisor {
    inner: Arc<Mutex<Option<EngineProcess>>>,
    binary_path: Option<PathBuf>,
    config_dir: PathBuf,
    events: broadcast::Sender<EngineEvent>,
}

impl ProcessSupervisor {
    pub fn new(config_dir: PathBuf, binary_path: Option<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(None)),
            binary_path,
            config_dir,
            events,
        }
    }

    /// Supervisor with the engine binary auto-detected from the usual
    /// install locations and `$PATH`.
    pub fn with_resolved_binary(config_dir: PathBuf) -> Self {
        let binary_path = resolve_engine_binary();
        match &binary_path {
            Some(path) => info!("found mihomo at: {}", path.display()),
            None => warn!("mihomo binary not found; start requests will fail"),
        }
        Self::new(config_dir, binary_path)
    }

    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Spawn the engine against the config directory. Fails fast when a
    /// live handle exists, the binary was never resolved, or there is no
    /// config file; otherwise returns the PID once the process has
    /// survived the startup grace period.
    pub async fn start(&self) -> AppResult<u32> {
        let mut guard = self.inner.lock().await;
        if let Some(process) = guard.as_mut() {
            if process.child.try_wait()?.is_none() {
                return Err(AppError::AlreadyRunning);
            }
        }

        let binary = self.binary_path.as_ref().ok_or(AppError::BinaryNotFound)?;
        if !paths::config_file(&self.config_dir).exists() {
            return Err(AppError::ConfigMissing);
        }

        info!(
            "starting {} with config dir {}",
            binary.display(),
            self.config_dir.display()
        );
        let mut child = Command::new(binary)
            .arg("-d")
            .arg(&self.config_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let startup_output = Arc::new(StdMutex::new(String::new()));
        if let Some(stdout) = child.stdout.take() {
            spawn_output_reader(stdout, self.events.clone(), startup_output.clone(), false);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_reader(stderr, self.events.clone(), startup_output.clone(), true);
        }

        let pid = child.id().unwrap_or(0);
        *guard = Some(EngineProcess {
            child,
            pid,
            started_at: Instant::now(),
        });
        drop(guard);

        sleep(STARTUP_GRACE).await;

        let mut guard = self.inner.lock().await;
        let exited = match guard.as_mut() {
            Some(process) => process.child.try_wait()?.is_some(),
            // Someone stopped the engine during the grace period.
            None => true,
        };
        if exited {
            *guard = None;
            let output = startup_output.lock().map(|o| o.clone()).unwrap_or_default();
            return Err(AppError::StartupFailed { output });
        }
        drop(guard);

        self.spawn_exit_watcher();
        Ok(pid)
    }

    /// SIGTERM, escalating to SIGKILL when the engine has not exited
    /// within five seconds.
    pub async fn stop(&self) -> AppResult<()> {
        let mut guard = self.inner.lock().await;
        let process = guard.as_mut().ok_or(AppError::NotRunning)?;

        if process.child.try_wait()?.is_some() {
            *guard = None;
            return Err(AppError::NotRunning);
        }

        let _ = kill(Pid::from_raw(process.pid as i32), Signal::SIGTERM);

        let mut status = None;
        for _ in 0..STOP_POLL_ROUNDS {
            sleep(STOP_POLL_INTERVAL).await;
            if let Some(exit) = process.child.try_wait()? {
                status = Some(exit);
                break;
            }
        }

        let status = match status {
            Some(exit) => exit,
            None => {
                warn!("mihomo did not stop gracefully, force killing");
                process.child.start_kill().ok();
                process.child.wait().await?
            }
        };

        *guard = None;
        let _ = self.events.send(EngineEvent::Stopped {
            code: status.code(),
        });
        info!("mihomo stopped with {}", status);
        Ok(())
    }

    /// Stop (when running), settle, start.
    pub async fn restart(&self) -> AppResult<u32> {
        if self.runtime_status().await.is_running {
            self.stop().await?;
        }
        sleep(RESTART_SETTLE).await;
        self.start().await
    }

    /// Liveness snapshot; a handle whose process already exited is cleared
    /// on the way.
    pub async fn runtime_status(&self) -> RuntimeStatus {
        let mut guard = self.inner.lock().await;
        if let Some(process) = guard.as_mut() {
            match process.child.try_wait() {
                Ok(None) => {
                    return RuntimeStatus {
                        is_running: true,
                        pid: Some(process.pid),
                        uptime_secs: Some(process.started_at.elapsed().as_secs()),
                    }
                }
                Ok(Some(_)) | Err(_) => *guard = None,
            }
        }
        RuntimeStatus {
            is_running: false,
            pid: None,
            uptime_secs: None,
        }
    }

    /// Emits `mihomo_stopped` when the engine exits on its own; a manual
    /// `stop()` clears the handle first, which ends the watcher silently.
    fn spawn_exit_watcher(&self) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                sleep(EXIT_POLL_INTERVAL).await;
                let mut guard = inner.lock().await;
                match guard.as_mut() {
                    None => break,
                    Some(process) => match process.child.try_wait() {
                        Ok(Some(status)) => {
                            let code = status.code();
                            warn!("mihomo exited unexpectedly with code {:?}", code);
                            *guard = None;
                            let _ = events.send(EngineEvent::Stopped { code });
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("failed to poll mihomo process: {}", e);
                            *guard = None;
                            break;
                        }
                    },
                }
            }
        });
    }
}

fn spawn_output_reader<R>(
    stream: R,
    events: broadcast::Sender<EngineEvent>,
    startup_output: Arc<StdMutex<String>>,
    is_stderr: bool,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut output) = startup_output.lock() {
                if output.len() < STARTUP_OUTPUT_LIMIT {
                    output.push_str(&line);
                    output.push('\n');
                }
            }
            let event = if is_stderr {
                EngineEvent::Error(line)
            } else {
                EngineEvent::Log(line)
            };
            let _ = events.send(event);
        }
    });
}

/// Locate the engine executable: `$MIHOMO_PATH` override first, then the
/// usual install locations, then `$PATH`.
pub fn resolve_engine_binary() -> Option<PathBuf> {
    if let Ok(custom) = std::env::var("MIHOMO_PATH") {
        let path = PathBuf::from(custom);
        if path.exists() {
            return Some(path);
        }
    }

    for candidate in ["/usr/local/bin/mihomo", "/usr/bin/mihomo", "/opt/mihomo/mihomo"] {
        let path = Path::new(candidate);
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    let names: &[&str] = if cfg!(target_os = "windows") {
        &["mihomo.exe", "clash-meta.exe"]
    } else {
        &["mihomo", "clash-meta"]
    };
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in names {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}
