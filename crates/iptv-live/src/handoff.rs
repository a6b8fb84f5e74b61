//! Hand a stream to an external native player (mpv).
//!
//! Used when inline playback gives up.  The child is watched by a task that
//! reports `ExternalEnded` tagged with the handoff generation when mpv exits
//! on its own.  Every `play` stops and reaps the previous child first.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::LiveEvent;
use crate::error::{LiveError, LiveResult};

#[async_trait]
pub trait ExternalPlayer: Send {
    async fn play(&mut self, url: &str, title: &str) -> LiveResult<u64>;
    async fn stop(&mut self) -> LiveResult<()>;
    fn is_active(&self) -> bool;
}

struct RunningChild {
    cancel: CancellationToken,
    watcher: JoinHandle<()>,
}

pub struct MpvHandoff {
    binary_override: Option<PathBuf>,
    event_tx: mpsc::Sender<LiveEvent>,
    running: Option<RunningChild>,
    generation: u64,
}

impl MpvHandoff {
    pub fn new(binary_override: Option<PathBuf>, event_tx: mpsc::Sender<LiveEvent>) -> Self {
        Self {
            binary_override,
            event_tx,
            running: None,
            generation: 0,
        }
    }
}

#[async_trait]
impl ExternalPlayer for MpvHandoff {
    async fn play(&mut self, url: &str, title: &str) -> LiveResult<u64> {
        self.stop().await?;

        let binary = iptv_proto::platform::find_mpv_binary(self.binary_override.as_ref())
            .ok_or_else(|| LiveError::ExternalPlayer("mpv binary not found".into()))?;

        let mut child = tokio::process::Command::new(&binary)
            .arg("--fs")
            .arg(format!("--force-media-title={}", title))
            .arg(url)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LiveError::ExternalPlayer(format!("spawn {:?}: {}", binary, e)))?;

        self.generation += 1;
        let generation = self.generation;
        info!("mpv: handoff #{} pid {:?} '{}'", generation, child.id(), title);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let event_tx = self.event_tx.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(s) => info!("mpv: handoff #{} exited ({})", generation, s),
                        Err(e) => warn!("mpv: handoff #{} wait failed: {}", generation, e),
                    }
                    let _ = event_tx.send(LiveEvent::ExternalEnded { generation }).await;
                }
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                }
            }
        });

        self.running = Some(RunningChild { cancel, watcher });
        Ok(generation)
    }

    async fn stop(&mut self) -> LiveResult<()> {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            // reap before anything new is spawned
            if let Err(e) = running.watcher.await {
                warn!("mpv: watcher join failed: {}", e);
            }
            info!("mpv: handoff #{} stopped", self.generation);
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.watcher.is_finished())
    }
}
