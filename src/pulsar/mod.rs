//! PULSAR Channel (§4.B) — the bidirectional line-oriented link to the
//! external synth engine, over either a subprocess or a FIFO transport.

pub mod fifo;
pub mod subprocess;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::config::{Config, PulsarMode};
use crate::error::QuasarError;
use crate::supervisor::Supervisor;

/// Events surfaced from the channel to the rest of the hub.
#[derive(Debug)]
pub enum PulsarEvent {
    /// One line of PULSAR stdout (subprocess transport only; the FIFO
    /// transport never produces these — see §4.B transport 2).
    Line(String),
    /// The subprocess exited unexpectedly.
    Exited,
}

enum Transport {
    Subprocess(subprocess::SubprocessTransport),
    Fifo(fifo::FifoTransport),
}

/// The single process-wide PULSAR channel. Created lazily on first need;
/// invalidated and re-created across subprocess restarts.
pub struct PulsarChannel {
    config: Config,
    transport: Mutex<Option<Transport>>,
    /// Serializes a slot's `TICK`+`RENDER` pair against every other slot's
    /// command writes — the ordering guarantee the Frame Parser depends on
    /// (§4.D). Distinct from `transport`'s own lock, which only serializes
    /// individual command writes.
    pair_lock: Mutex<()>,
    events: mpsc::UnboundedSender<PulsarEvent>,
    supervisor: Arc<Supervisor>,
}

impl PulsarChannel {
    pub fn new(
        config: Config,
        events: mpsc::UnboundedSender<PulsarEvent>,
        supervisor: Arc<Supervisor>,
    ) -> Self {
        Self {
            config,
            transport: Mutex::new(None),
            pair_lock: Mutex::new(()),
            events,
            supervisor,
        }
    }

    /// Ensure the transport is established, spawning/opening it if needed.
    pub async fn ensure_started(&self) -> Result<(), QuasarError> {
        let mut guard = self.transport.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let (transport, pid, comm_type, comm_path): (Transport, u32, &str, Option<String>) =
            match self.config.pulsar_mode {
                PulsarMode::Subprocess => {
                    let t = subprocess::SubprocessTransport::spawn(&self.config, self.events.clone())?;
                    let pid = t.pid();
                    (Transport::Subprocess(t), pid, "pipe", None)
                }
                PulsarMode::Fifo => {
                    let (t, pid) = fifo::FifoTransport::new(&self.config);
                    let path = self.config.pulsar_fifo_path.display().to_string();
                    (Transport::Fifo(t), pid.unwrap_or(0), "fifo", Some(path))
                }
            };

        *guard = Some(transport);
        drop(guard);
        self.supervisor
            .register(pid, comm_type, comm_path.as_deref())
            .await;
        Ok(())
    }

    /// Serialize one command line to the channel. Per §4.B: a write error on
    /// the subprocess stdin is fatal (exit is expected imminently); a write
    /// error on the FIFO invalidates the descriptor so the next send
    /// reopens it.
    pub async fn send_command(&self, line: impl Into<String>) -> Result<(), QuasarError> {
        self.ensure_started().await?;
        let mut guard = self.transport.lock().await;
        let line = line.into();
        match guard.as_mut() {
            Some(Transport::Subprocess(t)) => {
                if t.write_line(&line).await.is_err() {
                    *guard = None;
                    drop(guard);
                    let _ = self.events.send(PulsarEvent::Exited);
                    return Err(QuasarError::PulsarUnavailable(
                        "subprocess stdin closed".into(),
                    ));
                }
                Ok(())
            }
            Some(Transport::Fifo(t)) => {
                t.write_line(&line).await;
                Ok(())
            }
            None => Err(QuasarError::PulsarUnavailable(
                "channel not established".into(),
            )),
        }
    }

    /// Send a slot's `TICK`+`RENDER` pair atomically with respect to every
    /// other slot, calling `on_render` (to arm the Frame Parser's
    /// `currentFrameSlot`) exactly between the two writes.
    pub async fn send_tick_and_render(
        &self,
        slot: u16,
        ms: u64,
        on_render: impl FnOnce(),
    ) -> Result<(), QuasarError> {
        let _pair = self.pair_lock.lock().await;
        self.send_command(format!("{slot} TICK {ms}")).await?;
        on_render();
        self.send_command(format!("{slot} RENDER")).await
    }

    /// Drop the cached transport without sending anything further. Used
    /// after an unexpected PULSAR exit.
    pub async fn invalidate(&self) {
        *self.transport.lock().await = None;
    }

    /// Cancellation-time teardown: send `QUIT` and allow a short grace
    /// period before giving up on a clean exit.
    pub async fn shutdown(&self) {
        let _ = self.send_command("QUIT").await;
        let mut guard = self.transport.lock().await;
        if let Some(Transport::Subprocess(t)) = guard.as_mut() {
            t.wait_for_exit(std::time::Duration::from_millis(1000)).await;
        }
        *guard = None;
    }
}
