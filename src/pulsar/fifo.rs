//! FIFO transport (§4.B transport 2) — explicitly debug-oriented. The hub
//! ensures a named pipe exists, fires off an external command to make sure
//! PULSAR is running, and writes commands into the pipe without ever
//! reading anything back (see §9 open question on FIFO frame ingestion).

use std::fs::File;
use std::io::Write;
use std::os::unix::io::FromRawFd;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;

use crate::config::Config;

/// Transparent reopen state machine: `Disconnected -> Opening -> Connected`.
/// `Opening` is implicit here — `try_open` is attempted lazily on send and
/// either lands in `Connected` or falls back to `Disconnected`.
enum FifoState {
    Disconnected,
    Connected(File),
}

pub struct FifoTransport {
    path: std::path::PathBuf,
    state: FifoState,
}

impl FifoTransport {
    /// Ensures the pipe exists and fires a fire-and-forget command to start
    /// PULSAR, returning the new transport plus a best-effort pid hint for
    /// the supervisor entry (0 if unavailable).
    pub fn new(config: &Config) -> (Self, Option<u32>) {
        Self::ensure_pipe(config);
        let pid = Self::fire_and_forget_start(config);
        (
            Self {
                path: config.pulsar_fifo_path.clone(),
                state: FifoState::Disconnected,
            },
            pid,
        )
    }

    fn ensure_pipe(config: &Config) {
        if config.pulsar_fifo_path.exists() {
            return;
        }
        if let Some(parent) = config.pulsar_fifo_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(%err, "failed to create fifo parent directory");
                return;
            }
        }
        if let Err(err) = nix::unistd::mkfifo(&config.pulsar_fifo_path, Mode::from_bits_truncate(0o600)) {
            tracing::warn!(%err, "failed to create pulsar fifo");
        }
    }

    /// We never wait on this, and we never track the spawned process beyond
    /// its pid: an operator or TSM is responsible for keeping it alive.
    fn fire_and_forget_start(config: &Config) -> Option<u32> {
        match std::process::Command::new(&config.pulsar_bin)
            .arg("--fifo-daemon")
            .spawn()
        {
            Ok(child) => Some(child.id()),
            Err(err) => {
                tracing::warn!(%err, "failed to fire-and-forget start pulsar for fifo mode");
                None
            }
        }
    }

    fn try_open(&mut self) -> bool {
        match open(&self.path, OFlag::O_WRONLY | OFlag::O_NONBLOCK, Mode::empty()) {
            Ok(fd) => {
                // Safety: `open` just handed us sole ownership of this fd.
                let file = unsafe { File::from_raw_fd(fd) };
                self.state = FifoState::Connected(file);
                true
            }
            Err(err) => {
                tracing::debug!(%err, "pulsar fifo not ready for writing yet");
                false
            }
        }
    }

    pub async fn write_line(&mut self, line: &str) {
        if matches!(self.state, FifoState::Disconnected) {
            self.try_open();
        }
        let mut dead = false;
        if let FifoState::Connected(file) = &mut self.state {
            let mut buf = line.as_bytes().to_vec();
            buf.push(b'\n');
            if let Err(err) = file.write_all(&buf) {
                tracing::warn!(%err, "pulsar fifo write failed, will reopen on next send");
                dead = true;
            }
        } else {
            tracing::debug!(line, "dropping pulsar command, fifo not connected");
        }
        if dead {
            self.state = FifoState::Disconnected;
        }
    }
}
