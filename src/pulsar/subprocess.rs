//! Subprocess transport (§4.B transport 1): the hub owns PULSAR's
//! stdin/stdout/stderr directly.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;

use super::PulsarEvent;
use crate::config::Config;
use crate::error::QuasarError;

pub struct SubprocessTransport {
    stdin: ChildStdin,
    pid: u32,
}

impl SubprocessTransport {
    pub fn spawn(
        config: &Config,
        events: mpsc::UnboundedSender<PulsarEvent>,
    ) -> Result<Self, QuasarError> {
        let mut child = Command::new(&config.pulsar_bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id().unwrap_or(0);
        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let line_events = events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line_events.send(PulsarEvent::Line(line)).is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(target: "pulsar.stderr", "{line}");
            }
        });

        let exit_events = events;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::warn!(?status, "pulsar subprocess exited"),
                Err(err) => tracing::warn!(%err, "failed to wait on pulsar subprocess"),
            }
            let _ = exit_events.send(PulsarEvent::Exited);
        });

        Ok(Self { stdin, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    /// Best-effort wait for the grace period named in §4.D Shutdown; actual
    /// termination is otherwise guaranteed by `kill_on_drop`.
    pub async fn wait_for_exit(&mut self, grace: std::time::Duration) {
        tokio::time::sleep(grace).await;
    }
}
