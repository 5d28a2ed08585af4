//! Client Hub (§4.F) — the centerpiece: classifies peers, fans out frames
//! and sound deltas, forwards browser input to game sources.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::frame_parser::{FrameParser, ParseOutcome};
use crate::handle::Handle;
use crate::protocol::{now_ms, InboundEnvelope, ServerMessage};
use crate::pulsar::PulsarChannel;
use crate::slot::SlotScheduler;
use crate::stats::Stats;
use crate::voice::{OscArg, OscOutcome, VoiceDelta, VoiceState, VoiceStateSnapshot};

/// Games spun up directly by the browser with no PULSAR involvement.
const BUILTIN_GAMES: &[&str] = &["pong", "snake"];
/// Game types that bridge to PULSAR slots (see §8 S4).
const PULSAR_BACKED_GAMES: &[&str] = &["magnetar"];

type Outbox = mpsc::Sender<Message>;

struct GameSourceEntry {
    outbox: Outbox,
    game_type: SyncMutex<String>,
}

pub struct Hub {
    browsers: SyncRwLock<HashMap<Handle, Outbox>>,
    game_sources: SyncRwLock<HashMap<Handle, GameSourceEntry>>,
    voice: SyncMutex<VoiceState>,
    current_screen: SyncMutex<Option<String>>,
    stats: Arc<SyncMutex<Stats>>,
    scheduler: Arc<SlotScheduler>,
    frame_parser: Arc<SyncMutex<FrameParser>>,
}

impl Hub {
    pub fn new(pulsar: Arc<PulsarChannel>) -> Self {
        let stats = Arc::new(SyncMutex::new(Stats::new()));
        let frame_parser = Arc::new(SyncMutex::new(FrameParser::new()));
        let scheduler = Arc::new(SlotScheduler::new(pulsar, frame_parser.clone(), stats.clone()));
        Self {
            browsers: SyncRwLock::new(HashMap::new()),
            game_sources: SyncRwLock::new(HashMap::new()),
            voice: SyncMutex::new(VoiceState::new()),
            current_screen: SyncMutex::new(None),
            stats,
            scheduler,
            frame_parser,
        }
    }

    // ---- connection lifecycle ------------------------------------------

    /// Registers a browser peer and sends it the `sync` message. The sync
    /// is pushed onto the outbox *before* the peer is published into
    /// `browsers`, so no other broadcaster can race ahead of it (§5
    /// ordering guarantee 4).
    pub fn register_browser(&self, handle: Handle, outbox: Outbox) {
        let snapshot = self.voice.lock().snapshot();
        self.send_on(&outbox, &ServerMessage::Sync { snd: snapshot });
        self.browsers.write().insert(handle, outbox);
        self.stats.lock().clients_connected += 1;
    }

    pub fn register_game_source(&self, handle: Handle, outbox: Outbox) {
        self.game_sources.write().insert(
            handle,
            GameSourceEntry {
                outbox,
                game_type: SyncMutex::new("unknown".to_string()),
            },
        );
    }

    pub fn remove_peer(&self, handle: Handle) {
        self.browsers.write().remove(&handle);
        self.game_sources.write().remove(&handle);
    }

    // ---- inbound dispatch ------------------------------------------------

    pub fn handle_game_source_message(&self, handle: Handle, raw: &str) {
        let envelope = match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(e) => e,
            Err(_) => {
                self.stats.lock().decode_errors += 1;
                return;
            }
        };

        match envelope.t.as_str() {
            "register" => {
                if let Some(game_type) = envelope.rest.get("gameType").and_then(Value::as_str) {
                    if let Some(entry) = self.game_sources.read().get(&handle) {
                        *entry.game_type.lock() = game_type.to_string();
                    }
                }
            }
            "frame" => {
                if let Some(snd) = envelope.rest.get("snd") {
                    if let Ok(delta) = serde_json::from_value::<VoiceDelta>(snd.clone()) {
                        self.voice.lock().apply_delta(delta);
                    }
                }
                self.stats.lock().frames_relayed += 1;
                self.broadcast_raw_to_browsers(raw);
            }
            _ => {}
        }
    }

    pub async fn handle_browser_message(&self, handle: Handle, raw: &str) {
        let envelope = match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(e) => e,
            Err(_) => {
                self.stats.lock().decode_errors += 1;
                return;
            }
        };

        match envelope.t.as_str() {
            "input" => self.broadcast_raw_to_game_sources(raw),
            "screen" => {
                if let Some(screen) = envelope.rest.get("screen").and_then(Value::as_str) {
                    *self.current_screen.lock() = Some(screen.to_string());
                }
            }
            "bridge.spawn" => self.handle_bridge_spawn(handle, envelope.rest).await,
            "ping" => self.send_to(handle, &ServerMessage::Pong { ts: now_ms() }),
            _ => {}
        }
    }

    async fn handle_bridge_spawn(&self, handle: Handle, rest: Value) {
        let game = rest
            .get("game")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let channel = rest.get("channel").and_then(Value::as_u64).map(|c| c as u16);

        if BUILTIN_GAMES.contains(&game.as_str()) {
            self.send_to(
                handle,
                &ServerMessage::BridgeReady {
                    game,
                    slot: channel.unwrap_or(0),
                    status: "builtin",
                },
            );
            return;
        }

        if !PULSAR_BACKED_GAMES.contains(&game.as_str()) {
            self.send_to(
                handle,
                &ServerMessage::BridgeError {
                    game,
                    slot: channel,
                    error: "unknown game type".to_string(),
                },
            );
            return;
        }

        let Some(slot) = channel else {
            self.send_to(
                handle,
                &ServerMessage::BridgeError {
                    game,
                    slot: None,
                    error: "missing channel".to_string(),
                },
            );
            return;
        };

        match self.scheduler.init_slot(slot, 60, 24, 15).await {
            Ok(()) => {
                let _ = self.scheduler.spawn_sprite(slot, "seed", 10, 10, 4, 12, 1).await;
                let _ = self.scheduler.spawn_sprite(slot, "seed", 40, 18, 4, -12, 1).await;
                self.stats.lock().bridges_spawned += 1;
                self.send_to(
                    handle,
                    &ServerMessage::BridgeReady {
                        game,
                        slot,
                        status: "ok",
                    },
                );
            }
            Err(err) => {
                self.send_to(
                    handle,
                    &ServerMessage::BridgeError {
                        game,
                        slot: Some(slot),
                        error: err.to_string(),
                    },
                );
            }
        }
    }

    // ---- OSC ingest (§4.E) ----------------------------------------------

    pub fn handle_osc_message(&self, address: &str, args: &[OscArg]) {
        let outcome = self.voice.lock().apply_osc_message(address, args);
        match outcome {
            OscOutcome::Delta(delta) if !delta.is_empty() => {
                self.broadcast_to_browsers(&ServerMessage::Snd { snd: delta });
            }
            OscOutcome::Delta(_) => {}
            OscOutcome::Dropped => {}
            OscOutcome::Unrecognized => self.stats.lock().osc_unrecognized += 1,
        }
    }

    pub fn note_osc_decode_error(&self) {
        self.stats.lock().decode_errors += 1;
    }

    /// Counted once per inbound datagram, not per bundled message (§4.E).
    pub fn note_osc_datagram(&self) {
        self.stats.lock().osc_messages += 1;
    }

    // ---- PULSAR frame relay (§4.C -> §4.F) -------------------------------

    pub fn feed_pulsar_line(&self, line: &str) {
        let outcome = self.frame_parser.lock().feed_line(line);
        match outcome {
            ParseOutcome::FrameReady { slot, display } => self.broadcast_engine_frame(slot, display),
            ParseOutcome::ProtocolViolation => self.stats.lock().protocol_violations += 1,
            ParseOutcome::Informational(line) => tracing::trace!(%line, "pulsar informational output"),
            ParseOutcome::None => {}
        }
    }

    fn broadcast_engine_frame(&self, slot: u16, display: String) {
        self.stats.lock().frames_relayed += 1;
        self.broadcast_to_browsers(&ServerMessage::Frame {
            slot: Some(slot),
            display,
            ts: now_ms(),
        });
    }

    pub async fn clear_all_slots(&self) {
        self.scheduler.clear_all().await;
    }

    // ---- broadcast primitives --------------------------------------------

    fn broadcast_to_browsers(&self, msg: &ServerMessage) {
        let Ok(text) = serde_json::to_string(msg) else {
            return;
        };
        self.broadcast_raw_to_browsers(&text);
    }

    /// Fans a raw JSON string out to every browser with a healthy outbox;
    /// a peer whose outbox is full or closed is dropped (§4.F back-pressure
    /// policy).
    fn broadcast_raw_to_browsers(&self, raw: &str) {
        let message = Message::Text(raw.to_string());
        self.browsers
            .write()
            .retain(|_, outbox| outbox.try_send(message.clone()).is_ok());
    }

    fn broadcast_raw_to_game_sources(&self, raw: &str) {
        let message = Message::Text(raw.to_string());
        self.game_sources
            .write()
            .retain(|_, entry| entry.outbox.try_send(message.clone()).is_ok());
    }

    fn send_to(&self, handle: Handle, msg: &ServerMessage) {
        let outbox = self.browsers.read().get(&handle).cloned();
        if let Some(outbox) = outbox {
            self.send_on(&outbox, msg);
        }
    }

    fn send_on(&self, outbox: &Outbox, msg: &ServerMessage) {
        if let Ok(text) = serde_json::to_string(msg) {
            let _ = outbox.try_send(Message::Text(text));
        }
    }

    // ---- shutdown (§4.F Cancellation) ------------------------------------

    pub fn close_all_peers(&self) {
        for outbox in self.browsers.write().drain().map(|(_, o)| o) {
            let _ = outbox.try_send(Message::Close(None));
        }
        for entry in self.game_sources.write().drain().map(|(_, e)| e) {
            let _ = entry.outbox.try_send(Message::Close(None));
        }
    }

    // ---- control surface (§4.H) ------------------------------------------

    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: "ok",
            uptime_ms: self.stats.lock().uptime_ms(),
            clients_count: self.browsers.read().len(),
            game_sources_count: self.game_sources.read().len(),
            stats: self.stats.lock().clone(),
            sound_state: self.voice.lock().snapshot(),
        }
    }

    pub fn current_screen_or_placeholder(&self) -> String {
        self.current_screen
            .lock()
            .clone()
            .unwrap_or_else(|| "(no screen yet)".to_string())
    }
}

#[derive(serde::Serialize)]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub uptime_ms: i64,
    pub clients_count: usize,
    #[serde(rename = "gameSources_count")]
    pub game_sources_count: usize,
    pub stats: Stats,
    #[serde(rename = "soundState")]
    pub sound_state: VoiceStateSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::supervisor::Supervisor;
    use tokio::sync::mpsc;

    fn new_hub() -> Hub {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Config::from_env();
        let supervisor = Arc::new(Supervisor::new(config.clone()));
        let pulsar = Arc::new(PulsarChannel::new(config, tx, supervisor));
        Hub::new(pulsar)
    }

    #[tokio::test]
    async fn browser_join_receives_sync_first() {
        let hub = new_hub();
        let (tx, mut rx) = mpsc::channel(8);
        hub.register_browser(Handle::new(), tx);
        let msg = rx.recv().await.unwrap();
        match msg {
            Message::Text(text) => assert!(text.contains("\"t\":\"sync\"")),
            _ => panic!("expected text message"),
        }
    }

    #[tokio::test]
    async fn input_forwards_unchanged_to_game_sources_only() {
        let hub = new_hub();
        let (browser_tx, mut browser_rx) = mpsc::channel(8);
        let (game_tx, mut game_rx) = mpsc::channel(8);
        let browser = Handle::new();
        let game = Handle::new();
        hub.register_browser(browser, browser_tx);
        hub.register_game_source(game, game_tx);
        // drain the sync message
        browser_rx.recv().await.unwrap();

        let raw = r#"{"t":"input","key":"A"}"#;
        hub.handle_browser_message(browser, raw).await;

        let forwarded = game_rx.recv().await.unwrap();
        match forwarded {
            Message::Text(text) => assert_eq!(text, raw),
            _ => panic!("expected text"),
        }
        assert!(browser_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn osc_delta_reaches_browsers_only() {
        let hub = new_hub();
        let (browser_tx, mut browser_rx) = mpsc::channel(8);
        let (game_tx, mut game_rx) = mpsc::channel(8);
        hub.register_browser(Handle::new(), browser_tx);
        hub.register_game_source(Handle::new(), game_tx);
        browser_rx.recv().await.unwrap();

        hub.handle_osc_message(
            "/quasar/0/set",
            &[OscArg::Int(1), OscArg::Int(18), OscArg::Int(7), OscArg::Int(12)],
        );

        let msg = browser_rx.recv().await.unwrap();
        match msg {
            Message::Text(text) => assert!(text.contains("\"t\":\"snd\"")),
            _ => panic!("expected text"),
        }
        assert!(game_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_bridge_game_returns_error() {
        let hub = new_hub();
        let (tx, mut rx) = mpsc::channel(8);
        let browser = Handle::new();
        hub.register_browser(browser, tx);
        rx.recv().await.unwrap(); // sync

        hub.handle_browser_message(
            browser,
            r#"{"t":"bridge.spawn","game":"not-a-real-game","channel":1}"#,
        )
        .await;

        let msg = rx.recv().await.unwrap();
        match msg {
            Message::Text(text) => assert!(text.contains("bridge.error")),
            _ => panic!("expected text"),
        }
    }
}
