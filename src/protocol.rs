//! WebSocket wire messages (§6 External Interfaces).
//!
//! Inbound messages are read generically (`t` plus whatever else is in the
//! object) because two of them — game-source `frame` and browser `input` —
//! must be relayed byte-for-byte unchanged; only the ones the hub itself
//! constructs (`sync`, `snd`, `frame` from the engine, `bridge.*`, `pong`)
//! get a concrete serializable shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::voice::{VoiceDelta, VoiceStateSnapshot};

#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    pub t: String,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    #[serde(rename = "sync")]
    Sync { snd: VoiceStateSnapshot },
    #[serde(rename = "snd")]
    Snd { snd: VoiceDelta },
    #[serde(rename = "frame")]
    Frame {
        #[serde(skip_serializing_if = "Option::is_none")]
        slot: Option<u16>,
        display: String,
        ts: i64,
    },
    #[serde(rename = "bridge.ready")]
    BridgeReady {
        game: String,
        slot: u16,
        status: &'static str,
    },
    #[serde(rename = "bridge.error")]
    BridgeError {
        game: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        slot: Option<u16>,
        error: String,
    },
    #[serde(rename = "pong")]
    Pong { ts: i64 },
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
