//! Voice State Model (§4.A) — the authoritative current-sound snapshot.
//!
//! Mutated only by OSC Ingest and by game-source frames carrying a `snd`
//! payload. Every mutation path returns the delta that was actually applied
//! so the caller can hand it straight to the Client Hub for broadcast.

use serde::{Deserialize, Serialize};

/// One of four logical audio channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    #[serde(rename = "g")]
    pub gate: u8,
    #[serde(rename = "f")]
    pub freq: u8,
    #[serde(rename = "w")]
    pub wave: u8,
    #[serde(rename = "v")]
    pub vol: u8,
}

impl Voice {
    pub const fn silent() -> Self {
        Self {
            gate: 0,
            freq: 0,
            wave: 0,
            vol: 0,
        }
    }

    /// Clamp every field into its valid range. Called before any value is
    /// accepted into the snapshot.
    pub fn clamped(gate: i64, freq: i64, wave: i64, vol: i64) -> Self {
        Self {
            gate: (gate.clamp(0, 1)) as u8,
            freq: (freq.clamp(0, 31)) as u8,
            wave: (wave.clamp(0, 15)) as u8,
            vol: (vol.clamp(0, 15)) as u8,
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::silent()
    }
}

/// A trigger fired by `/quasar/trigger/<name>`. Broadcast-only: it is never
/// merged into the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<i64>,
}

/// A partial update to the snapshot: any subset of `{mode, v}`, plus an
/// optional broadcast-only `trig` list. Produced by every mutation path and
/// sent to browsers unchanged as the `snd` payload of a `t:"snd"` message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<[Voice; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trig: Option<Vec<TriggerEvent>>,
}

impl VoiceDelta {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.v.is_none() && self.trig.is_none()
    }
}

/// Process-wide singleton snapshot: `{mode, v: [Voice; 4]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceStateSnapshot {
    pub mode: String,
    pub v: [Voice; 4],
}

impl VoiceStateSnapshot {
    pub fn new() -> Self {
        Self {
            mode: "tia".to_string(),
            v: [Voice::silent(); 4],
        }
    }
}

impl Default for VoiceStateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// A single decoded OSC argument, stripped down to the types this model
/// cares about. Produced by the OSC Ingest layer from `rosc::OscType`.
#[derive(Debug, Clone)]
pub enum OscArg {
    Int(i64),
    Float(f64),
    String(String),
}

impl OscArg {
    fn as_i64(&self) -> Option<i64> {
        match self {
            OscArg::Int(i) => Some(*i),
            OscArg::Float(f) => Some(*f as i64),
            OscArg::String(_) => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::String(s) => Some(s),
            _ => None,
        }
    }
}

/// The authoritative voice state, guarded by the hub with a single mutex.
pub struct VoiceState {
    snapshot: VoiceStateSnapshot,
}

impl VoiceState {
    pub fn new() -> Self {
        Self {
            snapshot: VoiceStateSnapshot::new(),
        }
    }

    pub fn snapshot(&self) -> VoiceStateSnapshot {
        self.snapshot.clone()
    }

    /// Merge a subset of `{mode?, v?}` into the snapshot. `v`, when present,
    /// replaces the full voice array — there is no per-field partial
    /// replacement at this layer.
    pub fn apply_delta(&mut self, delta: VoiceDelta) -> VoiceDelta {
        if let Some(mode) = &delta.mode {
            self.snapshot.mode = mode.clone();
        }
        if let Some(v) = delta.v {
            self.snapshot.v = v;
        }
        delta
    }

    /// Decode one OSC `(address, args)` pair into the delta it implies, if
    /// any. Malformed arg counts and out-of-range voice indices are dropped
    /// silently (the caller counts them); recognition failure is `None`.
    pub fn apply_osc_message(&mut self, address: &str, args: &[OscArg]) -> OscOutcome {
        if address == "/quasar/mode" {
            return match args.first().and_then(OscArg::as_str) {
                Some(mode) => {
                    let delta = VoiceDelta {
                        mode: Some(mode.to_string()),
                        ..Default::default()
                    };
                    OscOutcome::Delta(self.apply_delta(delta))
                }
                None => OscOutcome::Dropped,
            };
        }

        if let Some(name) = address.strip_prefix("/quasar/trigger/") {
            if name.is_empty() {
                return OscOutcome::Unrecognized;
            }
            let voice = args.first().and_then(OscArg::as_i64);
            let delta = VoiceDelta {
                trig: Some(vec![TriggerEvent {
                    name: name.to_string(),
                    voice,
                }]),
                ..Default::default()
            };
            // Broadcast-only: does not go through apply_delta, never persisted.
            return OscOutcome::Delta(delta);
        }

        if let Some(rest) = address.strip_prefix("/quasar/") {
            if let Some(n_str) = rest.strip_suffix("/set") {
                let Ok(n) = n_str.parse::<usize>() else {
                    return OscOutcome::Unrecognized;
                };
                if n >= 4 || args.len() != 4 {
                    return OscOutcome::Dropped;
                }
                let nums: Option<Vec<i64>> = args.iter().map(OscArg::as_i64).collect();
                let Some(nums) = nums else {
                    return OscOutcome::Dropped;
                };
                self.snapshot.v[n] = Voice::clamped(nums[0], nums[1], nums[2], nums[3]);
                let delta = VoiceDelta {
                    v: Some(self.snapshot.v),
                    ..Default::default()
                };
                return OscOutcome::Delta(delta);
            }
            if let Some(n_str) = rest.strip_suffix("/gate") {
                let Ok(n) = n_str.parse::<usize>() else {
                    return OscOutcome::Unrecognized;
                };
                if n >= 4 || args.is_empty() {
                    return OscOutcome::Dropped;
                }
                let Some(gate) = args[0].as_i64() else {
                    return OscOutcome::Dropped;
                };
                let cur = self.snapshot.v[n];
                self.snapshot.v[n] = Voice::clamped(gate, cur.freq as i64, cur.wave as i64, cur.vol as i64);
                let delta = VoiceDelta {
                    v: Some(self.snapshot.v),
                    ..Default::default()
                };
                return OscOutcome::Delta(delta);
            }
        }

        OscOutcome::Unrecognized
    }
}

impl Default for VoiceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of decoding one OSC message against the recognized address table.
pub enum OscOutcome {
    /// A delta was produced (and, unless it was a trigger, persisted).
    Delta(VoiceDelta),
    /// The address matched a known pattern but the args were malformed.
    Dropped,
    /// The address did not match any recognized pattern.
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_change_persists() {
        let mut state = VoiceState::new();
        match state.apply_osc_message("/quasar/mode", &[OscArg::String("pwm".into())]) {
            OscOutcome::Delta(d) => assert_eq!(d.mode.as_deref(), Some("pwm")),
            _ => panic!("expected delta"),
        }
        assert_eq!(state.snapshot().mode, "pwm");
    }

    #[test]
    fn set_replaces_one_voice_and_returns_full_array() {
        let mut state = VoiceState::new();
        let args = [OscArg::Int(1), OscArg::Int(18), OscArg::Int(7), OscArg::Int(12)];
        match state.apply_osc_message("/quasar/0/set", &args) {
            OscOutcome::Delta(d) => {
                let v = d.v.expect("v present");
                assert_eq!(v[0], Voice { gate: 1, freq: 18, wave: 7, vol: 12 });
                assert_eq!(v[1], Voice::silent());
            }
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn gate_replaces_only_gate_field() {
        let mut state = VoiceState::new();
        let args = [OscArg::Int(1), OscArg::Int(18), OscArg::Int(7), OscArg::Int(12)];
        state.apply_osc_message("/quasar/0/set", &args);
        match state.apply_osc_message("/quasar/0/gate", &[OscArg::Int(0)]) {
            OscOutcome::Delta(d) => {
                let v = d.v.expect("v present");
                assert_eq!(v[0], Voice { gate: 0, freq: 18, wave: 7, vol: 12 });
            }
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn trigger_is_broadcast_only() {
        let mut state = VoiceState::new();
        let before = state.snapshot();
        match state.apply_osc_message("/quasar/trigger/kick", &[OscArg::Int(2)]) {
            OscOutcome::Delta(d) => {
                let trig = d.trig.expect("trig present");
                assert_eq!(trig[0].name, "kick");
                assert_eq!(trig[0].voice, Some(2));
            }
            _ => panic!("expected delta"),
        }
        assert_eq!(state.snapshot().v, before.v);
    }

    #[test]
    fn out_of_range_index_is_dropped() {
        let mut state = VoiceState::new();
        let args = [OscArg::Int(1), OscArg::Int(1), OscArg::Int(1), OscArg::Int(1)];
        assert!(matches!(
            state.apply_osc_message("/quasar/9/set", &args),
            OscOutcome::Dropped
        ));
    }

    #[test]
    fn unrecognized_address_is_counted_separately() {
        let mut state = VoiceState::new();
        assert!(matches!(
            state.apply_osc_message("/not/a/thing", &[]),
            OscOutcome::Unrecognized
        ));
    }

    #[test]
    fn every_field_is_clamped() {
        let v = Voice::clamped(5, 99, -3, 200);
        assert_eq!(v, Voice { gate: 1, freq: 31, wave: 0, vol: 15 });
    }
}
