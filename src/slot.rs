//! Slot Scheduler (§4.D) — owns the 256-slot array and per-slot tickers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock as SyncRwLock;
use tokio::sync::mpsc;

use crate::error::QuasarError;
use crate::frame_parser::FrameParser;
use crate::pulsar::PulsarChannel;
use crate::stats::Stats;

pub const SLOT_COUNT: usize = 256;

struct SlotEntry {
    fps: u16,
    cols: u16,
    rows: u16,
    sprites: u32,
    shutdown_tx: mpsc::Sender<()>,
}

pub struct SlotScheduler {
    slots: SyncRwLock<Vec<Option<SlotEntry>>>,
    pulsar: Arc<PulsarChannel>,
    frame_parser: Arc<parking_lot::Mutex<FrameParser>>,
    stats: Arc<parking_lot::Mutex<Stats>>,
}

impl SlotScheduler {
    pub fn new(
        pulsar: Arc<PulsarChannel>,
        frame_parser: Arc<parking_lot::Mutex<FrameParser>>,
        stats: Arc<parking_lot::Mutex<Stats>>,
    ) -> Self {
        let mut slots = Vec::with_capacity(SLOT_COUNT);
        slots.resize_with(SLOT_COUNT, || None);
        Self {
            slots: SyncRwLock::new(slots),
            pulsar,
            frame_parser,
            stats,
        }
    }

    pub async fn init_slot(&self, slot: u16, cols: u16, rows: u16, fps: u16) -> Result<(), QuasarError> {
        if slot as usize >= SLOT_COUNT {
            return Err(QuasarError::SlotOutOfRange(slot));
        }
        {
            let guard = self.slots.read();
            if guard[slot as usize].is_some() {
                return Err(QuasarError::SlotAlreadyAllocated(slot));
            }
        }

        self.pulsar.ensure_started().await?;
        self.pulsar
            .send_command(format!("{slot} INIT {cols} {rows} {fps}"))
            .await?;

        let period_ms = (1000u64 / fps.max(1) as u64).max(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.spawn_ticker(slot, period_ms, shutdown_rx);

        let mut guard = self.slots.write();
        if guard[slot as usize].is_some() {
            // Raced with a concurrent init for the same slot; keep the
            // first winner and let this one's ticker shut itself down.
            return Err(QuasarError::SlotAlreadyAllocated(slot));
        }
        guard[slot as usize] = Some(SlotEntry {
            fps,
            cols,
            rows,
            sprites: 0,
            shutdown_tx,
        });
        Ok(())
    }

    fn spawn_ticker(&self, slot: u16, period_ms: u64, mut shutdown_rx: mpsc::Receiver<()>) {
        let pulsar = self.pulsar.clone();
        let frame_parser = self.frame_parser.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let fp = frame_parser.clone();
                        let result = pulsar
                            .send_tick_and_render(slot, period_ms, move || fp.lock().on_render(slot))
                            .await;
                        if result.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    /// Cancels the ticker, sends `DESTROY`, clears state. Idempotent.
    pub async fn destroy_slot(&self, slot: u16) {
        if slot as usize >= SLOT_COUNT {
            return;
        }
        let entry = {
            let mut guard = self.slots.write();
            guard[slot as usize].take()
        };
        if let Some(entry) = entry {
            let _ = entry.shutdown_tx.send(()).await;
            let _ = self.pulsar.send_command(format!("{slot} DESTROY")).await;
        }
    }

    pub async fn spawn_sprite(
        &self,
        slot: u16,
        kind: &str,
        x: i32,
        y: i32,
        len0: i32,
        dtheta: i32,
        valence: i32,
    ) -> Result<(), QuasarError> {
        let allocated = {
            let mut guard = self.slots.write();
            match guard.get_mut(slot as usize).and_then(Option::as_mut) {
                Some(entry) => {
                    entry.sprites += 1;
                    true
                }
                None => false,
            }
        };
        if !allocated {
            return Err(QuasarError::SlotNotAllocated(slot));
        }
        self.pulsar
            .send_command(format!("{slot} SPAWN {kind} {x} {y} {len0} {dtheta} {valence}"))
            .await
    }

    /// Stops every allocated slot's ticker without sending `DESTROY` —
    /// PULSAR is assumed already gone (§7 "PULSAR unexpected exit").
    pub async fn clear_all(&self) {
        let entries: Vec<SlotEntry> = {
            let mut guard = self.slots.write();
            guard.iter_mut().filter_map(|slot| slot.take()).collect()
        };
        for entry in entries {
            let _ = entry.shutdown_tx.send(()).await;
        }
    }

    pub fn is_allocated(&self, slot: u16) -> bool {
        (slot as usize) < SLOT_COUNT && self.slots.read()[slot as usize].is_some()
    }
}
