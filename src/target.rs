//! The target's control loop glue.
//!
//! [`Target`] owns the transports, the binder, the settings aggregate, the
//! shot history and the persistence backend, and runs callback commands.
//! Hardware actions it cannot perform itself (paper drive, trip-point
//! calibration) are queued as [`Effect`]s for the enclosing loop.

use log::{debug, info, warn};

use crate::aggregator::{Aggregator, BroadcastReport};
use crate::binder::{BindEvent, Binder};
use crate::error::Result;
use crate::history::{ShotHistory, ShotRecord};
use crate::port::Port;
use crate::report;
use crate::settings::{DipFlags, Settings};
use crate::store::NonVolatile;
use crate::table::{Action, Binding, DispatchTable, FACTORY_RESET_KEY};

/// Work requested from outside the command core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Drive the paper backer. 0 means the configured step count.
    AdvancePaper(i16),
    /// Enter trip-point calibration.
    Calibrate,
}

/// Effects kept when the enclosing loop falls behind. Older ones are dropped.
pub const MAX_PENDING_EFFECTS: usize = 16;

pub struct Target<S> {
    aggregator: Aggregator,
    binder: Binder,
    settings: Settings,
    history: ShotHistory,
    store: S,
    effects: Vec<Effect>,
}

impl<S: NonVolatile> Target<S> {
    /// Build a target over the standard table and load persisted settings.
    pub fn new(aggregator: Aggregator, store: S) -> Self {
        Self::with_table(aggregator, store, DispatchTable::standard())
    }

    pub fn with_table(aggregator: Aggregator, store: S, table: DispatchTable) -> Self {
        let binder = Binder::new(table);
        let mut settings = binder.table().factory_settings();
        binder.load(&mut settings, &store);
        debug!("settings loaded: {settings:?}");
        Self {
            aggregator,
            binder,
            settings,
            history: ShotHistory::new(),
            store,
            effects: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: ShotHistory) -> Self {
        self.history = history;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> &ShotHistory {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn aggregator(&mut self) -> &mut Aggregator {
        &mut self.aggregator
    }

    /// Effective DIP flags for the given hardware switch reading.
    pub fn dip_flags(&self, hardware: u8) -> DipFlags {
        self.settings.dip_flags(hardware)
    }

    /// Effects queued since the last call. The enclosing loop is expected to
    /// drain these every pass; at most [`MAX_PENDING_EFFECTS`] are kept.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Consume at most one byte. Returns `false` when nothing was waiting.
    pub fn poll(&mut self) -> bool {
        let Some(incoming) = self.aggregator.next_byte() else {
            return false;
        };
        let events = self.binder.feed(
            incoming.port,
            incoming.byte,
            &mut self.settings,
            &mut self.store,
        );
        for event in events {
            match event {
                BindEvent::Invoked { action, arg, .. } => self.run_action(action, arg),
                BindEvent::Stored { token, value, .. } => {
                    debug!("{}: {token} = {value:?}", incoming.port)
                }
                BindEvent::Ignored { .. } | BindEvent::Rejected(_) => {}
            }
        }
        true
    }

    /// Consume up to `budget` bytes; returns how many were processed.
    pub fn service(&mut self, budget: usize) -> usize {
        let mut n = 0;
        while n < budget && self.poll() {
            n += 1;
        }
        n
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Broadcast the listed settings (all cells when `None`).
    pub fn report(&mut self, tokens: Option<&[&str]>) -> BroadcastReport {
        report::report(&mut self.aggregator, self.binder.table(), &self.settings, tokens)
    }

    /// Calibrate, record and broadcast a shot.
    pub fn record_shot(&mut self, x: f64, y: f64) -> ShotRecord {
        let (x, y) = self.settings.calibration.correct(x, y);
        let record = self.history.push(x, y);
        let text = report::format_shot(&record);
        self.aggregator.broadcast_all(text.as_bytes());
        record
    }

    /// Count a miss. It is broadcast only when `SEND_MISS` is set.
    pub fn record_miss(&mut self) -> u32 {
        let shot = self.history.skip();
        if self.settings.send_miss != 0 {
            let text = report::format_miss(shot);
            self.aggregator.broadcast_all(text.as_bytes());
        }
        shot
    }

    /// Reset the WiFi bridge and drop its partial message.
    pub fn restart_wifi(&mut self) -> Result<()> {
        self.binder.discard(Port::Wifi);
        self.aggregator.restart_wifi()
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    fn run_action(&mut self, action: Action, arg: i16) {
        match action {
            Action::FactoryReset => self.factory_reset(arg),
            Action::Show => {
                self.report(None);
            }
            Action::ClearHistory => {
                info!("clearing {} shots", self.history.len());
                self.history.clear();
            }
            Action::AdvancePaper => self.push_effect(Effect::AdvancePaper(arg)),
            Action::Calibrate => self.push_effect(Effect::Calibrate),
        }
    }

    fn push_effect(&mut self, effect: Effect) {
        if self.effects.len() == MAX_PENDING_EFFECTS {
            warn!("effect queue full, dropping {:?}", self.effects[0]);
            self.effects.remove(0);
        }
        self.effects.push(effect);
    }

    fn factory_reset(&mut self, key: i16) {
        if key != FACTORY_RESET_KEY {
            warn!("factory reset refused: expected {FACTORY_RESET_KEY}, got {key}");
            return;
        }
        let table = self.binder.table();
        self.settings = table.factory_settings();
        for entry in table.entries().iter().filter(|e| e.persist) {
            if let Binding::Cell(_) = entry.binding {
                if let Err(e) = self.store.save(entry.token, entry.init) {
                    warn!("failed to persist {}: {e}", entry.token);
                }
            }
        }
        info!("factory defaults restored");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
