//! Binds parsed command pairs to the dispatch table.
//!
//! Each transport has its own [`CommandParser`], so a half-sent message on one
//! port never corrupts framing on another.

use log::{debug, warn};

use crate::codec::Value;
use crate::error::LinkError;
use crate::message::{CommandParser, ParseEvent};
use crate::port::Port;
use crate::settings::Settings;
use crate::store::NonVolatile;
use crate::table::{Action, Applied, Binding, DispatchTable};

/// Outcome of one completed pair (or one parse failure).
#[derive(Debug)]
pub enum BindEvent {
    /// A cell took a new value.
    Stored {
        token: &'static str,
        value: Value,
        /// Written to non-volatile storage.
        persisted: bool,
    },
    /// A callback command arrived; the caller runs it.
    Invoked {
        token: &'static str,
        action: Action,
        arg: i16,
    },
    /// The token is not in the table.
    Ignored { token: String },
    /// The pair or message was dropped.
    Rejected(LinkError),
}

/// Per-transport parsers over one dispatch table.
#[derive(Debug)]
pub struct Binder {
    table: DispatchTable,
    parsers: [CommandParser; 4],
}

impl Binder {
    pub fn new(table: DispatchTable) -> Self {
        Self {
            table,
            parsers: Default::default(),
        }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Feed one byte from `port`. Returns every event the byte completed,
    /// usually none.
    pub fn feed(
        &mut self,
        port: Port,
        byte: u8,
        settings: &mut Settings,
        store: &mut dyn NonVolatile,
    ) -> Vec<BindEvent> {
        let Some(event) = self.parsers[port.index()].feed(byte) else {
            return Vec::new();
        };
        match event {
            ParseEvent::Pair { token, raw, .. } => vec![self.bind(&token, &raw, settings, store)],
            ParseEvent::End => Vec::new(),
            ParseEvent::Error(e) => {
                debug!("{port}: {e}");
                vec![BindEvent::Rejected(e)]
            }
        }
    }

    /// Drop the partial message on one transport.
    pub fn discard(&mut self, port: Port) {
        self.parsers[port.index()].reset();
    }

    /// Start-up load: every persisted cell takes its stored value, or its
    /// factory default when nothing usable is stored.
    pub fn load(&self, settings: &mut Settings, store: &dyn NonVolatile) {
        for entry in self.table.entries().iter().filter(|e| e.persist) {
            let Binding::Cell(field) = entry.binding else {
                continue;
            };
            let value = match store.load(entry.token) {
                Some(v) if v.kind() == entry.kind => v,
                Some(v) => {
                    warn!("stored {} has kind {:?}, using default", entry.token, v.kind());
                    entry.init
                }
                None => entry.init,
            };
            settings.set(field, value);
        }
    }

    fn bind(
        &self,
        token: &str,
        raw: &str,
        settings: &mut Settings,
        store: &mut dyn NonVolatile,
    ) -> BindEvent {
        let Some(entry) = self.table.lookup(token) else {
            debug!("ignoring unknown token {token:?}");
            return BindEvent::Ignored {
                token: token.to_string(),
            };
        };
        let value = match self.table.resolve(entry, raw) {
            Ok(v) => v,
            Err(e) => {
                debug!("{e}");
                return BindEvent::Rejected(e);
            }
        };
        let applied = match self.table.apply(entry, value, settings) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("{e}");
                return BindEvent::Rejected(e.into());
            }
        };
        match applied {
            Applied::Stored(_) => {
                let persisted = entry.persist
                    && match store.save(entry.token, value) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("failed to persist {}: {e}", entry.token);
                            false
                        }
                    };
                BindEvent::Stored {
                    token: entry.token,
                    value,
                    persisted,
                }
            }
            Applied::Invoke(action, arg) => BindEvent::Invoked {
                token: entry.token,
                action,
                arg,
            },
        }
    }
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(DispatchTable::standard())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, Kind};
    use crate::message::MAX_MESSAGE_LEN;
    use crate::report::format_report;
    use crate::table::DispatchEntry;
    use crate::store::{MemoryStore, StoreError};

    struct Rig {
        binder: Binder,
        settings: Settings,
        store: MemoryStore,
    }

    impl Rig {
        fn new() -> Self {
            let binder = Binder::default();
            let settings = binder.table().factory_settings();
            Self {
                binder,
                settings,
                store: MemoryStore::new(),
            }
        }

        fn send(&mut self, port: Port, input: &[u8]) -> Vec<BindEvent> {
            let mut events = Vec::new();
            for &b in input {
                events.extend(self.binder.feed(port, b, &mut self.settings, &mut self.store));
            }
            events
        }
    }

    #[test]
    fn stores_and_persists() {
        let mut r = Rig::new();
        let events = r.send(Port::Primary, br#"{"NAME_ID":7,"ECHO":2}"#);
        assert!(matches!(
            events.as_slice(),
            [
                BindEvent::Stored { token: "NAME_ID", value: Value::Int16(7), persisted: true },
                BindEvent::Stored { token: "ECHO", value: Value::Int16(2), persisted: false },
            ]
        ));
        assert_eq!(r.settings.name_id, 7);
        assert_eq!(r.settings.echo, 2);
        assert_eq!(r.store.load("NAME_ID"), Some(Value::Int16(7)));
        assert_eq!(r.store.load("ECHO"), None);
    }

    #[test]
    fn unknown_token_changes_nothing() {
        let mut r = Rig::new();
        let before = r.settings.clone();
        let events = r.send(Port::Aux, br#"{"UNKNOWN_TOKEN":5}"#);
        assert!(matches!(events.as_slice(), [BindEvent::Ignored { token }] if token == "UNKNOWN_TOKEN"));
        assert_eq!(r.settings, before);
        assert_eq!(r.store.writes(), 0);
    }

    #[test]
    fn bad_value_keeps_prior_and_continues() {
        let mut r = Rig::new();
        let events = r.send(Port::Primary, br#"{"SENSOR":abc,"ANGLE":30}"#);
        assert!(matches!(
            events[0],
            BindEvent::Rejected(LinkError::MalformedValue { ref token, .. }) if token == "SENSOR"
        ));
        assert_eq!(r.settings.sensor_dia, 230.0);
        assert_eq!(r.settings.sensor_angle, 30);
    }

    fn message(token: &str, raw: &str) -> Vec<u8> {
        format!("{{\"{token}\":{raw}}}").into_bytes()
    }

    fn wire(value: Value) -> String {
        let mut raw = String::new();
        codec::write_value(&mut raw, value);
        raw
    }

    #[test]
    fn every_cell_binds_its_full_range() {
        let mut r = Rig::new();
        let entries: Vec<DispatchEntry> = r.binder.table().entries().to_vec();
        for entry in entries {
            let Binding::Cell(field) = entry.binding else {
                continue;
            };
            let (limits, rejected) = match entry.kind {
                Kind::Int16 => (
                    [Value::Int16(i16::MIN), Value::Int16(i16::MAX)],
                    vec!["32768".to_string(), "-32769".to_string()],
                ),
                Kind::Float => (
                    [Value::Float(f32::MIN), Value::Float(f32::MAX)],
                    vec![format!("1{}", "0".repeat(45)), format!("-1{}", "0".repeat(45))],
                ),
                Kind::Double => (
                    [Value::Double(f64::MIN), Value::Double(f64::MAX)],
                    vec![format!("1{}", "0".repeat(400)), format!("-1{}", "0".repeat(400))],
                ),
                Kind::Void => continue,
            };

            for value in limits {
                let events = r.send(Port::Primary, &message(entry.token, &wire(value)));
                assert!(
                    matches!(events.as_slice(), [BindEvent::Stored { .. }]),
                    "{}: {events:?}",
                    entry.token
                );
                assert_eq!(r.settings.get(field), value, "{}", entry.token);
                let stored = if entry.persist { Some(value) } else { None };
                assert_eq!(r.store.load(entry.token), stored, "{}", entry.token);
            }

            let prior = r.settings.get(field);
            for raw in rejected {
                let events = r.send(Port::Primary, &message(entry.token, &raw));
                assert!(
                    matches!(
                        events.as_slice(),
                        [BindEvent::Rejected(LinkError::MalformedValue { .. })]
                    ),
                    "{}: {events:?}",
                    entry.token
                );
                assert_eq!(r.settings.get(field), prior, "{}", entry.token);
                if entry.persist {
                    assert_eq!(r.store.load(entry.token), Some(prior), "{}", entry.token);
                }
            }
        }
    }

    #[test]
    fn overflowing_decimal_keeps_report_parseable() {
        let mut r = Rig::new();
        let digits = format!("1{}", "0".repeat(45));
        r.send(Port::Primary, &message("S_OF_SOUND", &digits));
        r.send(Port::Primary, &message("SENSOR", &format!("1{}", "0".repeat(400))));
        assert_eq!(r.settings.speed_of_sound, 343.42);
        assert_eq!(r.settings.sensor_dia, 230.0);
        assert_eq!(r.store.load("SENSOR"), None);

        let text = format_report(r.binder.table(), &r.settings, None);
        let mut copy = Settings::default();
        let mut events = Vec::new();
        for &b in text.as_bytes() {
            events.extend(r.binder.feed(Port::Aux, b, &mut copy, &mut r.store));
        }
        assert!(events.iter().all(|e| matches!(e, BindEvent::Stored { .. })));
        assert_eq!(copy, r.settings);
    }

    #[test]
    fn duplicate_tokens_last_wins() {
        let mut r = Rig::new();
        r.send(Port::Primary, br#"{"NAME_ID":1,"NAME_ID":2}"#);
        assert_eq!(r.settings.name_id, 2);
        assert_eq!(r.store.load("NAME_ID"), Some(Value::Int16(2)));
    }

    #[test]
    fn callbacks_are_returned() {
        let mut r = Rig::new();
        let events = r.send(Port::Display, br#"{"PAPER":3,"SHOW":}"#);
        assert!(matches!(
            events.as_slice(),
            [
                BindEvent::Invoked { action: Action::AdvancePaper, arg: 3, .. },
                BindEvent::Invoked { action: Action::Show, arg: 0, .. },
            ]
        ));
    }

    #[test]
    fn ports_frame_independently() {
        let mut r = Rig::new();
        assert!(r.send(Port::Primary, br#"{"NAME_ID":"#).is_empty());
        let events = r.send(Port::Aux, br#"{"ECHO":1}"#);
        assert_eq!(events.len(), 1);
        let events = r.send(Port::Primary, b"9}");
        assert!(matches!(events.as_slice(), [BindEvent::Stored { token: "NAME_ID", .. }]));
        assert_eq!(r.settings.name_id, 9);
    }

    #[test]
    fn discard_drops_one_port_only() {
        let mut r = Rig::new();
        r.send(Port::Wifi, br#"{"NAME_ID":4"#);
        r.send(Port::Primary, br#"{"ECHO":"#);
        r.binder.discard(Port::Wifi);
        assert!(r.send(Port::Wifi, b"}").is_empty());
        r.send(Port::Primary, b"3}");
        assert_eq!(r.settings.name_id, 0);
        assert_eq!(r.settings.echo, 3);
    }

    #[test]
    fn too_long_is_rejected() {
        let mut r = Rig::new();
        let mut input = b"{\"NAME_ID\":".to_vec();
        input.extend(std::iter::repeat_n(b'1', MAX_MESSAGE_LEN + 10));
        let events = r.send(Port::Primary, &input);
        assert!(matches!(
            events.as_slice(),
            [BindEvent::Rejected(LinkError::MessageTooLong { .. })]
        ));
        r.send(Port::Primary, br#"}{"NAME_ID":5}"#);
        assert_eq!(r.settings.name_id, 5);
    }

    #[test]
    fn load_prefers_stored_values() {
        let binder = Binder::default();
        let mut store = MemoryStore::new();
        store.save("NAME_ID", Value::Int16(12)).unwrap();
        store.save("SENSOR", Value::Int16(1)).unwrap();
        // Not persisted; the stored value must not be applied.
        store.save("ECHO", Value::Int16(9)).unwrap();

        let mut settings = Settings::default();
        binder.load(&mut settings, &store);
        assert_eq!(settings.name_id, 12);
        assert_eq!(settings.sensor_dia, 230.0);
        assert_eq!(settings.sensor_angle, 45);
        assert_eq!(settings.echo, 0);
    }

    struct FailingStore;

    impl NonVolatile for FailingStore {
        fn save(&mut self, _token: &str, _value: Value) -> Result<(), StoreError> {
            Err(std::io::Error::other("flash worn out").into())
        }

        fn load(&self, _token: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn failed_save_keeps_ram_value() {
        let mut binder = Binder::default();
        let mut settings = Settings::default();
        let mut store = FailingStore;
        let mut events = Vec::new();
        for &b in br#"{"NAME_ID":6}"# {
            events.extend(binder.feed(Port::Primary, b, &mut settings, &mut store));
        }
        assert!(matches!(
            events.as_slice(),
            [BindEvent::Stored { persisted: false, .. }]
        ));
        assert_eq!(settings.name_id, 6);
    }
}
