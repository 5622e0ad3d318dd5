//! Token dispatch table.
//!
//! Each [`DispatchEntry`] binds one case-sensitive token to either a settings
//! cell or a callback [`Action`], together with its storage kind, persistence
//! flag and factory default. Tables are validated once, at construction.

use log::trace;

use crate::codec::{self, Kind, Value};
use crate::error::{LinkError, Result, TableError};
use crate::settings::{Field, Settings};

/// Commands that trigger behaviour instead of storing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Restore every factory default (argument must be [`FACTORY_RESET_KEY`]).
    FactoryReset,
    /// Report every setting on all transports.
    Show,
    /// Clear the shot history.
    ClearHistory,
    /// Advance the paper backer (argument = number of steps, 0 = configured).
    AdvancePaper,
    /// Enter trip-point calibration.
    Calibrate,
}

/// Confirmation value required by `{"INIT":1234}`.
pub const FACTORY_RESET_KEY: i16 = 1234;

/// What a token is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Cell(Field),
    Callback(Action),
}

/// One recognised command token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchEntry {
    pub token: &'static str,
    pub kind: Kind,
    pub binding: Binding,
    /// Save to non-volatile storage after every successful bind.
    pub persist: bool,
    /// Factory default.
    pub init: Value,
}

impl DispatchEntry {
    /// A plain settable cell. The kind is taken from `init`.
    pub const fn cell(token: &'static str, field: Field, persist: bool, init: Value) -> Self {
        let kind = match init {
            Value::Void => Kind::Void,
            Value::Int16(_) => Kind::Int16,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
        };
        Self {
            token,
            kind,
            binding: Binding::Cell(field),
            persist,
            init,
        }
    }

    /// A trigger command, invoked with the converted integer value.
    pub const fn callback(token: &'static str, kind: Kind, action: Action) -> Self {
        Self {
            token,
            kind,
            binding: Binding::Callback(action),
            persist: false,
            init: Value::Void,
        }
    }

    pub fn is_cell(&self) -> bool {
        matches!(self.binding, Binding::Cell(_))
    }
}

/// Result of [`DispatchTable::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    /// The cell now holds the value.
    Stored(Field),
    /// The caller must run the action with this argument.
    Invoke(Action, i16),
}

// ---------------------------------------------------------------------------
// Standard table
// ---------------------------------------------------------------------------

const fn int(token: &'static str, field: Field, persist: bool, init: i16) -> DispatchEntry {
    DispatchEntry::cell(token, field, persist, Value::Int16(init))
}

/// The firmware's command set, sorted by token.
pub const STANDARD_ENTRIES: &[DispatchEntry] = &[
    int("ANGLE", Field::SensorAngle, true, 45),
    DispatchEntry::callback("CAL", Kind::Void, Action::Calibrate),
    int("CALIBREx10", Field::CalibreX10, true, 45),
    DispatchEntry::callback("CLEAR", Kind::Void, Action::ClearHistory),
    int("DIP", Field::DipSwitch, true, 0),
    int("EAST_X", Field::EastX, true, 0),
    int("EAST_Y", Field::EastY, true, 0),
    int("ECHO", Field::Echo, false, 0),
    DispatchEntry::callback("INIT", Kind::Int16, Action::FactoryReset),
    int("LED_BRIGHT", Field::LedPwm, true, 50),
    int("MFS", Field::Multifunction, true, 0),
    int("NAME_ID", Field::NameId, true, 0),
    int("NORTH_X", Field::NorthX, true, 0),
    int("NORTH_Y", Field::NorthY, true, 0),
    DispatchEntry::callback("PAPER", Kind::Int16, Action::AdvancePaper),
    int("PAPER_STEP", Field::PaperStep, true, 0),
    int("PAPER_TIME", Field::PaperTime, true, 0),
    int("POWER_SAVE", Field::PowerSave, true, 30),
    DispatchEntry::cell("S_OF_SOUND", Field::SpeedOfSound, false, Value::Float(343.42)),
    int("SEND_MISS", Field::SendMiss, true, 0),
    DispatchEntry::cell("SENSOR", Field::SensorDia, true, Value::Double(230.0)),
    DispatchEntry::callback("SHOW", Kind::Void, Action::Show),
    int("SN", Field::SerialNumber, true, 0),
    int("SOUTH_X", Field::SouthX, true, 0),
    int("SOUTH_Y", Field::SouthY, true, 0),
    int("TEST", Field::Test, false, 0),
    int("TRGT_1_RINGx10", Field::RingX10, true, 1555),
    int("WEST_X", Field::WestX, true, 0),
    int("WEST_Y", Field::WestY, true, 0),
];

// ---------------------------------------------------------------------------
// DispatchTable
// ---------------------------------------------------------------------------

/// A validated, ordered set of dispatch entries.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: Vec<DispatchEntry>,
}

impl DispatchTable {
    /// Validate and build a table.
    pub fn new(entries: Vec<DispatchEntry>) -> std::result::Result<Self, TableError> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.token == entry.token) {
                return Err(TableError::DuplicateToken { token: entry.token });
            }
            match entry.binding {
                Binding::Callback(_) => {
                    if matches!(entry.kind, Kind::Float | Kind::Double) {
                        return Err(TableError::CallbackKind {
                            token: entry.token,
                            kind: entry.kind,
                        });
                    }
                }
                Binding::Cell(field) => {
                    for got in [entry.kind, entry.init.kind()] {
                        if got != field.kind() {
                            return Err(TableError::KindMismatch {
                                token: entry.token,
                                expected: field.kind(),
                                got,
                            });
                        }
                    }
                }
            }
        }
        Ok(Self { entries })
    }

    /// The firmware's own table.
    pub fn standard() -> Self {
        // Validated by `standard_table_is_valid` below.
        Self {
            entries: STANDARD_ENTRIES.to_vec(),
        }
    }

    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact, case-sensitive token lookup.
    pub fn lookup(&self, token: &str) -> Option<&DispatchEntry> {
        self.entries.iter().find(|e| e.token == token)
    }

    /// Convert raw value text according to the entry's kind.
    pub fn resolve(&self, entry: &DispatchEntry, raw: &str) -> Result<Value> {
        codec::convert(entry.kind, raw).ok_or_else(|| LinkError::malformed_value(entry.token, raw))
    }

    /// Write the bound cell, or hand back the callback to run.
    ///
    /// `value` must be of the entry's kind; anything else is rejected with
    /// [`TableError::KindMismatch`] and leaves `settings` untouched.
    pub fn apply(
        &self,
        entry: &DispatchEntry,
        value: Value,
        settings: &mut Settings,
    ) -> std::result::Result<Applied, TableError> {
        let mismatch = |expected: Kind| TableError::KindMismatch {
            token: entry.token,
            expected,
            got: value.kind(),
        };
        if value.kind() != entry.kind {
            return Err(mismatch(entry.kind));
        }
        match entry.binding {
            Binding::Cell(field) => {
                if !settings.set(field, value) {
                    return Err(mismatch(field.kind()));
                }
                trace!("{} = {:?}", entry.token, value);
                Ok(Applied::Stored(field))
            }
            Binding::Callback(action) => Ok(Applied::Invoke(action, value.as_int())),
        }
    }

    /// Settings holding every cell's factory default.
    pub fn factory_settings(&self) -> Settings {
        let mut settings = Settings::default();
        for entry in &self.entries {
            if let Binding::Cell(field) = entry.binding {
                settings.set(field, entry.init);
            }
        }
        settings
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
