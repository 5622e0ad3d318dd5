//! The configuration aggregate bound by the dispatch table.
//!
//! One [`Settings`] value holds every operator-tunable cell. It is owned by
//! the control loop and lent to the binder (which writes it) and to the shot
//! path (which reads the calibration offsets).

use crate::codec::{Kind, Value};

// ---------------------------------------------------------------------------
// DIP switch flags
// ---------------------------------------------------------------------------

/// Go to calibration mode.
pub const CALIBRATE: u8 = 1 << 0;
/// When CALIBRATE is asserted, use the lower trip point.
pub const CAL_LOW: u8 = 1 << 1;
/// When CALIBRATE is asserted, use the higher trip point.
pub const CAL_HIGH: u8 = 1 << 2;
/// Show the verbose software trace.
pub const VERBOSE_TRACE: u8 = 1 << 3;

/// Flags enabled regardless of switch or software setting.
pub const ALWAYS_ON: u8 = 0;

/// Effective DIP flags after combining hardware and software sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DipFlags(u8);

impl DipFlags {
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn calibrate(self) -> bool {
        self.0 & CALIBRATE != 0
    }

    pub fn cal_low(self) -> bool {
        self.0 & CAL_LOW != 0
    }

    pub fn cal_high(self) -> bool {
        self.0 & CAL_HIGH != 0
    }

    pub fn verbose_trace(self) -> bool {
        self.0 & VERBOSE_TRACE != 0
    }
}

// ---------------------------------------------------------------------------
// Calibration offsets
// ---------------------------------------------------------------------------

/// One signed offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Offset {
    pub x: i16,
    pub y: i16,
}

/// Per-quadrant calibration offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    pub north: Offset,
    pub east: Offset,
    pub south: Offset,
    pub west: Offset,
}

impl Calibration {
    /// Apply the net trim of all four pairs to a raw coordinate.
    pub fn correct(&self, x: f64, y: f64) -> (f64, f64) {
        let pairs = [self.north, self.east, self.south, self.west];
        let dx: i32 = pairs.iter().map(|o| i32::from(o.x)).sum();
        let dy: i32 = pairs.iter().map(|o| i32::from(o.y)).sum();
        (x + f64::from(dx), y + f64::from(dy))
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Every settable cell of the target.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    /// Software DIP switch bits
    pub dip_switch: i16,
    /// Sensor circle diameter (mm)
    pub sensor_dia: f64,
    /// Speed of sound (m/s)
    pub speed_of_sound: f32,
    /// Angle the sensors are rotated through (deg)
    pub sensor_angle: i16,
    /// Paper backer motor on-time (ms)
    pub paper_time: i16,
    /// Echo selection
    pub echo: i16,
    /// Self test to perform
    pub test: i16,
    /// Pellet calibre (mm x10)
    pub calibre_x10: i16,
    pub calibration: Calibration,
    /// Name identifier
    pub name_id: i16,
    /// Size of the 1 ring (mm x10)
    pub ring_x10: i16,
    /// LED brightness (%)
    pub led_pwm: i16,
    /// Minutes before the LEDs are turned off
    pub power_save: i16,
    /// Send the miss message when non-zero
    pub send_miss: i16,
    pub serial_number: i16,
    /// Number of times the paper motor is stepped
    pub paper_step: i16,
    /// Multifunction switch operation
    pub multifunction: i16,
}

/// Names one cell of [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DipSwitch,
    SensorDia,
    SpeedOfSound,
    SensorAngle,
    PaperTime,
    Echo,
    Test,
    CalibreX10,
    NorthX,
    NorthY,
    EastX,
    EastY,
    SouthX,
    SouthY,
    WestX,
    WestY,
    NameId,
    RingX10,
    LedPwm,
    PowerSave,
    SendMiss,
    SerialNumber,
    PaperStep,
    Multifunction,
}

impl Field {
    /// Native storage kind of the cell.
    pub fn kind(self) -> Kind {
        match self {
            Field::SensorDia => Kind::Double,
            Field::SpeedOfSound => Kind::Float,
            _ => Kind::Int16,
        }
    }
}

impl Settings {
    /// Read a cell.
    pub fn get(&self, field: Field) -> Value {
        match field {
            Field::SensorDia => Value::Double(self.sensor_dia),
            Field::SpeedOfSound => Value::Float(self.speed_of_sound),
            other => self.int_value(other).map_or(Value::Void, Value::Int16),
        }
    }

    /// Write a cell. Returns `false` (and writes nothing) when `value` is not
    /// of the cell's kind.
    pub fn set(&mut self, field: Field, value: Value) -> bool {
        match (field, value) {
            (Field::SensorDia, Value::Double(v)) => self.sensor_dia = v,
            (Field::SpeedOfSound, Value::Float(v)) => self.speed_of_sound = v,
            (other, Value::Int16(v)) => match self.int_cell(other) {
                Some(cell) => *cell = v,
                None => return false,
            },
            _ => return false,
        }
        true
    }

    /// Combine the hardware switch with the software DIP value.
    ///
    /// Policy: a flag is on when the switch, the software value or
    /// [`ALWAYS_ON`] sets it. Neither source can clear a flag the other sets.
    pub fn dip_flags(&self, hardware: u8) -> DipFlags {
        let software = (self.dip_switch as u16 & 0x0F) as u8;
        DipFlags((hardware & 0x0F) | software | ALWAYS_ON)
    }

    fn int_value(&self, field: Field) -> Option<i16> {
        let cal = &self.calibration;
        let v = match field {
            Field::DipSwitch => self.dip_switch,
            Field::SensorAngle => self.sensor_angle,
            Field::PaperTime => self.paper_time,
            Field::Echo => self.echo,
            Field::Test => self.test,
            Field::CalibreX10 => self.calibre_x10,
            Field::NorthX => cal.north.x,
            Field::NorthY => cal.north.y,
            Field::EastX => cal.east.x,
            Field::EastY => cal.east.y,
            Field::SouthX => cal.south.x,
            Field::SouthY => cal.south.y,
            Field::WestX => cal.west.x,
            Field::WestY => cal.west.y,
            Field::NameId => self.name_id,
            Field::RingX10 => self.ring_x10,
            Field::LedPwm => self.led_pwm,
            Field::PowerSave => self.power_save,
            Field::SendMiss => self.send_miss,
            Field::SerialNumber => self.serial_number,
            Field::PaperStep => self.paper_step,
            Field::Multifunction => self.multifunction,
            Field::SensorDia | Field::SpeedOfSound => return None,
        };
        Some(v)
    }

    fn int_cell(&mut self, field: Field) -> Option<&mut i16> {
        let cal = &mut self.calibration;
        let cell = match field {
            Field::DipSwitch => &mut self.dip_switch,
            Field::SensorAngle => &mut self.sensor_angle,
            Field::PaperTime => &mut self.paper_time,
            Field::Echo => &mut self.echo,
            Field::Test => &mut self.test,
            Field::CalibreX10 => &mut self.calibre_x10,
            Field::NorthX => &mut cal.north.x,
            Field::NorthY => &mut cal.north.y,
            Field::EastX => &mut cal.east.x,
            Field::EastY => &mut cal.east.y,
            Field::SouthX => &mut cal.south.x,
            Field::SouthY => &mut cal.south.y,
            Field::WestX => &mut cal.west.x,
            Field::WestY => &mut cal.west.y,
            Field::NameId => &mut self.name_id,
            Field::RingX10 => &mut self.ring_x10,
            Field::LedPwm => &mut self.led_pwm,
            Field::PowerSave => &mut self.power_save,
            Field::SendMiss => &mut self.send_miss,
            Field::SerialNumber => &mut self.serial_number,
            Field::PaperStep => &mut self.paper_step,
            Field::Multifunction => &mut self.multifunction,
            Field::SensorDia | Field::SpeedOfSound => return None,
        };
        Some(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip() {
        let mut s = Settings::default();
        assert!(s.set(Field::NorthX, Value::Int16(-3)));
        assert!(s.set(Field::SensorDia, Value::Double(231.5)));
        assert!(s.set(Field::SpeedOfSound, Value::Float(340.0)));
        assert_eq!(s.get(Field::NorthX), Value::Int16(-3));
        assert_eq!(s.calibration.north.x, -3);
        assert_eq!(s.get(Field::SensorDia), Value::Double(231.5));
        assert_eq!(s.get(Field::SpeedOfSound), Value::Float(340.0));
    }

    #[test]
    fn set_rejects_wrong_kind() {
        let mut s = Settings::default();
        assert!(!s.set(Field::SensorDia, Value::Int16(5)));
        assert!(!s.set(Field::NameId, Value::Double(5.0)));
        assert!(!s.set(Field::NameId, Value::Void));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn calibration_is_additive() {
        let cal = Calibration {
            north: Offset { x: -3, y: 5 },
            ..Default::default()
        };
        assert_eq!(cal.correct(10.0, 10.0), (7.0, 15.0));

        let cal = Calibration {
            north: Offset { x: 1, y: 0 },
            east: Offset { x: 2, y: -1 },
            south: Offset { x: 0, y: -2 },
            west: Offset { x: -4, y: 0 },
        };
        assert_eq!(cal.correct(0.0, 0.0), (-1.0, -3.0));
    }

    #[test]
    fn dip_flags_or_hardware_and_software() {
        let mut s = Settings::default();
        assert_eq!(s.dip_flags(0).bits(), 0);

        let flags = s.dip_flags(CALIBRATE);
        assert!(flags.calibrate());
        assert!(!flags.cal_low());

        s.dip_switch = i16::from(CAL_LOW | VERBOSE_TRACE);
        let flags = s.dip_flags(CALIBRATE);
        assert!(flags.calibrate());
        assert!(flags.cal_low());
        assert!(flags.verbose_trace());
        assert!(!flags.cal_high());

        // Software cannot clear a hardware flag.
        s.dip_switch = 0;
        assert!(s.dip_flags(CAL_HIGH).cal_high());
    }
}
