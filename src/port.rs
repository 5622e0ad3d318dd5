use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// The transports a target talks on, in polling priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Port {
    /// Primary serial (USB / monitor)
    Primary = 0x01,
    /// Auxiliary connector serial
    Aux = 0x02,
    /// Slave display serial
    Display = 0x04,
    /// WiFi bridge module
    Wifi = 0x08,
}

impl Port {
    /// All ports in fixed polling order.
    pub const ALL: [Port; 4] = [Port::Primary, Port::Aux, Port::Display, Port::Wifi];

    pub fn mask(self) -> u8 {
        self as u8
    }

    /// Position in [`Port::ALL`], used to index per-port state.
    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Aux => 1,
            Self::Display => 2,
            Self::Wifi => 3,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "SERIAL"),
            Self::Aux => write!(f, "AUX"),
            Self::Display => write!(f, "DISPLAY"),
            Self::Wifi => write!(f, "WIFI"),
        }
    }
}

/// Membership bitmask over ports. Values are ORed; ordering is irrelevant.
///
/// Broadcast targets use the three serial bits. The WiFi bit only appears when
/// reporting which ports have pending input: a broadcast always includes the
/// bridge when one is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortSet(u8);

impl PortSet {
    pub const EMPTY: PortSet = PortSet(0);
    pub const SERIAL: PortSet = PortSet(Port::Primary as u8);
    pub const AUX: PortSet = PortSet(Port::Aux as u8);
    pub const DISPLAY: PortSet = PortSet(Port::Display as u8);
    pub const WIFI: PortSet = PortSet(Port::Wifi as u8);
    /// Every serial transport.
    pub const ALL: PortSet = PortSet(0x07);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, port: Port) -> bool {
        self.0 & port.mask() != 0
    }

    pub fn insert(&mut self, port: Port) {
        self.0 |= port.mask();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Member ports in polling order.
    pub fn iter(self) -> impl Iterator<Item = Port> {
        Port::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl From<Port> for PortSet {
    fn from(port: Port) -> Self {
        Self(port.mask())
    }
}

impl BitOr for PortSet {
    type Output = PortSet;

    fn bitor(self, rhs: PortSet) -> PortSet {
        PortSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for PortSet {
    fn bitor_assign(&mut self, rhs: PortSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|p| p.to_string()).collect();
        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_the_three_serial_ports() {
        let all = PortSet::SERIAL | PortSet::AUX | PortSet::DISPLAY;
        assert_eq!(all, PortSet::ALL);
        assert!(!PortSet::ALL.contains(Port::Wifi));
        assert_eq!(PortSet::ALL.bits(), 7);
    }

    #[test]
    fn iter_follows_polling_order() {
        let set = PortSet::WIFI | PortSet::DISPLAY | PortSet::SERIAL;
        let ports: Vec<Port> = set.iter().collect();
        assert_eq!(ports, vec![Port::Primary, Port::Display, Port::Wifi]);
    }

    #[test]
    fn display_names() {
        assert_eq!(PortSet::EMPTY.to_string(), "-");
        assert_eq!((PortSet::AUX | PortSet::WIFI).to_string(), "AUX|WIFI");
    }

    #[test]
    fn index_matches_all_order() {
        for (i, port) in Port::ALL.iter().enumerate() {
            assert_eq!(port.index(), i);
        }
    }
}
