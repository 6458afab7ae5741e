//! Link addresses.
//!
//! Each side of the link has a point-to-point address and a broadcast
//! address; [`ALL`] reaches both.

/// The host processor.
pub const HOST: u8 = 0x01;

/// Every host on the link.
pub const HOST_BROADCAST: u8 = 0x80;

/// The PMU.
pub const PMU: u8 = 0x81;

/// Every PMU on the link.
pub const PMU_BROADCAST: u8 = 0xFE;

/// Every device on the link.
pub const ALL: u8 = 0xFF;

/// Which side of the link a channel speaks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The host processor talking to the PMU.
    #[default]
    Host,
    /// The PMU side (emulators, test fixtures).
    Pmu,
}

impl Endpoint {
    /// Address written into `source` of outgoing frames.
    pub const fn address(self) -> u8 {
        match self {
            Endpoint::Host => HOST,
            Endpoint::Pmu => PMU,
        }
    }

    /// Address written into `dest` of outgoing frames.
    pub const fn peer(self) -> u8 {
        match self {
            Endpoint::Host => PMU,
            Endpoint::Pmu => HOST,
        }
    }

    /// Broadcast address this side listens on.
    pub const fn broadcast(self) -> u8 {
        match self {
            Endpoint::Host => HOST_BROADCAST,
            Endpoint::Pmu => PMU_BROADCAST,
        }
    }

    /// The opposite side of the link.
    pub const fn opposite(self) -> Endpoint {
        match self {
            Endpoint::Host => Endpoint::Pmu,
            Endpoint::Pmu => Endpoint::Host,
        }
    }

    /// Whether a frame with this addressing is meant for us.
    pub fn accepts(self, source: u8, dest: u8) -> bool {
        source == self.peer() && (dest == self.address() || dest == self.broadcast() || dest == ALL)
    }
}

/// Returns a human-readable name for an address byte.
pub fn address_name(address: u8) -> &'static str {
    match address {
        HOST => "HOST",
        HOST_BROADCAST => "HOST_BROADCAST",
        PMU => "PMU",
        PMU_BROADCAST => "PMU_BROADCAST",
        ALL => "ALL",
        _ => "UNKNOWN",
    }
}
