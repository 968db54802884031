//! Identifiers used throughout the desktop-multiplexing protocol: the
//! 128-bit `SessionId` and `PaneId`, and the per-session `Sequence` counter.

use std::fmt;

/// Opaque 128-bit session identifier, cryptographically random, never
/// reused within a process (§3 "SessionID").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u128);

impl SessionId {
    /// The all-zero sentinel used on the wire to request a brand new session.
    pub const ZERO: Self = Self(0);

    /// Mint a new cryptographically random session ID.
    ///
    /// Collision probability over the 128-bit space is astronomically low;
    /// the `Manager` treats an actual collision as a fatal programming
    /// error rather than something this constructor needs to guard against.
    #[must_use]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(u128::from_be_bytes(bytes))
    }

    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl Default for SessionId {
    /// Defaults to the zero sentinel, matching the wire encoding of "request
    /// a new session".
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Opaque 128-bit pane identifier assigned by the desktop; the zero value
/// is the sentinel for "no pane" (§3 "PaneID").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneId(u128);

impl PaneId {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Parse the 32-hex-char form produced by `Display` back into a
    /// `PaneId`, as used by the persisted-snapshot `id` field (§6).
    pub fn from_hex(s: &str) -> Result<Self, std::num::ParseIntError> {
        u128::from_str_radix(s, 16).map(Self)
    }
}

impl Default for PaneId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Monotonic per-session sequence counter (§3 "Sequence"). Starts at 0;
/// the first enqueued diff is assigned sequence 1. Wraparound is not a
/// concern at `u64` width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence(u64);

impl Sequence {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Return the next sequence in order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Sequence> for u64 {
    fn from(value: Sequence) -> Self {
        value.0
    }
}
