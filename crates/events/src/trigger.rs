//! Event kinds as a bitset.

use std::{
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};

/// Set of event kinds.
///
/// An event carries exactly one bit; a subscriber declares interest with the
/// union of the kinds it cares about, and receives an event when
/// `mask & event.kind` is non-empty.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerMask(u64);

impl TriggerMask {
    pub const NONE: Self = Self(0);

    /// Debounce timer expiry.
    pub const TIMER: Self = Self(1 << 0);
    /// Configuration was replaced.
    pub const CONFIG_CHANGED: Self = Self(1 << 1);
    /// Flushed accumulator window.
    pub const AGGREGATED: Self = Self(1 << 2);
    pub const SERVER_STARTED: Self = Self(1 << 3);
    pub const SERVER_STOPPED: Self = Self(1 << 4);
    pub const PLAYER_JOINED: Self = Self(1 << 5);
    pub const PLAYER_LEFT: Self = Self(1 << 6);
    pub const CHAT_MESSAGE: Self = Self(1 << 7);
    /// Simulation entity moved, changed owner or state. Fires at tick rate.
    pub const ENTITY_CHANGED: Self = Self(1 << 8);
    /// One line item of a trade transaction.
    pub const TRADE_ITEM: Self = Self(1 << 9);
    /// A managed remote item was deleted out of band.
    pub const ITEM_DELETED: Self = Self(1 << 10);

    pub const ALL: Self = Self((1 << 11) - 1);

    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::TIMER, "TIMER"),
        (Self::CONFIG_CHANGED, "CONFIG_CHANGED"),
        (Self::AGGREGATED, "AGGREGATED"),
        (Self::SERVER_STARTED, "SERVER_STARTED"),
        (Self::SERVER_STOPPED, "SERVER_STOPPED"),
        (Self::PLAYER_JOINED, "PLAYER_JOINED"),
        (Self::PLAYER_LEFT, "PLAYER_LEFT"),
        (Self::CHAT_MESSAGE, "CHAT_MESSAGE"),
        (Self::ENTITY_CHANGED, "ENTITY_CHANGED"),
        (Self::TRADE_ITEM, "TRADE_ITEM"),
        (Self::ITEM_DELETED, "ITEM_DELETED"),
    ];

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Build a mask from raw bits, dropping bits with no named kind.
    pub const fn from_bits_truncate(bits: u64) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `self & other != 0`: the dispatch test.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Single-bit masks set in `self`, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        Self::NAMES
            .iter()
            .map(|(kind, _)| *kind)
            .filter(move |kind| self.contains(*kind))
    }

    /// Name of a single-kind mask.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
    }
}

impl BitOr for TriggerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TriggerMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TriggerMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for TriggerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for kind in self.iter() {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(kind.name().unwrap_or("?"))?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for TriggerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TriggerMask({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_declares_and_and_tests() {
        let interest = TriggerMask::PLAYER_JOINED | TriggerMask::PLAYER_LEFT;
        assert!(interest.intersects(TriggerMask::PLAYER_LEFT));
        assert!(!interest.intersects(TriggerMask::CHAT_MESSAGE));
        assert_eq!(interest & TriggerMask::PLAYER_JOINED, TriggerMask::PLAYER_JOINED);
        assert!((interest & TriggerMask::TIMER).is_empty());
    }

    #[test]
    fn names_cover_every_bit() {
        assert_eq!(TriggerMask::ALL.iter().count(), 11);
        assert!(TriggerMask::ALL.iter().all(|k| k.name().is_some()));
        assert_eq!(TriggerMask::from_bits_truncate(u64::MAX), TriggerMask::ALL);
    }

    #[test]
    fn display_lists_kinds() {
        let mask = TriggerMask::TIMER | TriggerMask::ENTITY_CHANGED;
        assert_eq!(mask.to_string(), "TIMER | ENTITY_CHANGED");
        assert_eq!(TriggerMask::NONE.to_string(), "NONE");
        assert_eq!(mask.name(), None);
    }
}
