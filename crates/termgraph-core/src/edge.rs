//! Taxonomy edges and the packed flag word.
//!
//! Word layout (bit 31 is never set):
//!
//! ```text
//!  31 30       24 23                     0
//! ┌──┬───────────┬────────────────────────┐
//! │0 │ flags (7) │ value / stamp (24)     │
//! └──┴───────────┴────────────────────────┘
//!
//!  24 STATED   25 INFERRED   26 SEMEME   27 NON_DL_REL
//!  28 CONCEPT_STATUS   29 RESERVED_29   30 RESERVED_30
//! ```
//!
//! This is the stored format of adjacency records, so encode/decode must stay
//! bit-exact.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::stamp::StampSequence;
use crate::NodeId;

pub const FLAG_SHIFT: u32 = 24;
pub const VALUE_MASK: u32 = 0x00FF_FFFF;
pub const FLAG_MASK: u32 = 0x7F00_0000;
pub const SIGN_BIT: u32 = 0x8000_0000;

/// The seven taxonomy flags, stored in bits 0..=6 (word bits 24..=30).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct TaxonomyFlags(u8);

impl TaxonomyFlags {
    pub const STATED: Self = Self(1 << 0);
    pub const INFERRED: Self = Self(1 << 1);
    pub const SEMEME: Self = Self(1 << 2);
    pub const NON_DL_REL: Self = Self(1 << 3);
    pub const CONCEPT_STATUS: Self = Self(1 << 4);
    pub const RESERVED_29: Self = Self(1 << 5);
    pub const RESERVED_30: Self = Self(1 << 6);

    const NAMED: [(TaxonomyFlags, &'static str); 7] = [
        (Self::STATED, "stated"),
        (Self::INFERRED, "inferred"),
        (Self::SEMEME, "sememe"),
        (Self::NON_DL_REL, "non_dl_rel"),
        (Self::CONCEPT_STATUS, "concept_status"),
        (Self::RESERVED_29, "reserved_29"),
        (Self::RESERVED_30, "reserved_30"),
    ];

    const ALL_BITS: u8 = 0x7F;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `None` if bit 7 (which would land on the sign bit) is set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL_BITS != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// The flags shifted into word position.
    pub const fn to_word_bits(self) -> u32 {
        (self.0 as u32) << FLAG_SHIFT
    }

    /// Flags carried by a packed word (value bits ignored).
    pub const fn from_word(word: u32) -> Self {
        Self(((word & FLAG_MASK) >> FLAG_SHIFT) as u8)
    }

    /// Pack `value` and these flags into one word.
    pub fn pack(self, value: u32) -> Result<u32> {
        if value & !VALUE_MASK != 0 {
            return Err(CoreError::StampOutOfRange { value });
        }
        Ok(self.to_word_bits() | value)
    }

    /// Split a packed word into `(value, flags)`.
    pub fn unpack(word: u32) -> Result<(u32, Self)> {
        if word & SIGN_BIT != 0 {
            return Err(CoreError::integrity(
                0,
                format!("taxonomy word {word:#010x} has the sign bit set"),
            ));
        }
        Ok((word & VALUE_MASK, Self::from_word(word)))
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for TaxonomyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for TaxonomyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TaxonomyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl FromStr for TaxonomyFlags {
    type Err = String;

    /// Parse a single flag name, e.g. `"stated"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::NAMED
            .into_iter()
            .find(|(_, name)| *name == wanted)
            .map(|(flag, _)| flag)
            .ok_or_else(|| format!("unknown taxonomy flag `{s}`"))
    }
}

/// One entry of an adjacency record: `origin -[flags @ stamp]-> destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaxonomyEdge {
    pub destination: NodeId,
    pub stamp: StampSequence,
    pub flags: TaxonomyFlags,
}

impl TaxonomyEdge {
    pub fn new(destination: NodeId, stamp: StampSequence, flags: TaxonomyFlags) -> Self {
        Self {
            destination,
            stamp,
            flags,
        }
    }

    /// `[destination, flags << 24 | stamp]`
    pub fn to_words(&self) -> Result<[u32; 2]> {
        Ok([self.destination, self.flags.pack(self.stamp.raw())?])
    }

    pub fn from_words(destination: u32, packed: u32) -> Result<Self> {
        let (stamp, flags) = TaxonomyFlags::unpack(packed)?;
        Ok(Self {
            destination,
            stamp: StampSequence::new(stamp),
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn each_flag_lands_on_its_documented_bit() {
        let expected = [
            (TaxonomyFlags::STATED, 24),
            (TaxonomyFlags::INFERRED, 25),
            (TaxonomyFlags::SEMEME, 26),
            (TaxonomyFlags::NON_DL_REL, 27),
            (TaxonomyFlags::CONCEPT_STATUS, 28),
            (TaxonomyFlags::RESERVED_29, 29),
            (TaxonomyFlags::RESERVED_30, 30),
        ];
        for (flag, bit) in expected {
            assert_eq!(flag.to_word_bits(), 1u32 << bit, "{flag:?}");
            assert_eq!(TaxonomyFlags::from_word(1u32 << bit), flag);
        }
    }

    #[test]
    fn stated_plus_concept_status_round_trips() {
        let flags = TaxonomyFlags::STATED | TaxonomyFlags::CONCEPT_STATUS;
        let word = flags.pack(0x0012_3456).unwrap();
        assert_eq!(word, 0x1112_3456);
        assert_eq!(word & SIGN_BIT, 0);

        let (value, decoded) = TaxonomyFlags::unpack(word).unwrap();
        assert_eq!(value, 0x0012_3456);
        assert_eq!(decoded, flags);
        assert_eq!(
            decoded.names().collect::<Vec<_>>(),
            vec!["stated", "concept_status"]
        );
    }

    #[test]
    fn all_flags_never_touch_the_sign_bit() {
        let all = TaxonomyFlags::from_bits(0x7F).unwrap();
        let word = all.pack(VALUE_MASK).unwrap();
        assert_eq!(word, 0x7FFF_FFFF);
        assert!(TaxonomyFlags::from_bits(0x80).is_none());
    }

    #[test]
    fn oversized_values_and_sign_bit_words_are_rejected() {
        assert_eq!(
            TaxonomyFlags::STATED.pack(0x0100_0000),
            Err(CoreError::StampOutOfRange { value: 0x0100_0000 })
        );
        assert!(matches!(
            TaxonomyFlags::unpack(0x8000_0001),
            Err(CoreError::DataIntegrity { .. })
        ));
    }

    #[test]
    fn flag_names_parse() {
        assert_eq!("Inferred".parse::<TaxonomyFlags>(), Ok(TaxonomyFlags::INFERRED));
        assert_eq!(" non_dl_rel ".parse::<TaxonomyFlags>(), Ok(TaxonomyFlags::NON_DL_REL));
        assert!("isa".parse::<TaxonomyFlags>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            failure_persistence: None,
            ..ProptestConfig::default()
        })]

        #[test]
        fn pack_unpack_is_bit_exact(bits in 0u8..=0x7F, value in 0u32..=VALUE_MASK) {
            let flags = TaxonomyFlags::from_bits(bits).unwrap();
            let word = flags.pack(value).unwrap();
            prop_assert_eq!(word & SIGN_BIT, 0);
            prop_assert_eq!(TaxonomyFlags::unpack(word).unwrap(), (value, flags));
        }

        #[test]
        fn edge_words_round_trip(
            dest in any::<u32>(),
            stamp in 1u32..=VALUE_MASK,
            bits in 0u8..=0x7F,
        ) {
            let flags = TaxonomyFlags::from_bits(bits).unwrap();
            let edge = TaxonomyEdge::new(dest, StampSequence::new(stamp), flags);
            let [d, packed] = edge.to_words().unwrap();
            prop_assert_eq!(TaxonomyEdge::from_words(d, packed).unwrap(), edge);
        }
    }
}
