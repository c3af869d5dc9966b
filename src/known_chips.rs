//! The VERSION register is the only identification the chips offer. MAX17048 and
//! MAX17049 report the same family code, so the driver treats them alike.

/// Family code found in the upper 12 bits of VERSION
const MAX1704X_FAMILY: u16 = 0x0010;
const FAMILY_MASK: u16 = 0xFFF0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipType {
    /// MAX17048 or MAX17049, with the silicon revision from the low nibble
    MAX1704x { revision: u8 },
    Unknown(u16),
}

impl From<u16> for ChipType {
    fn from(version: u16) -> Self {
        if version & FAMILY_MASK == MAX1704X_FAMILY {
            Self::MAX1704x {
                revision: (version & !FAMILY_MASK) as u8,
            }
        } else {
            Self::Unknown(version)
        }
    }
}

impl ChipType {
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::MAX1704x { .. })
    }
}
