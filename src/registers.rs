//! These are low-level definitions for MAX17048 and similar chips

use crate::fmt::bitflags;
use byteorder::{BigEndian, ByteOrder};

/// Register width as seen on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Width {
    Byte,
    /// Two bytes, most significant first
    Word,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

/// Addressing metadata of a single register
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register {
    pub offset: u8,
    pub width: Width,
    pub signed: bool,
    pub access: Access,
}

impl Register {
    const fn new(offset: u8, width: Width, access: Access) -> Self {
        Self {
            offset,
            width,
            signed: false,
            access,
        }
    }

    const fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Raw value from the bytes following the register offset
    pub fn decode(&self, bytes: &[u8]) -> u16 {
        match self.width {
            Width::Byte => bytes[0] as u16,
            Width::Word => BigEndian::read_u16(bytes),
        }
    }

    /// Builds the write request: offset followed by the big endian payload.
    /// Returns the buffer and the number of meaningful bytes in it
    pub fn encode(&self, value: u16) -> ([u8; 3], usize) {
        let mut request = [self.offset, 0, 0];

        match self.width {
            Width::Byte => request[1] = value as u8,
            Width::Word => BigEndian::write_u16(&mut request[1..], value),
        }

        (request, 1 + self.width.bytes())
    }
}

/// This is a list of registers supported by the gauge
pub mod map {
    use super::{Access, Register, Width};

    pub const VCELL: Register = Register::new(0x02, Width::Word, Access::ReadOnly);
    pub const SOC: Register = Register::new(0x04, Width::Word, Access::ReadOnly);
    // The upper byte of the MODE word, the lower one is reserved
    pub const MODE: Register = Register::new(0x06, Width::Byte, Access::ReadWrite);
    pub const VERSION: Register = Register::new(0x08, Width::Word, Access::ReadOnly);
    pub const HIBRT_HIB: Register = Register::new(0x0A, Width::Byte, Access::ReadWrite);
    pub const HIBRT_ACT: Register = Register::new(0x0B, Width::Byte, Access::ReadWrite);
    pub const CONFIG: Register = Register::new(0x0C, Width::Word, Access::ReadWrite);
    pub const VALRT_MIN: Register = Register::new(0x14, Width::Byte, Access::ReadWrite);
    pub const VALRT_MAX: Register = Register::new(0x15, Width::Byte, Access::ReadWrite);
    pub const CRATE: Register = Register::new(0x16, Width::Word, Access::ReadOnly).signed();
    pub const VRESET: Register = Register::new(0x18, Width::Byte, Access::ReadWrite);
    pub const CHIP_ID: Register = Register::new(0x19, Width::Byte, Access::ReadOnly);
    pub const STATUS: Register = Register::new(0x1A, Width::Byte, Access::ReadWrite);
    pub const CMD: Register = Register::new(0xFE, Width::Word, Access::WriteOnly);
}

/// Written to CMD, reboots the chip as if power had been removed
pub const RESET_COMMAND: u16 = 0x5400;

/// A unit-scaled view of a bit field inside a register
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quantity {
    pub register: Register,
    pub shift: u8,
    pub bits: u8,
    /// Physical value of one raw count
    pub lsb: f32,
    /// Largest physical value accepted by `encode`
    pub max: f32,
}

impl Quantity {
    const fn whole(register: Register, lsb: f32) -> Self {
        let bits = match register.width {
            Width::Byte => 8,
            Width::Word => 16,
        };

        Self {
            register,
            shift: 0,
            bits,
            lsb,
            max: 0.0,
        }
    }

    const fn field(register: Register, shift: u8, bits: u8, lsb: f32) -> Self {
        Self {
            register,
            shift,
            bits,
            lsb,
            max: 0.0,
        }
    }

    const fn up_to(mut self, max: f32) -> Self {
        self.max = max;
        self
    }

    /// Bits of the register occupied by this quantity
    pub const fn mask(&self) -> u16 {
        (((1u32 << self.bits) - 1) << self.shift) as u16
    }

    pub const fn max_raw(&self) -> u16 {
        ((1u32 << self.bits) - 1) as u16
    }

    /// Whether the quantity spans the whole register, so no read-modify-write is needed
    pub const fn is_whole(&self) -> bool {
        self.shift == 0 && self.bits as usize == self.register.width.bytes() * 8
    }

    pub fn decode(&self, raw: u16) -> f32 {
        let field = (raw & self.mask()) >> self.shift;

        if self.register.signed && self.bits == 16 {
            field as i16 as f32 * self.lsb
        } else {
            field as f32 * self.lsb
        }
    }

    /// Converts the physical value into the field's raw count, already shifted
    /// into place. The fractional count is truncated, not rounded.
    /// Returns `None` for values outside `0 ..= max` (NaN included)
    pub fn encode(&self, value: f32) -> Option<u16> {
        if self.register.access == Access::ReadOnly || !(0.0..=self.max).contains(&value) {
            return None;
        }

        let count = ((value / self.lsb) as u32).min(self.max_raw() as u32) as u16;
        Some(count << self.shift)
    }
}

/// Quantities exposed by the driver
pub mod quantities {
    use super::{map, Quantity};

    /// 78.125uV per LSB
    pub const CELL_VOLTAGE: Quantity = Quantity::whole(map::VCELL, 78.125 / 1_000_000.0);
    /// 1/256 % per LSB
    pub const CELL_PERCENT: Quantity = Quantity::whole(map::SOC, 1.0 / 256.0);
    /// 0.208 %/hr per LSB
    pub const CHARGE_RATE: Quantity = Quantity::whole(map::CRATE, 0.208);
    /// 40mV per LSB, bit 0 is the comparator disable flag
    pub const RESET_VOLTAGE: Quantity = Quantity::field(map::VRESET, 1, 7, 0.04).up_to(5.08);
    /// 20mV per LSB
    pub const VOLTAGE_ALERT_MIN: Quantity = Quantity::whole(map::VALRT_MIN, 0.02).up_to(5.1);
    pub const VOLTAGE_ALERT_MAX: Quantity = Quantity::whole(map::VALRT_MAX, 0.02).up_to(5.1);
    /// 1.25mV per LSB
    pub const ACTIVITY_THRESHOLD: Quantity =
        Quantity::whole(map::HIBRT_ACT, 0.00125).up_to(0.31875);
    /// 0.208 %/hr per LSB
    pub const HIBERNATION_THRESHOLD: Quantity =
        Quantity::whole(map::HIBRT_HIB, 0.208).up_to(53.04);
}

bitflags! {
    /// Alert latches of the STATUS register. The chip keeps them set until the host clears them
    pub struct AlertFlags: u8 {
        const SOC_CHANGE = 1 << 5;
        const SOC_LOW = 1 << 4;
        const VOLTAGE_RESET = 1 << 3;
        const VOLTAGE_LOW = 1 << 2;
        const VOLTAGE_HIGH = 1 << 1;
        const RESET_INDICATOR = 1 << 0;
    }
}

bitflags! {
    /// Upper byte of the MODE register
    pub struct ModeFlags: u8 {
        const QUICK_START = 1 << 6;
        const ENABLE_SLEEP = 1 << 5;
        const HIBERNATING = 1 << 4;
    }
}

bitflags! {
    /// Control bits of the CONFIG word. The upper byte holds RCOMP
    pub struct ConfigFlags: u16 {
        const SLEEP = 1 << 7;
        const SOC_CHANGE_ALERT = 1 << 6;
        const ALERT = 1 << 5;
    }
}

bitflags! {
    pub struct ResetVoltageFlags: u8 {
        const COMPARATOR_DISABLED = 1 << 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_voltage_matches_lsb() {
        for raw in [0u16, 1, 0x0100, 0xA000, 0xD1C0, 0xFFFF] {
            let expected = raw as f32 * 78.125 / 1_000_000.0;
            let volts = quantities::CELL_VOLTAGE.decode(raw);
            assert!((volts - expected).abs() <= expected * f32::EPSILON + f32::EPSILON);
        }
    }

    #[test]
    fn charge_rate_is_signed() {
        assert_eq!(quantities::CHARGE_RATE.decode(0xFFFF), -0.208);
        assert_eq!(quantities::CHARGE_RATE.decode(10), 10.0 * 0.208);
    }

    #[test]
    fn reset_voltage_field_leaves_comparator_bit() {
        let q = quantities::RESET_VOLTAGE;

        assert_eq!(q.mask(), 0xFE);
        assert_eq!(q.decode(0x97), 0x4B as f32 * 0.04);
        assert_eq!(q.encode(3.0), Some(75 << 1));
        assert!(!q.is_whole());
        assert!(quantities::VOLTAGE_ALERT_MIN.is_whole());
    }

    #[test]
    fn encode_truncates() {
        // 3.719 / 0.02 = 185.95
        assert_eq!(quantities::VOLTAGE_ALERT_MIN.encode(3.719), Some(185));
        // 0.0024 / 0.00125 = 1.92
        assert_eq!(quantities::ACTIVITY_THRESHOLD.encode(0.0024), Some(1));
    }

    #[test]
    fn encode_rejects_out_of_range() {
        assert_eq!(quantities::VOLTAGE_ALERT_MIN.encode(-0.1), None);
        assert_eq!(quantities::VOLTAGE_ALERT_MAX.encode(5.2), None);
        assert_eq!(quantities::RESET_VOLTAGE.encode(6.0), None);
        assert_eq!(quantities::ACTIVITY_THRESHOLD.encode(0.32), None);
        assert_eq!(quantities::HIBERNATION_THRESHOLD.encode(53.1), None);
        assert_eq!(quantities::HIBERNATION_THRESHOLD.encode(f32::NAN), None);
        assert_eq!(quantities::CELL_VOLTAGE.encode(1.0), None);
    }

    #[test]
    fn range_limits_are_accepted() {
        assert!(quantities::RESET_VOLTAGE.encode(5.08).is_some());
        assert!(quantities::VOLTAGE_ALERT_MAX.encode(5.1).is_some());
        assert!(quantities::ACTIVITY_THRESHOLD.encode(0.31875).is_some());
        assert!(quantities::HIBERNATION_THRESHOLD.encode(53.04).is_some());
        assert_eq!(quantities::VOLTAGE_ALERT_MIN.encode(0.0), Some(0));
    }

    #[test]
    fn word_registers_are_big_endian() {
        assert_eq!(map::VERSION.decode(&[0x00, 0x12]), 0x0012);
        assert_eq!(map::STATUS.decode(&[0x21]), 0x21);

        let (request, len) = map::CMD.encode(RESET_COMMAND);
        assert_eq!(&request[..len], &[0xFE, 0x54, 0x00]);

        let (request, len) = map::VALRT_MAX.encode(0xAB);
        assert_eq!(&request[..len], &[0x15, 0xAB]);
    }
}
