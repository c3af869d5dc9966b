#![no_std]

//! A small driver for Maxim (Analog Devices) battery gauges (written for MAX17048)

pub(crate) mod fmt;

pub mod known_chips;
pub mod registers;
mod reset;

#[cfg(test)]
mod fake_gauge;

use embedded_hal::i2c;
use fmt::*;
use known_chips::ChipType;
use registers::*;

pub use registers::{AlertFlags, ConfigFlags, ModeFlags};
pub use reset::{ResetState, RESET_ALERT_CLEAR_ATTEMPTS};

/// The only address the chips answer on
pub const DEFAULT_ADDRESS: u8 = 0x36;

/// Chip error type
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipError<E> {
    I2CError(E),
    /// VERSION does not belong to the MAX1704x family, carries what was read
    Identification(u16),
    /// The chip acknowledged the reset command, so it did not reboot
    ResetHandshake,
    /// Every attempt to clear the reset indicator after a reset failed
    AlertClear,
    /// The requested physical value does not fit the register. Nothing was written
    OutOfRange,
}

impl<E> From<E> for ChipError<E> {
    fn from(e: E) -> Self {
        Self::I2CError(e)
    }
}

/// Generates the reader and the clearing operation of a single alert latch
macro_rules! alert_accessors {
    ($($(#[$doc:meta])* $flag:ident => $get:ident, $clear:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $get(&mut self) -> Result<bool, ChipError<E>> {
                Ok(self.alert_flags()?.contains(AlertFlags::$flag))
            }

            $(#[$doc])*
            ///
            /// Clears the latch, leaving the other alerts untouched
            pub fn $clear(&mut self) -> Result<(), ChipError<E>> {
                self.clear_alerts(AlertFlags::$flag)
            }
        )*
    };
}

/// Chip handle
pub struct Max1704x<I> {
    i2c: I,
    addr: u8,
}

impl<I, E> Max1704x<I>
where
    I: i2c::I2c<Error = E>,
{
    /*
     * Every register access is a single transaction. Reads set the register
     * pointer and fetch 1 or 2 bytes, writes send the pointer followed by
     * the big endian payload.
     */
    fn read_register(&mut self, register: Register) -> Result<u16, ChipError<E>> {
        let mut response = [0, 0];
        let response = &mut response[..register.width.bytes()];

        self.i2c
            .write_read(self.addr, &[register.offset], response)?;

        Ok(register.decode(response))
    }

    fn write_register(&mut self, register: Register, value: u16) -> Result<(), ChipError<E>> {
        let (request, len) = register.encode(value);
        self.i2c.write(self.addr, &request[..len])?;
        Ok(())
    }

    /// Replaces the bits selected by `mask`, keeping the rest of the register as the chip has it
    fn modify_register(
        &mut self,
        register: Register,
        mask: u16,
        bits: u16,
    ) -> Result<(), ChipError<E>> {
        let current = self.read_register(register)?;
        self.write_register(register, (current & !mask) | (bits & mask))
    }

    fn read_flag(&mut self, register: Register, mask: u16) -> Result<bool, ChipError<E>> {
        Ok(self.read_register(register)? & mask != 0)
    }

    fn write_flag(&mut self, register: Register, mask: u16, set: bool) -> Result<(), ChipError<E>> {
        self.modify_register(register, mask, if set { mask } else { 0 })
    }

    fn read_quantity(&mut self, quantity: &Quantity) -> Result<f32, ChipError<E>> {
        let raw = self.read_register(quantity.register)?;
        Ok(quantity.decode(raw))
    }

    /// Validation happens before any bus traffic
    fn write_quantity(&mut self, quantity: &Quantity, value: f32) -> Result<(), ChipError<E>> {
        let raw = quantity.encode(value).ok_or(ChipError::OutOfRange)?;

        if quantity.is_whole() {
            self.write_register(quantity.register, raw)
        } else {
            self.modify_register(quantity.register, quantity.mask(), raw)
        }
    }

    /// Tries to communicate with the chip and checks the VERSION signature
    pub fn probe(&mut self) -> Result<ChipType, ChipError<E>> {
        let version = self.chip_version()?;
        let chip = ChipType::from(version);

        if !chip.is_supported() {
            info!("unexpected chip version 0x{:x}", version);
            return Err(ChipError::Identification(version));
        }

        info!("found MAX1704x, version 0x{:x}", version);
        Ok(chip)
    }

    /// Creates the driver instance.
    ///
    /// Identifies the chip, soft resets it and leaves it awake with sleep disabled.
    /// No handle is returned if any of these steps fails
    pub fn new(i2c: I, addr: u8) -> Result<Self, ChipError<E>> {
        let mut gauge = Self { i2c, addr };

        gauge.probe()?;
        gauge.reset()?;
        gauge.set_enable_sleep(false)?;
        gauge.set_sleep(false)?;

        Ok(gauge)
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Gives the bus back
    pub fn release(self) -> I {
        self.i2c
    }

    /// Production version of the IC
    pub fn chip_version(&mut self) -> Result<u16, ChipError<E>> {
        self.read_register(map::VERSION)
    }

    /// Factory-programmed identifier of the die
    pub fn chip_id(&mut self) -> Result<u8, ChipError<E>> {
        Ok(self.read_register(map::CHIP_ID)? as u8)
    }

    /// Raw CONFIG word, RCOMP in the upper byte
    pub fn config(&mut self) -> Result<u16, ChipError<E>> {
        self.read_register(map::CONFIG)
    }

    /// Reads the cell voltage in volts
    pub fn cell_voltage(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::CELL_VOLTAGE)
    }

    /// Reads the state of charge, in percent of 'fullness'
    pub fn cell_percent(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::CELL_PERCENT)
    }

    /// Charge (positive) or discharge (negative) rate in percent per hour
    pub fn charge_rate(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::CHARGE_RATE)
    }

    /// Voltage below which the chip considers the battery removed or swapped
    pub fn reset_voltage(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::RESET_VOLTAGE)
    }

    /// Accepts 0 to 5.08 V in 40 mV steps
    pub fn set_reset_voltage(&mut self, volts: f32) -> Result<(), ChipError<E>> {
        self.write_quantity(&quantities::RESET_VOLTAGE, volts)
    }

    /// Lower limit of the voltage alert window
    pub fn voltage_alert_min(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::VOLTAGE_ALERT_MIN)
    }

    /// Accepts 0 to 5.1 V in 20 mV steps
    pub fn set_voltage_alert_min(&mut self, volts: f32) -> Result<(), ChipError<E>> {
        self.write_quantity(&quantities::VOLTAGE_ALERT_MIN, volts)
    }

    /// Upper limit of the voltage alert window
    pub fn voltage_alert_max(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::VOLTAGE_ALERT_MAX)
    }

    /// Accepts 0 to 5.1 V in 20 mV steps
    pub fn set_voltage_alert_max(&mut self, volts: f32) -> Result<(), ChipError<E>> {
        self.write_quantity(&quantities::VOLTAGE_ALERT_MAX, volts)
    }

    /// Voltage change that counts as activity and keeps the chip out of hibernation
    pub fn activity_threshold(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::ACTIVITY_THRESHOLD)
    }

    /// Accepts 0 to 0.31875 V in 1.25 mV steps
    pub fn set_activity_threshold(&mut self, volts: f32) -> Result<(), ChipError<E>> {
        self.write_quantity(&quantities::ACTIVITY_THRESHOLD, volts)
    }

    /// Charge rate (%/hr) below which the chip enters hibernation
    pub fn hibernation_threshold(&mut self) -> Result<f32, ChipError<E>> {
        self.read_quantity(&quantities::HIBERNATION_THRESHOLD)
    }

    /// Accepts 0 to 53.04 %/hr in 0.208 %/hr steps
    pub fn set_hibernation_threshold(&mut self, percent: f32) -> Result<(), ChipError<E>> {
        self.write_quantity(&quantities::HIBERNATION_THRESHOLD, percent)
    }

    /// Sets both hibernation thresholds to their maximum, the chip hibernates
    /// at its next evaluation. Check `hibernating` for the outcome
    pub fn hibernate(&mut self) -> Result<(), ChipError<E>> {
        self.write_register(map::HIBRT_HIB, 0xFF)?;
        self.write_register(map::HIBRT_ACT, 0xFF)
    }

    /// Zeroes both hibernation thresholds, the chip never hibernates on its own
    pub fn wake(&mut self) -> Result<(), ChipError<E>> {
        self.write_register(map::HIBRT_HIB, 0)?;
        self.write_register(map::HIBRT_ACT, 0)
    }

    /// Whether the chip reports being in hibernate mode
    pub fn hibernating(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(map::MODE, ModeFlags::HIBERNATING.bits() as u16)
    }

    pub fn enable_sleep(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(map::MODE, ModeFlags::ENABLE_SLEEP.bits() as u16)
    }

    /// Allows the chip to enter sleep mode through `set_sleep`
    pub fn set_enable_sleep(&mut self, enable: bool) -> Result<(), ChipError<E>> {
        self.write_flag(map::MODE, ModeFlags::ENABLE_SLEEP.bits() as u16, enable)
    }

    pub fn quick_start(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(map::MODE, ModeFlags::QUICK_START.bits() as u16)
    }

    /// Restarts the fuel-gauge calculations from the current cell voltage
    pub fn set_quick_start(&mut self, start: bool) -> Result<(), ChipError<E>> {
        self.write_flag(map::MODE, ModeFlags::QUICK_START.bits() as u16, start)
    }

    pub fn sleep(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(map::CONFIG, ConfigFlags::SLEEP.bits())
    }

    /// Forces the chip in or out of sleep mode. Only effective with `enable_sleep` set
    pub fn set_sleep(&mut self, sleep: bool) -> Result<(), ChipError<E>> {
        self.write_flag(map::CONFIG, ConfigFlags::SLEEP.bits(), sleep)
    }

    pub fn comparator_disabled(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(
            map::VRESET,
            ResetVoltageFlags::COMPARATOR_DISABLED.bits() as u16,
        )
    }

    /// Turns off the analog comparator watching the reset voltage, saving power
    pub fn set_comparator_disabled(&mut self, disabled: bool) -> Result<(), ChipError<E>> {
        self.write_flag(
            map::VRESET,
            ResetVoltageFlags::COMPARATOR_DISABLED.bits() as u16,
            disabled,
        )
    }

    /// Whether any alert is pending (ALRT bit of CONFIG)
    pub fn active_alert(&mut self) -> Result<bool, ChipError<E>> {
        self.read_flag(map::CONFIG, ConfigFlags::ALERT.bits())
    }

    /// Snapshot of all alert latches at once
    pub fn alert_flags(&mut self) -> Result<AlertFlags, ChipError<E>> {
        let status = self.read_register(map::STATUS)?;
        Ok(AlertFlags::from_bits_truncate(status as u8))
    }

    /// Alert latches as a 6 bit mask, see `AlertFlags` for the layout
    pub fn alert_reason(&mut self) -> Result<u8, ChipError<E>> {
        Ok(self.alert_flags()?.bits())
    }

    /// Clears the given alert latches in one read-modify-write of STATUS
    pub fn clear_alerts(&mut self, alerts: AlertFlags) -> Result<(), ChipError<E>> {
        self.modify_register(map::STATUS, alerts.bits() as u16, 0)
    }

    alert_accessors! {
        /// The chip was powered up or reset and needs configuring
        RESET_INDICATOR => reset_alert, clear_reset_alert;
        /// VCELL went above the voltage alert maximum
        VOLTAGE_HIGH => voltage_high_alert, clear_voltage_high_alert;
        /// VCELL went below the voltage alert minimum
        VOLTAGE_LOW => voltage_low_alert, clear_voltage_low_alert;
        /// VCELL dropped below the reset voltage
        VOLTAGE_RESET => voltage_reset_alert, clear_voltage_reset_alert;
        /// SOC crossed the empty alert threshold
        SOC_LOW => soc_low_alert, clear_soc_low_alert;
        /// SOC changed by at least 1%
        SOC_CHANGE => soc_change_alert, clear_soc_change_alert;
    }
}
