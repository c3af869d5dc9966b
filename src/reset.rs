//! Soft reset handshake.
//!
//! The chip reboots as soon as it receives the reset command and never
//! acknowledges the last byte, so a failed command write is how a successful
//! reset looks from the host side. Afterwards the reset indicator has to be
//! cleared, which some bus controllers only manage on a second or third try.

use embedded_hal::i2c;

#[allow(unused_imports)]
use crate::fmt::*;
use crate::{
    registers::{map, AlertFlags, RESET_COMMAND},
    ChipError, Max1704x,
};

/// How many times the reset indicator clear is tried before giving up
pub const RESET_ALERT_CLEAR_ATTEMPTS: u8 = 3;

/// Progress of the soft reset sequence
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetState {
    Idle,
    /// The reset command is about to be written
    ResetRequested,
    /// The command write was not acknowledged, the chip is rebooting
    AcknowledgeMissing,
    /// Clearing the reset indicator, `attempt` counts from zero
    ClearingAlert { attempt: u8 },
    Ready,
}

impl<I, E> Max1704x<I>
where
    I: i2c::I2c<Error = E>,
{
    /// Runs one transition of the reset sequence
    fn reset_step(&mut self, state: ResetState) -> Result<ResetState, ChipError<E>> {
        match state {
            ResetState::Idle => Ok(ResetState::ResetRequested),

            ResetState::ResetRequested => match self.write_register(map::CMD, RESET_COMMAND) {
                Err(ChipError::I2CError(_)) => {
                    debug!("reset command not acknowledged, chip is rebooting");
                    Ok(ResetState::AcknowledgeMissing)
                }
                Ok(()) => {
                    warn!("reset command was acknowledged, the chip did not reboot");
                    Err(ChipError::ResetHandshake)
                }
                Err(e) => Err(e),
            },

            ResetState::AcknowledgeMissing => Ok(ResetState::ClearingAlert { attempt: 0 }),

            ResetState::ClearingAlert { attempt } => {
                match self.clear_alerts(AlertFlags::RESET_INDICATOR) {
                    Ok(()) => Ok(ResetState::Ready),
                    Err(ChipError::I2CError(_)) if attempt + 1 < RESET_ALERT_CLEAR_ATTEMPTS => {
                        debug!("clearing reset alert failed, attempt {}", attempt + 1);
                        Ok(ResetState::ClearingAlert {
                            attempt: attempt + 1,
                        })
                    }
                    Err(ChipError::I2CError(_)) => {
                        warn!("could not clear the reset alert");
                        Err(ChipError::AlertClear)
                    }
                    Err(e) => Err(e),
                }
            }

            ResetState::Ready => Ok(ResetState::Ready),
        }
    }

    /// Soft resets the chip, as if power had been cycled, and clears the
    /// resulting reset alert
    pub fn reset(&mut self) -> Result<(), ChipError<E>> {
        info!("performing soft reset...");

        let mut state = ResetState::Idle;
        while state != ResetState::Ready {
            state = self.reset_step(state)?;
        }

        info!("soft reset done");
        Ok(())
    }
}
