//! An in-memory MAX17048 answering on the I2C interface, with hooks to
//! misbehave the way real chips and bus controllers do

use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

use crate::{
    registers::{map, AlertFlags, RESET_COMMAND},
    DEFAULT_ADDRESS,
};

pub struct FakeGauge {
    pub address: u8,
    pub registers: [u8; 256],
    /// Acknowledge the reset command instead of rebooting
    pub ack_reset: bool,
    /// Number of upcoming STATUS accesses that fail
    pub status_failures: u8,
    pub transactions: usize,
    /// Register writes carrying a payload
    pub writes: usize,
    pub resets: usize,
    pointer: u8,
}

impl FakeGauge {
    pub fn new(version: u16) -> Self {
        let mut registers = [0; 256];

        registers[0x08..0x0A].copy_from_slice(&version.to_be_bytes());
        // Power-on defaults
        registers[0x0A..0x0C].copy_from_slice(&[0x80, 0x30]);
        registers[0x0C..0x0E].copy_from_slice(&[0x97, 0x1C]);
        registers[0x14..0x16].copy_from_slice(&[0x00, 0xFF]);
        registers[0x18] = 0x96;
        registers[0x19] = 0x01;
        registers[0x1A] = AlertFlags::RESET_INDICATOR.bits();

        Self {
            address: DEFAULT_ADDRESS,
            registers,
            ack_reset: false,
            status_failures: 0,
            transactions: 0,
            writes: 0,
            resets: 0,
            pointer: 0,
        }
    }

    fn access(&mut self, register: u8) -> Result<(), ErrorKind> {
        if register == map::STATUS.offset && self.status_failures > 0 {
            self.status_failures -= 1;
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }

        Ok(())
    }

    fn reboot(&mut self) {
        self.resets += 1;
        self.registers[map::STATUS.offset as usize] |= AlertFlags::RESET_INDICATOR.bits();
    }
}

impl i2c::ErrorType for FakeGauge {
    type Error = ErrorKind;
}

impl i2c::I2c for FakeGauge {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        self.transactions += 1;

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&register, payload)) = bytes.split_first() else {
                        continue;
                    };

                    self.pointer = register;
                    self.access(register)?;

                    if payload.is_empty() {
                        continue;
                    }

                    self.writes += 1;

                    if register == map::CMD.offset && payload[..] == RESET_COMMAND.to_be_bytes()[..]
                    {
                        self.reboot();
                        if self.ack_reset {
                            continue;
                        }
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }

                    for (index, byte) in payload.iter().enumerate() {
                        self.registers[register.wrapping_add(index as u8) as usize] = *byte;
                    }
                }
                Operation::Read(buffer) => {
                    self.access(self.pointer)?;

                    for (index, byte) in buffer.iter_mut().enumerate() {
                        *byte = self.registers[self.pointer.wrapping_add(index as u8) as usize];
                    }
                }
            }
        }

        Ok(())
    }
}
