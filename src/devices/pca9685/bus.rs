//! Register-level access to the PCA9685
//!
//! The driver only ever writes registers, so the bus trait is write-only.
//! The Raspberry Pi implementation is behind the `rppal` feature; on other
//! builds opening the bus fails with a `HardwareInit` error.

use crate::error::Result;

/// Write access to an I2C device's register file
pub trait RegisterBus: Send {
    /// Write one byte to `register`
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;

    /// Write consecutive registers starting at `register`.
    ///
    /// Relies on the device's auto-increment mode.
    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<()>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        (**self).write_register(register, value)
    }

    fn write_block(&mut self, register: u8, data: &[u8]) -> Result<()> {
        (**self).write_block(register, data)
    }
}

#[cfg(all(feature = "rppal", target_os = "linux"))]
mod rpi {
    use super::RegisterBus;
    use crate::error::{Error, Result};
    use rppal::i2c::I2c;

    /// `/dev/i2c-N` through rppal
    pub struct RppalBus {
        i2c: I2c,
    }

    impl RppalBus {
        pub fn open(bus: u8, address: u16) -> Result<Self> {
            let mut i2c = I2c::with_bus(bus)
                .map_err(|e| Error::HardwareInit(format!("Failed to open I2C bus {}: {}", bus, e)))?;
            i2c.set_slave_address(address).map_err(|e| {
                Error::HardwareInit(format!("Failed to select I2C address {:#04x}: {}", address, e))
            })?;
            Ok(Self { i2c })
        }
    }

    impl RegisterBus for RppalBus {
        fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
            self.i2c
                .smbus_write_byte(register, value)
                .map_err(|e| Error::Other(format!("I2C write to {:#04x}: {}", register, e)))
        }

        fn write_block(&mut self, register: u8, data: &[u8]) -> Result<()> {
            let mut buf = Vec::with_capacity(data.len() + 1);
            buf.push(register);
            buf.extend_from_slice(data);
            let written = self
                .i2c
                .write(&buf)
                .map_err(|e| Error::Other(format!("I2C write to {:#04x}: {}", register, e)))?;
            if written != buf.len() {
                return Err(Error::Other(format!(
                    "Short I2C write to {:#04x}: {} of {} bytes",
                    register,
                    written,
                    buf.len()
                )));
            }
            Ok(())
        }
    }
}

/// Open the platform I2C bus at `address`
#[cfg(all(feature = "rppal", target_os = "linux"))]
pub fn open(bus: u8, address: u16) -> Result<Box<dyn RegisterBus>> {
    Ok(Box::new(rpi::RppalBus::open(bus, address)?))
}

/// Open the platform I2C bus at `address`
#[cfg(not(all(feature = "rppal", target_os = "linux")))]
pub fn open(bus: u8, address: u16) -> Result<Box<dyn RegisterBus>> {
    Err(crate::error::Error::HardwareInit(format!(
        "I2C bus {} (address {:#04x}) unavailable: built without the `rppal` feature",
        bus, address
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(all(feature = "rppal", target_os = "linux")))]
    #[test]
    fn test_open_without_feature_is_hardware_init() {
        let err = open(1, 0x40).err().unwrap();
        assert!(matches!(err, crate::error::Error::HardwareInit(_)));
        assert!(err.to_string().contains("rppal"));
    }
}
