//! SX1276/SX1278 LoRa receiver
//!
//! Only what the gateway needs: a version check at start-up, carrier
//! frequency, and the continuous receive path exposed through
//! [`RadioSource`]. Modem parameters stay at the chip defaults
//! (SF7, 125 kHz, CR 4/5, explicit header, CRC as sent by the node).

use embedded_hal::spi::SpiDevice;

use crate::error::{Error, Result};
use crate::traits::RadioSource;

/// Silicon revision reported by every SX1276/77/78/79
pub const EXPECTED_VERSION: u8 = 0x12;

#[allow(dead_code)]
mod regs {
    pub const REG_FIFO: u8 = 0x00;
    pub const REG_OP_MODE: u8 = 0x01;
    pub const REG_FRF_MSB: u8 = 0x06;
    pub const REG_FRF_MID: u8 = 0x07;
    pub const REG_FRF_LSB: u8 = 0x08;
    pub const REG_LNA: u8 = 0x0C;
    pub const REG_FIFO_ADDR_PTR: u8 = 0x0D;
    pub const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;
    pub const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;
    pub const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
    pub const REG_IRQ_FLAGS: u8 = 0x12;
    pub const REG_RX_NB_BYTES: u8 = 0x13;
    pub const REG_MODEM_CONFIG_3: u8 = 0x26;
    pub const REG_VERSION: u8 = 0x42;
}

mod modes {
    pub const MODE_LONG_RANGE: u8 = 0x80;
    pub const MODE_SLEEP: u8 = 0x00;
    pub const MODE_STANDBY: u8 = 0x01;
    pub const MODE_RX_CONTINUOUS: u8 = 0x05;
}

mod irq {
    pub const IRQ_RX_DONE: u8 = 0x40;
    pub const IRQ_CRC_ERROR: u8 = 0x20;
}

/// SX127x driver exposing the received packet byte by byte
pub struct Sx127x<SPI> {
    spi: SPI,
    mode: u8,
    packet_len: usize,
    packet_index: usize,
}

impl<SPI: SpiDevice> Sx127x<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            spi,
            mode: modes::MODE_SLEEP,
            packet_len: 0,
            packet_index: 0,
        }
    }

    /// Verify the chip and prepare it for reception on `frequency_hz`
    ///
    /// The hardware reset pulse is the platform's job and must precede this.
    pub fn begin(&mut self, frequency_hz: u32) -> Result<()> {
        let version = self.read_register(regs::REG_VERSION)?;
        if version != EXPECTED_VERSION {
            return Err(Error::RadioVersion(version));
        }

        self.set_mode(modes::MODE_SLEEP)?;
        self.set_frequency(frequency_hz)?;

        self.write_register(regs::REG_FIFO_TX_BASE_ADDR, 0)?;
        self.write_register(regs::REG_FIFO_RX_BASE_ADDR, 0)?;

        // LNA boost, automatic gain control
        let lna = self.read_register(regs::REG_LNA)?;
        self.write_register(regs::REG_LNA, lna | 0x03)?;
        self.write_register(regs::REG_MODEM_CONFIG_3, 0x04)?;

        self.set_mode(modes::MODE_STANDBY)
    }

    fn set_frequency(&mut self, frequency_hz: u32) -> Result<()> {
        // F_RF = frf * 32 MHz / 2^19
        let frf = ((frequency_hz as u64) << 19) / 32_000_000;

        self.write_register(regs::REG_FRF_MSB, (frf >> 16) as u8)?;
        self.write_register(regs::REG_FRF_MID, (frf >> 8) as u8)?;
        self.write_register(regs::REG_FRF_LSB, frf as u8)
    }

    fn set_mode(&mut self, mode: u8) -> Result<()> {
        self.write_register(regs::REG_OP_MODE, modes::MODE_LONG_RANGE | mode)?;
        self.mode = mode;
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        let mut buf = [addr & 0x7F, 0x00];
        self.spi.transfer_in_place(&mut buf).map_err(|_| Error::Spi)?;
        Ok(buf[1])
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        self.spi.write(&[addr | 0x80, value]).map_err(|_| Error::Spi)
    }
}

impl<SPI: SpiDevice> RadioSource for Sx127x<SPI> {
    fn parse_packet(&mut self) -> Result<usize> {
        let flags = self.read_register(regs::REG_IRQ_FLAGS)?;
        // Write-one-to-clear
        self.write_register(regs::REG_IRQ_FLAGS, flags)?;

        if flags & irq::IRQ_RX_DONE != 0 && flags & irq::IRQ_CRC_ERROR == 0 {
            self.packet_len = usize::from(self.read_register(regs::REG_RX_NB_BYTES)?);
            self.packet_index = 0;

            let start = self.read_register(regs::REG_FIFO_RX_CURRENT_ADDR)?;
            self.write_register(regs::REG_FIFO_ADDR_PTR, start)?;

            self.set_mode(modes::MODE_STANDBY)?;
            return Ok(self.packet_len);
        }

        if flags & irq::IRQ_CRC_ERROR != 0 {
            log::debug!("[LORA] Dropped packet with CRC error");
        }

        self.packet_len = 0;
        self.packet_index = 0;
        if self.mode != modes::MODE_RX_CONTINUOUS {
            self.write_register(regs::REG_FIFO_ADDR_PTR, 0)?;
            self.set_mode(modes::MODE_RX_CONTINUOUS)?;
        }
        Ok(0)
    }

    fn available(&mut self) -> Result<bool> {
        Ok(self.packet_index < self.packet_len)
    }

    fn read(&mut self) -> Result<u8> {
        if self.packet_index >= self.packet_len {
            return Err(Error::Spi);
        }
        self.packet_index += 1;
        self.read_register(regs::REG_FIFO)
    }
}
