use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::gpio::AnyPin;
use esp_hal::{
    Blocking,
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    peripherals::SPI2,
    spi::master::{Config as SpiConfig, Spi},
    time::Rate,
};

use crate::config::radio::SPI_FREQ_KHZ;
use crate::error::{Error, Result};
use crate::sx127x::Sx127x;

const RESET_PULSE_MS: u32 = 10;

/// SPI device the SX127x sits on
pub type LoRaSpi<'a> = ExclusiveDevice<Spi<'a, Blocking>, Output<'a>, Delay>;

pub struct LoRaHardware<'a> {
    pub spi: LoRaSpi<'a>,
    pub rst: Output<'a>,
    pub delay: Delay,
}

impl<'a> LoRaHardware<'a> {
    pub fn new<SCK, MISO, MOSI, CS, RST>(
        spi_periph: SPI2<'a>,
        sck_gpio: SCK,
        miso_gpio: MISO,
        mosi_gpio: MOSI,
        cs_gpio: CS,
        rst_gpio: RST,
    ) -> Result<Self>
    where
        SCK: Into<AnyPin<'a>>,
        MISO: Into<AnyPin<'a>>,
        MOSI: Into<AnyPin<'a>>,
        CS: Into<AnyPin<'a>>,
        RST: Into<AnyPin<'a>>,
    {
        let sck_pin: AnyPin<'a> = sck_gpio.into();
        let miso_pin: AnyPin<'a> = miso_gpio.into();
        let mosi_pin: AnyPin<'a> = mosi_gpio.into();
        let cs_pin: AnyPin<'a> = cs_gpio.into();
        let rst_pin: AnyPin<'a> = rst_gpio.into();

        let spi_bus = Spi::new(
            spi_periph,
            SpiConfig::default().with_frequency(Rate::from_khz(SPI_FREQ_KHZ)),
        )
        .map_err(|_| Error::Spi)?
        .with_sck(sck_pin)
        .with_miso(miso_pin)
        .with_mosi(mosi_pin);

        let cs = Output::new(cs_pin, Level::High, OutputConfig::default());
        let rst = Output::new(rst_pin, Level::High, OutputConfig::default());

        let spi = ExclusiveDevice::new(spi_bus, cs, Delay::new()).map_err(|_| Error::Spi)?;

        Ok(Self {
            spi,
            rst,
            delay: Delay::new(),
        })
    }

    /// Pulse the reset line and hand the bus to the radio driver
    pub fn into_radio(mut self) -> Sx127x<LoRaSpi<'a>> {
        self.rst.set_low();
        self.delay.delay_millis(RESET_PULSE_MS);
        self.rst.set_high();
        self.delay.delay_millis(RESET_PULSE_MS);

        // RST must stay driven high for the chip to run.
        core::mem::forget(self.rst);
        Sx127x::new(self.spi)
    }
}
