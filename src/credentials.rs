//! Network credentials entered on the serial console

use embedded_hal_async::delay::DelayNs;
use heapless::String;

use crate::model::{Credentials, SECRET_MAX};
use crate::traits::{Console, CredentialSource};

/// Longest line kept by the console reader
pub const LINE_MAX: usize = SECRET_MAX;

pub enum LineEvent<'a> {
    None,
    Complete(&'a str),
    Overflow,
    /// Line ended but was not UTF-8
    Invalid,
}

/// Assembles console bytes into trimmed lines
///
/// `\n`, `\r` and `\r\n` all end a line. An empty line is a valid answer
/// (open network). Bytes past [`LINE_MAX`] are dropped until the next line
/// ending, which then reports nothing.
pub struct LineReader {
    buf: [u8; LINE_MAX],
    len: usize,
    overflowed: bool,
    after_cr: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_MAX],
            len: 0,
            overflowed: false,
            after_cr: false,
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> LineEvent<'_> {
        let after_cr = core::mem::replace(&mut self.after_cr, byte == b'\r');

        if byte == b'\n' && after_cr {
            return LineEvent::None;
        }

        if byte == b'\r' || byte == b'\n' {
            let len = core::mem::take(&mut self.len);
            if core::mem::take(&mut self.overflowed) {
                return LineEvent::None;
            }
            return match core::str::from_utf8(&self.buf[..len]) {
                Ok(text) => LineEvent::Complete(text.trim()),
                Err(_) => LineEvent::Invalid,
            };
        }

        if self.overflowed {
            return LineEvent::None;
        }

        if self.len < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
            return LineEvent::None;
        }

        self.len = 0;
        self.overflowed = true;
        LineEvent::Overflow
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out the same credentials on every request
pub struct FixedCredentials(pub Credentials);

impl CredentialSource for FixedCredentials {
    async fn request(&mut self) -> Credentials {
        self.0.clone()
    }
}

/// Pause after a failed console read before trying again
const READ_RETRY_MS: u32 = 100;

/// Asks for the network name and secret on a serial console
pub struct ConsolePrompt<S, D> {
    serial: S,
    delay: D,
    reader: LineReader,
}

impl<S, D> ConsolePrompt<S, D>
where
    S: Console,
    D: DelayNs,
{
    pub fn new(serial: S, delay: D) -> Self {
        Self {
            serial,
            delay,
            reader: LineReader::new(),
        }
    }

    async fn write_line(&mut self, text: &str) {
        let written = match self.serial.write_all(text.as_bytes()).await {
            Ok(()) => self.serial.write_all(b"\r\n").await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            log::warn!("[CONSOLE] Write failed: {}", e);
        }
    }

    async fn read_line(&mut self, out: &mut String<LINE_MAX>) {
        loop {
            let byte = match self.serial.read_byte().await {
                Ok(byte) => byte,
                Err(e) => {
                    log::warn!("[CONSOLE] Read failed: {}", e);
                    self.delay.delay_ms(READ_RETRY_MS).await;
                    continue;
                }
            };
            match self.reader.push_byte(byte) {
                LineEvent::Complete(line) => {
                    out.clear();
                    // Fits: the reader never yields more than LINE_MAX bytes.
                    let _ = out.push_str(line);
                    return;
                }
                LineEvent::Overflow => {
                    log::warn!("[CONSOLE] Line too long, discarded");
                }
                LineEvent::Invalid => {
                    log::warn!("[CONSOLE] Line is not valid text, discarded");
                }
                LineEvent::None => {}
            }
        }
    }
}

impl<S, D> CredentialSource for ConsolePrompt<S, D>
where
    S: Console,
    D: DelayNs,
{
    async fn request(&mut self) -> Credentials {
        let mut name = String::new();
        let mut secret = String::new();
        loop {
            self.write_line("Enter the WiFi network name:").await;
            self.read_line(&mut name).await;
            self.write_line("Enter the WiFi password:").await;
            self.read_line(&mut secret).await;

            if name.is_empty() {
                self.write_line("Network name must not be empty").await;
                continue;
            }
            match Credentials::new(&name, &secret) {
                Ok(credentials) => return credentials,
                Err(e) => {
                    log::warn!("[CONSOLE] {}", e);
                    self.write_line("Network name or password too long").await;
                }
            }
        }
    }
}

#[cfg(feature = "device")]
pub use uart::UartConsole;

#[cfg(feature = "device")]
mod uart {
    use esp_hal::{Async, uart::Uart};

    use crate::error::{Error, Result};
    use crate::traits::Console;

    /// UART0 as the credential console
    pub struct UartConsole {
        uart: Uart<'static, Async>,
    }

    impl UartConsole {
        pub fn new(uart: Uart<'static, Async>) -> Self {
            Self { uart }
        }
    }

    impl Console for UartConsole {
        async fn read_byte(&mut self) -> Result<u8> {
            let mut rx = [0u8; 1];
            loop {
                match self.uart.read_async(&mut rx).await {
                    Ok(1) => return Ok(rx[0]),
                    Ok(_) => continue,
                    Err(e) => {
                        log::debug!("[CONSOLE] UART rx error: {:?}", e);
                        return Err(Error::Console);
                    }
                }
            }
        }

        async fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
            while !bytes.is_empty() {
                match self.uart.write_async(bytes).await {
                    Ok(0) | Err(_) => return Err(Error::Console),
                    Ok(n) => bytes = &bytes[n..],
                }
            }
            Ok(())
        }
    }
}
