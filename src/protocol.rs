//! Sensor frame wire format
//!
//! A frame is ASCII text: `<receiver_id>|<temperature>|<humidity>|<light_state>`.
//! Field contents are opaque; the collector validates them.

use core::fmt::Write;

use heapless::String;

use crate::error::{Error, Result};
use crate::model::SensorFrame;

pub const SEPARATOR: char = '|';

/// Capacity of a rendered forward URL
pub const MAX_URL_LEN: usize = 512;

/// Why a packet was not turned into a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Sent by a node addressed to another gateway
    UnrecognizedSender,
    /// Addressed to us, but not four `|`-separated fields of text
    Malformed,
}

/// Parse a received payload into a frame addressed to `expected_id`
pub fn parse<'a>(
    raw: &'a [u8],
    expected_id: &str,
) -> core::result::Result<SensorFrame<'a>, Rejected> {
    let text = match core::str::from_utf8(raw) {
        Ok(text) => text,
        Err(_) if raw.starts_with(expected_id.as_bytes()) => return Err(Rejected::Malformed),
        Err(_) => return Err(Rejected::UnrecognizedSender),
    };

    let Some(rest) = text.strip_prefix(expected_id) else {
        return Err(Rejected::UnrecognizedSender);
    };

    // A longer id sharing our digits is another node's address.
    if !rest.is_empty() && !rest.starts_with(SEPARATOR) {
        return Err(Rejected::UnrecognizedSender);
    }

    let mut fields = rest.splitn(4, SEPARATOR);
    // Everything before the first separator is the id, already matched.
    let _ = fields.next();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(temperature), Some(humidity), Some(light_state)) => Ok(SensorFrame {
            receiver_id: &text[..expected_id.len()],
            temperature,
            humidity,
            light_state,
        }),
        _ => Err(Rejected::Malformed),
    }
}

/// URL of the collector call carrying one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    url: String<MAX_URL_LEN>,
}

impl ForwardRequest {
    pub fn build(base_url: &str, frame: &SensorFrame<'_>) -> Result<Self> {
        let mut url = String::new();
        url.push_str(base_url).map_err(|_| Error::UrlTooLong)?;

        let params = [
            ("temperature", frame.temperature),
            ("humidity", frame.humidity),
            ("ledState", frame.light_state),
        ];
        for (index, (key, value)) in params.iter().enumerate() {
            let lead = if index == 0 { '?' } else { '&' };
            write!(url, "{}{}=", lead, key).map_err(|_| Error::UrlTooLong)?;
            percent_encode(value, &mut url)?;
        }

        Ok(Self { url })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

fn percent_encode<const N: usize>(value: &str, out: &mut String<N>) -> Result<()> {
    for byte in value.bytes() {
        let unreserved = byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~');
        if unreserved {
            out.push(byte as char).map_err(|_| Error::UrlTooLong)?;
        } else {
            write!(out, "%{:02X}", byte).map_err(|_| Error::UrlTooLong)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "9525";
    const BASE: &str = "http://192.168.2.101/esp32/guardar_datos.php";

    #[test]
    fn parses_reference_frame() {
        let frame = parse(b"9525|23.5|60|ON", ID).unwrap();
        assert_eq!(
            frame,
            SensorFrame {
                receiver_id: "9525",
                temperature: "23.5",
                humidity: "60",
                light_state: "ON",
            }
        );
    }

    #[test]
    fn reference_frame_forward_url() {
        let frame = parse(b"9525|23.5|60|ON", ID).unwrap();
        let request = ForwardRequest::build(BASE, &frame).unwrap();
        assert_eq!(
            request.url(),
            "http://192.168.2.101/esp32/guardar_datos.php?temperature=23.5&humidity=60&ledState=ON"
        );
    }

    #[test]
    fn rejects_other_receivers() {
        assert_eq!(parse(b"1234|23.5|60|ON", ID), Err(Rejected::UnrecognizedSender));
        assert_eq!(parse(b"", ID), Err(Rejected::UnrecognizedSender));
        assert_eq!(parse(b"952|1|2|3", ID), Err(Rejected::UnrecognizedSender));
        assert_eq!(parse(b"95250|1|2|3", ID), Err(Rejected::UnrecognizedSender));
        assert_eq!(parse(b"x9525|1|2|3", ID), Err(Rejected::UnrecognizedSender));
    }

    #[test]
    fn rejects_missing_separators() {
        assert_eq!(parse(b"9525|23.5|60", ID), Err(Rejected::Malformed));
        assert_eq!(parse(b"9525|23.5", ID), Err(Rejected::Malformed));
        assert_eq!(parse(b"9525|", ID), Err(Rejected::Malformed));
        assert_eq!(parse(b"9525", ID), Err(Rejected::Malformed));
    }

    #[test]
    fn rejects_binary_payload_for_us() {
        assert_eq!(parse(b"9525|\xff|60|ON", ID), Err(Rejected::Malformed));
        assert_eq!(parse(b"\xfe\xff", ID), Err(Rejected::UnrecognizedSender));
    }

    #[test]
    fn keeps_empty_fields() {
        let frame = parse(b"9525|||", ID).unwrap();
        assert_eq!(frame.temperature, "");
        assert_eq!(frame.humidity, "");
        assert_eq!(frame.light_state, "");

        let frame = parse(b"9525||55|", ID).unwrap();
        assert_eq!(frame.temperature, "");
        assert_eq!(frame.humidity, "55");
        assert_eq!(frame.light_state, "");
    }

    #[test]
    fn trailing_field_runs_to_end() {
        let frame = parse(b"9525|21|40|OFF|extra", ID).unwrap();
        assert_eq!(frame.light_state, "OFF|extra");
    }

    #[test]
    fn parse_is_pure() {
        let raw = b"9525|-3.25|99|OFF";
        assert_eq!(parse(raw, ID), parse(raw, ID));
    }

    #[test]
    fn honours_configured_id() {
        assert!(parse(b"4711|1|2|3", "4711").is_ok());
        assert_eq!(parse(b"9525|1|2|3", "4711"), Err(Rejected::UnrecognizedSender));
    }

    #[test]
    fn encodes_reserved_characters() {
        let frame = parse(b"9525|2 3|6&0|O=N", ID).unwrap();
        let request = ForwardRequest::build("http://h/p", &frame).unwrap();
        assert_eq!(
            request.url(),
            "http://h/p?temperature=2%203&humidity=6%260&ledState=O%3DN"
        );
    }

    #[test]
    fn url_overflow_is_an_error() {
        let long_base = "h".repeat(MAX_URL_LEN);
        let frame = parse(b"9525|1|2|3", ID).unwrap();
        assert_eq!(
            ForwardRequest::build(&long_base, &frame).unwrap_err(),
            Error::UrlTooLong
        );
    }
}
