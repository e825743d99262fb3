//! Pump status byte decoding.
//!
//! The pump answers `/1QR` with a short frame whose 4th byte carries the
//! status:
//!
//! ```text
//!   bit  7 6 5 4 3 2 1 0
//!            │   └──┬──┘
//!            │      └── error code (0–15)
//!            └── ready
//! ```

use core::fmt;

use crate::error::DeviceError;

/// Offset of the status byte in a `/1QR` reply.
pub const STATUS_BYTE_INDEX: usize = 3;

const READY_BIT: u8 = 1 << 5;
const ERROR_MASK: u8 = 0x0F;

/// Known error codes and their descriptions.
const ERROR_TABLE: [(u8, &str); 13] = [
    (0, "Error Free"),
    (1, "Initialization error"),
    (2, "Invalid command"),
    (3, "Invalid operand"),
    (4, "Invalid command sequence"),
    (5, "Fluid detection failure"),
    (6, "EEPROM failure"),
    (7, "Device not initialized"),
    (8, "Internal failure"),
    (9, "Piston Overload — reinitialize required"),
    (10, "Valve overload"),
    (11, "Plunger move not allowed"),
    (15, "Command overflow"),
];

pub type Description = heapless::String<48>;

/// Human-readable text for an error code.
pub fn error_description(code: u8) -> Description {
    let mut out = Description::new();
    match ERROR_TABLE.iter().find(|(c, _)| *c == code) {
        // Every table entry fits the buffer.
        Some((_, text)) => {
            let _ = out.push_str(text);
        }
        None => {
            let _ = fmt::write(&mut out, format_args!("Unknown error {code}"));
        }
    }
    out
}

/// Decoded pump status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub ready: bool,
    pub error_code: u8,
    pub error_description: Description,
}

impl DeviceStatus {
    pub fn from_byte(byte: u8) -> Self {
        let error_code = byte & ERROR_MASK;
        Self {
            ready: byte & READY_BIT != 0,
            error_code,
            error_description: error_description(error_code),
        }
    }

    /// Decode a full reply.  Empty means the pump never answered.
    pub fn from_response(frame: &[u8]) -> Result<Self, DeviceError> {
        match frame.get(STATUS_BYTE_INDEX) {
            Some(&b) => Ok(Self::from_byte(b)),
            None if frame.is_empty() => Err(DeviceError::LostComms),
            None => Err(DeviceError::ShortResponse(frame.len())),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.error_code != 0
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | code {} ({})",
            if self.ready { "READY" } else { "BUSY" },
            self.error_code,
            self.error_description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_error_free() {
        let s = DeviceStatus::from_byte(0x20);
        assert!(s.ready);
        assert_eq!(s.error_code, 0);
        assert_eq!(s.error_description.as_str(), "Error Free");
    }

    #[test]
    fn piston_overload() {
        let s = DeviceStatus::from_byte(0x09);
        assert!(!s.ready);
        assert_eq!(s.error_code, 9);
        assert_eq!(
            s.error_description.as_str(),
            "Piston Overload — reinitialize required"
        );
    }

    #[test]
    fn upper_bits_ignored() {
        let s = DeviceStatus::from_byte(0x60);
        assert!(s.ready);
        assert!(!s.is_fault());
    }

    #[test]
    fn unmapped_codes() {
        assert_eq!(error_description(12).as_str(), "Unknown error 12");
        assert_eq!(error_description(15).as_str(), "Command overflow");
    }

    #[test]
    fn response_framing() {
        assert_eq!(DeviceStatus::from_response(&[]), Err(DeviceError::LostComms));
        assert_eq!(
            DeviceStatus::from_response(&[0xFF, 0x2F]),
            Err(DeviceError::ShortResponse(2))
        );
        let s = DeviceStatus::from_response(&[0xFF, 0x2F, 0x30, 0x20, 0x03, 0x0D, 0x0A]).unwrap();
        assert!(s.ready);
    }
}
