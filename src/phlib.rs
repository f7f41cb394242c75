//! Constants, status codes and flag bits of the PHLib v3.0 interface.

use bitflags::bitflags;
use serde::Deserialize;

/// Library version this crate was written against.
pub const LIB_VERSION: &str = "3.0";

pub const MAXDEVNUM: usize = 8;
pub const HISTCHAN: usize = 65536;
pub const TTREADMAX: usize = 131072;
/// FIFO reads must be requested in multiples of this many records.
pub const TTREAD_STEP: usize = 512;
pub const ROUTING_CHANNELS: usize = 4;

pub const BINSTEPSMAX: i32 = 8;
pub const OFFSETMIN: i32 = 0;
pub const OFFSETMAX: i32 = 1_000_000_000;
pub const ACQTMIN: i32 = 1;
pub const ACQTMAX: i32 = 360_000_000;
pub const DISCRMIN: i32 = 0;
pub const DISCRMAX: i32 = 800;
pub const ZCMIN: i32 = 0;
pub const ZCMAX: i32 = 20;
pub const SYNCDIVMIN: i32 = 1;
pub const SYNCDIVMAX: i32 = 8;
pub const STOPCNTMIN: i32 = 1;
pub const STOPCNTMAX: i32 = 65535;
pub const PHR800LVMIN: i32 = -1600;
pub const PHR800LVMAX: i32 = 2400;

/// Sizes of the character buffers the library writes into.
pub const LIB_VERSION_LEN: usize = 8;
pub const SERIAL_LEN: usize = 8;
pub const MODEL_LEN: usize = 16;
pub const PARTNO_LEN: usize = 8;
pub const VERSION_LEN: usize = 8;
pub const ERROR_STRING_LEN: usize = 40;

bitflags! {
    /// Status bits returned by `PH_GetFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: i32 {
        const FIFOFULL = 0x0003;
        const OVERFLOW = 0x0040;
        const SYSERROR = 0x0100;
    }
}

/// Measurement mode passed to `PH_Initialize`.
#[repr(i32)]
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    #[serde(alias = "hist")]
    Histogram = 0,
    T2 = 2,
    T3 = 3,
}

impl Mode {
    pub fn is_tttr(self) -> bool {
        matches!(self, Mode::T2 | Mode::T3)
    }
}

/// Known PHLib status codes. Anything else maps to `Unknown`.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub enum PhLibReturn {
    None = 0,
    DeviceOpenFail = -1,
    DeviceBusy = -2,
    DeviceHeventFail = -3,
    DeviceCallbsetFail = -4,
    DeviceBarmapFail = -5,
    DeviceCloseFail = -6,
    DeviceResetFail = -7,
    DeviceGetversionFail = -8,
    DeviceVersionMismatch = -9,
    DeviceNotOpen = -10,
    DeviceLocked = -11,
    InstanceRunning = -16,
    InvalidArgument = -17,
    InvalidMode = -18,
    InvalidOption = -19,
    InvalidMemory = -20,
    InvalidRdata = -21,
    NotInitialized = -22,
    NotCalibrated = -23,
    DmaFail = -24,
    XtdeviceFail = -25,
    FpgaconfFail = -26,
    IfconfFail = -27,
    FiforesetFail = -28,
    StatusFail = -29,
    UsbGetdriververFail = -32,
    UsbDriververMismatch = -33,
    UsbGetifinfoFail = -34,
    UsbHispeedFail = -35,
    UsbVcmdFail = -36,
    UsbBulkrdFail = -37,
    Unknown = 1,
}

impl From<i32> for PhLibReturn {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::None,
            -1 => Self::DeviceOpenFail,
            -2 => Self::DeviceBusy,
            -3 => Self::DeviceHeventFail,
            -4 => Self::DeviceCallbsetFail,
            -5 => Self::DeviceBarmapFail,
            -6 => Self::DeviceCloseFail,
            -7 => Self::DeviceResetFail,
            -8 => Self::DeviceGetversionFail,
            -9 => Self::DeviceVersionMismatch,
            -10 => Self::DeviceNotOpen,
            -11 => Self::DeviceLocked,
            -16 => Self::InstanceRunning,
            -17 => Self::InvalidArgument,
            -18 => Self::InvalidMode,
            -19 => Self::InvalidOption,
            -20 => Self::InvalidMemory,
            -21 => Self::InvalidRdata,
            -22 => Self::NotInitialized,
            -23 => Self::NotCalibrated,
            -24 => Self::DmaFail,
            -25 => Self::XtdeviceFail,
            -26 => Self::FpgaconfFail,
            -27 => Self::IfconfFail,
            -28 => Self::FiforesetFail,
            -29 => Self::StatusFail,
            -32 => Self::UsbGetdriververFail,
            -33 => Self::UsbDriververMismatch,
            -34 => Self::UsbGetifinfoFail,
            -35 => Self::UsbHispeedFail,
            -36 => Self::UsbVcmdFail,
            -37 => Self::UsbBulkrdFail,
            _ => Self::Unknown,
        }
    }
}

/// Converts a raw status code into `Ok(code)` for non-negative values and
/// `Err(code)` otherwise. Some calls return useful non-negative values.
pub fn check(code: i32) -> Result<i32, i32> {
    if code < 0 {
        Err(code)
    } else {
        Ok(code)
    }
}

/// Decodes a NUL-terminated buffer filled in by the library.
pub fn c_buffer_to_string(mut buffer: Vec<u8>) -> String {
    if let Some(end) = buffer.iter().position(|&b| b == 0) {
        buffer.truncate(end);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_known_variants() {
        assert_eq!(PhLibReturn::from(0), PhLibReturn::None);
        assert_eq!(PhLibReturn::from(-1), PhLibReturn::DeviceOpenFail);
        assert_eq!(PhLibReturn::from(-23), PhLibReturn::NotCalibrated);
        assert_eq!(PhLibReturn::from(-999), PhLibReturn::Unknown);
    }

    #[test]
    fn negative_codes_are_errors() {
        assert_eq!(check(0), Ok(0));
        assert_eq!(check(17), Ok(17));
        assert_eq!(check(-5), Err(-5));
    }

    #[test]
    fn fifo_full_is_detected_from_either_bit() {
        assert!(Flags::from_bits_retain(0x0001).intersects(Flags::FIFOFULL));
        assert!(Flags::from_bits_retain(0x0002).intersects(Flags::FIFOFULL));
        assert!(!Flags::from_bits_retain(0x0040).intersects(Flags::FIFOFULL));
    }

    #[test]
    fn c_buffers_stop_at_the_first_nul() {
        let mut buf = b"1020304".to_vec();
        buf.extend_from_slice(&[0, b'x']);
        assert_eq!(c_buffer_to_string(buf), "1020304");
    }
}
