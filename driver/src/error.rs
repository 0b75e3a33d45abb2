//! Error kinds surfaced to callers (`spec.md` §7), mirroring the shape of
//! KidneyOS's `block::block_error::BlockError` (a plain enum implementing
//! `Display`/`Error`) rather than a numeric `errno`.

use core::fmt;

/// Diagnostic attached to an `Eio` produced by a hardware-reported error
/// completion (`spec.md` §4.4): `0x8000_0000 | (status << 16) | err_reg`.
pub type HardwareErrorCode = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Device-reported error, bounds violation, or mid-transfer failure.
    Eio(IoFailure),
    /// The caller's buffer could not be mapped into kernel space.
    Efault,
    /// The caller's sleep was interrupted by a signal-equivalent.
    Eintr,
    /// The operation is not supported (write, ioctl, devctl).
    Einval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFailure {
    /// `blkno < 0` or `blkno + sector_count >= limit` (`spec.md` §4.5, §9).
    OutOfBounds,
    /// The device completed the command with ERROR or DEVICE_FAILURE set.
    Hardware(HardwareErrorCode),
    /// `wait_not_busy` exhausted its iteration budget (`spec.md` §4.1, §9).
    Timeout,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Eio(IoFailure::OutOfBounds) => {
                write!(f, "EIO: block request out of bounds")
            }
            DriverError::Eio(IoFailure::Hardware(code)) => {
                write!(f, "EIO: device reported error (code {code:#010x})")
            }
            DriverError::Eio(IoFailure::Timeout) => {
                write!(f, "EIO: timed out waiting for device to clear BUSY")
            }
            DriverError::Efault => write!(f, "EFAULT: could not map caller buffer"),
            DriverError::Eintr => write!(f, "EINTR: interrupted before completion"),
            DriverError::Einval => write!(f, "EINVAL: operation not supported"),
        }
    }
}

impl core::error::Error for DriverError {}
