//! The Register Gateway (`spec.md` §4.1): typed wrappers around the ATA
//! command-block and control-block ports, plus the "400ns" settling delay
//! and the busy-wait primitive every higher layer builds on.
//!
//! Grounded on KidneyOS's `drivers::ata::ata_channel::AtaChannel`, which
//! defines the same register offsets as `const fn` port accessors and the
//! same `wait_while_busy`/`select_device` delay pattern — generalized
//! here to go through the [`PortIo`](crate::hal::PortIo) collaborator
//! instead of calling `kidneyos_shared::serial::{inb, outb}` directly, so
//! the gateway can be driven by a mock port fixture in tests.

use crate::error::{DriverError, IoFailure};
use crate::hal::PortIo;
use arbitrary_int::u1;
use bitbybit::bitfield;

/// Command-block register offsets from the channel's base I/O port
/// (`spec.md` §4.1).
pub mod offset {
    pub const DATA: u16 = 0;
    pub const ERROR: u16 = 1;
    pub const SECTOR_COUNT: u16 = 2;
    pub const LBA_LOW: u16 = 3;
    pub const LBA_MID: u16 = 4;
    pub const LBA_HIGH: u16 = 5;
    pub const DISK_SELECT: u16 = 6;
    pub const COMMAND_STATUS: u16 = 7;
}

/// Control/altstatus register offset relative to the channel's command
/// base in legacy mode (`spec.md` §6): `command_base + 0x206`.
pub const LEGACY_CONTROL_OFFSET: u16 = 0x206;

/// Status/altstatus register bits (`spec.md` §4.1).
#[bitfield(u8, default = 0)]
pub struct Status {
    #[bit(0, rw)]
    pub error: bool,
    #[bit(3, rw)]
    pub drq: bool,
    #[bit(5, rw)]
    pub device_failure: bool,
    #[bit(7, rw)]
    pub busy: bool,
}

/// Device control register values (`spec.md` §6): `0x02` disables device
/// interrupts (nIEN), `0x00` enables them.
#[bitfield(u8, default = 0)]
pub struct DeviceControl {
    #[bit(1, rw)]
    pub disable_interrupts: bool,
    #[bit(2, rw)]
    pub software_reset: bool,
}

/// DISK_SELECT / DEVICE register layout (`spec.md` §4.2, §4.4): bits 5 and
/// 7 are architecturally "must be set", bit 6 selects LBA addressing over
/// CHS, and bit 4 selects the slave device.
#[bitfield(u8, default = 0xA0)]
pub struct DeviceSelect {
    #[bit(4, rw)]
    pub slave: bool,
    #[bit(6, rw)]
    pub lba: bool,
    #[bits(5..=5, rw)]
    must_be_set_low: u1,
    #[bits(7..=7, rw)]
    must_be_set_high: u1,
}

impl DeviceSelect {
    pub fn for_device(slave: bool) -> Self {
        Self::new_with_raw_value(0xA0).with_slave(slave).with_lba(true)
    }
}

/// Number of consecutive altstatus reads used for the "~400ns" settling
/// delay (`spec.md` §4.1): each ISA port read takes on the order of a
/// hundred nanoseconds, so four reads comfortably covers the device's
/// post-command setup time.
pub const SETTLE_READS: u32 = 4;

/// Upper bound on `wait_not_busy`'s poll loop (`spec.md` §4.1, §9): the
/// source polls up to 2^31 times before giving up without resetting the
/// bus.
pub const WAIT_NOT_BUSY_ITERATION_LIMIT: u32 = 1 << 31;

/// A channel's command-block and control-block ports, reached through the
/// [`PortIo`] collaborator.
pub struct RegisterGateway<'a> {
    port_io: &'a dyn PortIo,
    base_port: u16,
    control_port: u16,
}

impl<'a> RegisterGateway<'a> {
    pub fn new(port_io: &'a dyn PortIo, base_port: u16, control_port: u16) -> Self {
        Self {
            port_io,
            base_port,
            control_port,
        }
    }

    pub fn write_reg(&self, reg: u16, value: u8) {
        self.port_io.write8(self.base_port + reg, value);
    }

    pub fn read_reg(&self, reg: u16) -> u8 {
        self.port_io.read8(self.base_port + reg)
    }

    pub fn write_control(&self, value: DeviceControl) {
        self.port_io.write8(self.control_port, value.raw_value());
    }

    pub fn read_altstatus(&self) -> Status {
        Status::new_with_raw_value(self.port_io.read8(self.control_port))
    }

    pub fn read_data32(&self) -> u32 {
        self.port_io.read32(self.base_port + offset::DATA)
    }

    pub fn write_data32(&self, value: u32) {
        self.port_io.write32(self.base_port + offset::DATA, value);
    }

    /// Four consecutive altstatus reads, used after any command-causing
    /// register write and after DISK_SELECT switches (`spec.md` §4.1).
    pub fn delay_400ns(&self) {
        for _ in 0..SETTLE_READS {
            self.read_altstatus();
        }
    }

    /// Polls altstatus until BUSY clears, after a settling delay.
    ///
    /// The source busy-waits up to 2^31 iterations and then logs and
    /// returns without resetting the bus; we preserve that (no reset) but
    /// surface the timeout as a recoverable [`DriverError`] instead of
    /// silently returning (`spec.md` §4.1, §9).
    pub fn wait_not_busy(&self) -> Result<Status, DriverError> {
        self.delay_400ns();
        for _ in 0..WAIT_NOT_BUSY_ITERATION_LIMIT {
            let status = self.read_altstatus();
            if !status.busy() {
                return Ok(status);
            }
        }
        Err(DriverError::Eio(IoFailure::Timeout))
    }
}
