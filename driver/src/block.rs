//! The Block Device Facade (`spec.md` §4.5): the read/write/ioctl/devctl
//! surface a filesystem or raw block consumer calls, sitting on top of
//! the device arena and the request engine.
//!
//! Grounded on KidneyOS's `block::block_core::Block::read`, which
//! validates the sector range and buffer length before delegating to the
//! `BlockOp` driver. This facade adds the chunking `Block::read` doesn't
//! need (KidneyOS always transfers exactly one `BLOCK_SECTOR_SIZE`
//! buffer at a time): a caller-supplied transfer can span many sectors,
//! so it's split into chunks no larger than the bounce buffer.

use crate::error::{DriverError, IoFailure};
use crate::hal::{MapUserBuffer, PortIo, Scheduler};
use crate::model::{DeviceArena, DeviceHandle};
use crate::registers::RegisterGateway;

pub const SECTOR_SIZE: usize = 512;
/// Largest single PIO transfer the facade issues per request: 128 sectors
/// (64 KiB), matching the device's maximum LBA48 sector count field
/// headroom with comfortable margin (`spec.md` §4.5).
pub const MAX_SECTORS_PER_CHUNK: u32 = 128;

/// A `count`-sector transfer starting at `blkno` is out of bounds per the
/// iff formula in `spec.md` §8 property 4: `blkno >= limit` (the start is
/// at or past the end) or `blkno + count >= limit` (the tail lands at or
/// past the end, using `>=` rather than `>`). Pulled out of
/// [`BlockFacade::transfer`] so the boundary condition can be checked
/// independently of any hardware collaborator.
fn out_of_bounds(limit: u64, blkno: u64, sector_count: u32) -> bool {
    match blkno.checked_add(u64::from(sector_count)) {
        Some(end) => blkno >= limit || end >= limit,
        None => true,
    }
}

/// Collaborators a [`BlockFacade`] needs for one channel's I/O.
pub struct BlockFacade<'a> {
    pub arena: &'a DeviceArena,
    pub port_io: &'a dyn PortIo,
    pub scheduler: &'a dyn Scheduler,
    pub map_buffer: &'a dyn MapUserBuffer,
}

impl<'a> BlockFacade<'a> {
    /// Reads `sector_count` sectors starting at `blkno` on `handle` into
    /// the caller's buffer at `user_ptr`.
    ///
    /// `blkno`/`sector_count` are validated against the device's
    /// (possibly partition-rebased) sector limit before any hardware
    /// access; a request that starts at or past the end of the device, or
    /// whose tail would run past it, fails whole with `EIO` rather than
    /// performing a partial transfer (`spec.md` §4.5, §9).
    pub fn read(
        &self,
        handle: DeviceHandle,
        blkno: u64,
        sector_count: u32,
        user_ptr: usize,
    ) -> Result<(), DriverError> {
        self.transfer(handle, blkno, sector_count, user_ptr, false)
    }

    pub fn write(
        &self,
        _handle: DeviceHandle,
        _blkno: u64,
        _sector_count: u32,
        _user_ptr: usize,
    ) -> Result<(), DriverError> {
        Err(DriverError::Einval)
    }

    pub fn ioctl(&self, _handle: DeviceHandle, _request: u32) -> Result<(), DriverError> {
        Err(DriverError::Einval)
    }

    pub fn devctl(&self, _handle: DeviceHandle, _request: u32) -> Result<(), DriverError> {
        Err(DriverError::Einval)
    }

    /// No-op: the driver core has no per-open state to set up or tear
    /// down (`spec.md` §4.5).
    pub fn open(&self, _handle: DeviceHandle) -> Result<(), DriverError> {
        Ok(())
    }

    pub fn close(&self, _handle: DeviceHandle) -> Result<(), DriverError> {
        Ok(())
    }

    fn transfer(
        &self,
        handle: DeviceHandle,
        blkno: u64,
        sector_count: u32,
        user_ptr: usize,
        write: bool,
    ) -> Result<(), DriverError> {
        let limit = self.arena.sector_limit(handle);
        if out_of_bounds(limit, blkno, sector_count) {
            return Err(DriverError::Eio(IoFailure::OutOfBounds));
        }

        let mut remaining = sector_count;
        let mut chunk_blkno = blkno;
        let mut byte_offset: usize = 0;
        while remaining > 0 {
            let chunk_sectors = remaining.min(MAX_SECTORS_PER_CHUNK);
            let chunk_bytes = chunk_sectors as usize * SECTOR_SIZE;

            // SAFETY: user_ptr/len describe the caller's region for this
            // chunk's slice of the overall transfer, which has already
            // been bounds-checked against the device's sector limit.
            let buf = unsafe { self.map_buffer.map(user_ptr + byte_offset, chunk_bytes) }
                .ok_or(DriverError::Efault)?;

            let (disk_id, abs_lba) = self.arena.rebase(handle, chunk_blkno);
            let disk = self.arena.disk(disk_id);
            let controller = self.arena.controller(disk.controller);
            let channel = &controller.channels[disk.channel_index as usize];
            let gateway = RegisterGateway::new(self.port_io, channel.command_base, channel.control_base);

            channel
                .requests
                .begin(&gateway, disk.slave, abs_lba, chunk_sectors as u16, buf, write);
            let event = self.scheduler.event_init("pciide-transfer");
            channel.requests.wait(self.scheduler, event)?;

            remaining -= chunk_sectors;
            chunk_blkno += u64::from(chunk_sectors);
            byte_offset += chunk_bytes;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identify::IdentifyData;
    use crate::mock::{ImmediateScheduler, PassthroughBufferMap, ScriptedPortIo};
    use crate::model::{Channel, Controller, Disk};
    use crate::registers::LEGACY_CONTROL_OFFSET;
    use alloc::string::String;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    fn arena_with_disk(total_sectors: u64) -> (DeviceArena, DeviceHandle) {
        let mut arena = DeviceArena::new();
        let control_port = 0x1F0 + LEGACY_CONTROL_OFFSET;
        let controller = Controller {
            channels: [Channel::new(0x1F0, control_port, 14), Channel::new(0x170, 0x170 + LEGACY_CONTROL_OFFSET, 15)],
        };
        let controller_id = arena.add_controller(controller);
        let disk_id = arena.add_disk(Disk {
            controller: controller_id,
            channel_index: 0,
            slave: false,
            identify: IdentifyData {
                model: "TEST".into(),
                lba_capable: true,
                dma_supported: true,
                lba48_capable: true,
                total_sectors,
            },
            name: String::new(),
            partitions: Vec::new(),
        });
        (arena, DeviceHandle::WholeDisk(disk_id))
    }

    #[test]
    fn read_out_of_bounds_is_rejected_before_touching_hardware() {
        let (arena, handle) = arena_with_disk(1000);
        let io = ScriptedPortIo::new();
        let scheduler = ImmediateScheduler::new();
        let map = PassthroughBufferMap;
        let facade = BlockFacade {
            arena: &arena,
            port_io: &io,
            scheduler: &scheduler,
            map_buffer: &map,
        };
        let result = facade.read(handle, 999, 2, 0x1000);
        assert_eq!(result, Err(DriverError::Eio(IoFailure::OutOfBounds)));
        assert!(io.writes().is_empty());
    }

    #[test]
    fn write_ioctl_devctl_are_unsupported() {
        let (arena, handle) = arena_with_disk(1000);
        let io = ScriptedPortIo::new();
        let scheduler = ImmediateScheduler::new();
        let map = PassthroughBufferMap;
        let facade = BlockFacade {
            arena: &arena,
            port_io: &io,
            scheduler: &scheduler,
            map_buffer: &map,
        };
        assert_eq!(facade.write(handle, 0, 1, 0x1000), Err(DriverError::Einval));
        assert_eq!(facade.ioctl(handle, 0), Err(DriverError::Einval));
        assert_eq!(facade.devctl(handle, 0), Err(DriverError::Einval));
    }

    proptest! {
        /// `out_of_bounds` rejects exactly `blkno >= limit || blkno +
        /// sector_count >= limit`, for any combination that doesn't
        /// overflow `u64` (`spec.md` §8 property 4).
        #[test]
        fn bounds_check_matches_reference_formula(
            limit in 1u64..1_000_000,
            blkno in 0u64..1_000_000,
            sector_count in 0u32..2048,
        ) {
            let expected = blkno >= limit || blkno + u64::from(sector_count) >= limit;
            prop_assert_eq!(out_of_bounds(limit, blkno, sector_count), expected);
        }

        /// Overflowing `blkno + sector_count` is always rejected.
        #[test]
        fn bounds_check_rejects_overflowing_range(
            limit in 1u64..1_000_000,
            sector_count in 1u32..=u32::MAX,
        ) {
            prop_assert!(out_of_bounds(limit, u64::MAX, sector_count));
        }
    }
}
