//! The device arena (`spec.md` §3, §9): controllers, channels, disks, and
//! partitions, addressed by stable index handles instead of owning
//! back-pointers.
//!
//! KidneyOS represents this same hierarchy with direct ownership and
//! `&'static` references (`CHANNELS: Vec<Mutex<AtaChannel>>`, disks
//! registered into a global `BlockManager`, partitions holding a
//! `block_idx: usize` back into it). A `Disk` needing to reach back to its
//! owning `Controller`, and a `Partition` needing to reach back to its
//! `Disk`, would otherwise require either a lifetime that outlives the
//! arena or a reference-counted cycle; KidneyOS sidesteps this with
//! `'static` globals, which a driver core meant to be instantiated
//! per-test can't assume. So `Disk`/`Partition` carry a small `Copy`
//! index (`ControllerId`/`DiskId`) instead, the same role `block_idx`
//! plays in `partition_core::Partition`, generalized into a newtype per
//! level of the hierarchy.

use crate::identify::IdentifyData;
use crate::request::RequestEngine;
use alloc::string::String;
use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControllerId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DiskId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionId(pub u32);

/// A discriminated device identity: either a whole disk or one of its
/// partitions (`spec.md` §3). KidneyOS instead gives `Partition` its own
/// `BlockOp` impl alongside the disk's and lets the `BlockManager`
/// registry erase the distinction behind `dyn BlockOp`; this sum type
/// keeps the distinction visible to callers that need to rebase a
/// request onto the partition's offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceHandle {
    WholeDisk(DiskId),
    Partition(PartitionId),
}

/// One IDE channel (primary or secondary) on a controller: its command
/// and control port bases, which of its two devices (master/slave) are
/// populated, and the single-in-flight request slot they share.
pub struct Channel {
    pub command_base: u16,
    pub control_base: u16,
    pub irq: u8,
    pub devices: [Option<DiskId>; 2],
    pub requests: RequestEngine,
}

impl Channel {
    pub fn new(command_base: u16, control_base: u16, irq: u8) -> Self {
        Self {
            command_base,
            control_base,
            irq,
            devices: [None, None],
            requests: RequestEngine::new(),
        }
    }
}

/// A PCI IDE controller function, owning up to two channels
/// (`spec.md` §4.0/§6).
pub struct Controller {
    pub channels: [Channel; 2],
}

/// A probed disk: which channel/slave slot it occupies, its IDENTIFY
/// data, the name the driver assigns it, and the partitions found on it.
pub struct Disk {
    pub controller: ControllerId,
    pub channel_index: u8,
    pub slave: bool,
    pub identify: IdentifyData,
    pub name: String,
    pub partitions: Vec<PartitionId>,
}

/// A partition on a disk, rebased to LBA0 of the disk it lives on
/// (`spec.md` §4.3, §4.5).
pub struct Partition {
    pub disk: DiskId,
    pub partition_type: u8,
    pub start_lba: u64,
    pub sector_count: u64,
    pub name: String,
}

/// Owns every controller/disk/partition the driver has probed, addressed
/// by the index handles above.
#[derive(Default)]
pub struct DeviceArena {
    controllers: Vec<Controller>,
    disks: Vec<Disk>,
    partitions: Vec<Partition>,
}

impl DeviceArena {
    pub fn new() -> Self {
        Self {
            controllers: Vec::new(),
            disks: Vec::new(),
            partitions: Vec::new(),
        }
    }

    pub fn add_controller(&mut self, controller: Controller) -> ControllerId {
        let id = ControllerId(self.controllers.len() as u32);
        self.controllers.push(controller);
        id
    }

    pub fn controller(&self, id: ControllerId) -> &Controller {
        &self.controllers[id.0 as usize]
    }

    pub fn controller_mut(&mut self, id: ControllerId) -> &mut Controller {
        &mut self.controllers[id.0 as usize]
    }

    /// Assigns the disk's devname from its controller/channel/slave slot
    /// (`spec.md` §3, §6): `hd<N>d<K>`, where `N` is the owning
    /// controller's index and `K` is `(channel_index << 1) | slave`
    /// (0-3).
    pub fn add_disk(&mut self, mut disk: Disk) -> DiskId {
        let id = DiskId(self.disks.len() as u32);
        disk.name = device_name(disk.controller, disk.channel_index, disk.slave);
        self.disks.push(disk);
        id
    }

    pub fn disk(&self, id: DiskId) -> &Disk {
        &self.disks[id.0 as usize]
    }

    pub fn disk_mut(&mut self, id: DiskId) -> &mut Disk {
        &mut self.disks[id.0 as usize]
    }

    pub fn disks(&self) -> impl Iterator<Item = (DiskId, &Disk)> {
        self.disks
            .iter()
            .enumerate()
            .map(|(i, d)| (DiskId(i as u32), d))
    }

    /// Assigns the partition's devname from its disk's name plus the raw
    /// MBR slot index it was found in (`spec.md` §3, §4.3): `p<PP>`, a
    /// two-digit zero-padded `slot_index` (0-3), not a running count of
    /// non-empty slots, so a partition in slot 2 is always `p02`
    /// regardless of whether slots 0 and 1 are populated.
    pub fn add_partition(
        &mut self,
        disk: DiskId,
        slot_index: u8,
        partition_type: u8,
        start_lba: u64,
        sector_count: u64,
    ) -> PartitionId {
        let index = self.partitions.len() as u32;
        let name = alloc::format!("{}p{:02}", self.disk(disk).name, slot_index);
        let id = PartitionId(index);
        self.partitions.push(Partition {
            disk,
            partition_type,
            start_lba,
            sector_count,
            name,
        });
        self.disk_mut(disk).partitions.push(id);
        id
    }

    pub fn partition(&self, id: PartitionId) -> &Partition {
        &self.partitions[id.0 as usize]
    }

    /// Total addressable sector count for a device handle: the disk's own
    /// capacity for a whole-disk handle, or the partition's `sector_count`
    /// for a partition handle (`spec.md` §4.5).
    pub fn sector_limit(&self, handle: DeviceHandle) -> u64 {
        match handle {
            DeviceHandle::WholeDisk(id) => self.disk(id).identify.total_sectors,
            DeviceHandle::Partition(id) => self.partition(id).sector_count,
        }
    }

    /// Rebases a block number on a device handle onto the owning disk's
    /// absolute LBA, per `spec.md` §4.5: a whole-disk handle passes the
    /// block through unchanged, a partition handle adds the partition's
    /// start LBA.
    pub fn rebase(&self, handle: DeviceHandle, blkno: u64) -> (DiskId, u64) {
        match handle {
            DeviceHandle::WholeDisk(id) => (id, blkno),
            DeviceHandle::Partition(id) => {
                let partition = self.partition(id);
                (partition.disk, partition.start_lba + blkno)
            }
        }
    }
}

fn device_name(controller: ControllerId, channel_index: u8, slave: bool) -> String {
    let disk_index = (channel_index << 1) | u8::from(slave);
    alloc::format!("hd{}d{}", controller.0, disk_index)
}
