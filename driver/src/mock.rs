//! Scripted fixture implementing the `hal` collaborator traits, used only
//! by this crate's own tests (`spec.md` §8's "mock controller fixture").
//!
//! Grounded on the general shape of KidneyOS's `ata_channel`/`ata_device`
//! interaction with its ports and scheduler, but driven here by queued
//! responses instead of real hardware, the way a unit test for a driver
//! typically substitutes a recorder/player for the bus.

#![cfg(test)]

use crate::hal::{
    DeviceRegistry, EventId, IrqHandle, IrqLine, MapUserBuffer, PciBus, PciDeviceInfo, PortIo,
    Scheduler, WakeReason,
};
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

/// Port I/O fixture: altstatus reads are served from a queue (so tests can
/// script a BUSY-then-ready sequence), all other reads/writes are just
/// recorded for assertions.
pub struct ScriptedPortIo {
    altstatus_queue: RefCell<Vec<u8>>,
    altstatus_reads: RefCell<u32>,
    data32_queue: RefCell<Vec<u32>>,
    writes: RefCell<Vec<(u16, u8)>>,
    control_port: RefCell<Option<u16>>,
}

impl ScriptedPortIo {
    pub fn new() -> Self {
        Self {
            altstatus_queue: RefCell::new(Vec::new()),
            altstatus_reads: RefCell::new(0),
            data32_queue: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            control_port: RefCell::new(None),
        }
    }

    /// Registers the port this fixture should treat as the altstatus port;
    /// every read8 of that port is served from the queue.
    pub fn with_control_port(self, port: u16) -> Self {
        *self.control_port.borrow_mut() = Some(port);
        self
    }

    pub fn queue_altstatus(&self, bytes: &[u8]) {
        self.altstatus_queue.borrow_mut().extend_from_slice(bytes);
    }

    pub fn queue_data32(&self, words: &[u32]) {
        self.data32_queue.borrow_mut().extend_from_slice(words);
    }

    pub fn altstatus_reads(&self) -> u32 {
        *self.altstatus_reads.borrow()
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.writes.borrow().clone()
    }
}

impl Default for ScriptedPortIo {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for ScriptedPortIo {
    fn read8(&self, port: u16) -> u8 {
        let is_control = self.control_port.borrow().map(|p| p == port).unwrap_or(false);
        if is_control {
            *self.altstatus_reads.borrow_mut() += 1;
            let mut queue = self.altstatus_queue.borrow_mut();
            if queue.is_empty() {
                0
            } else {
                queue.remove(0)
            }
        } else {
            0
        }
    }

    fn write8(&self, port: u16, value: u8) {
        self.writes.borrow_mut().push((port, value));
    }

    fn read32(&self, _port: u16) -> u32 {
        let mut queue = self.data32_queue.borrow_mut();
        if queue.is_empty() {
            0
        } else {
            queue.remove(0)
        }
    }

    fn write32(&self, port: u16, value: u32) {
        self.writes
            .borrow_mut()
            .push((port, (value & 0xFF) as u8));
    }
}

/// A fixed list of PCI functions, standing in for bus enumeration.
pub struct ScriptedPciBus {
    devices: Vec<PciDeviceInfo>,
    bars: RefCell<Vec<(PciDeviceInfo, u8, u32)>>,
}

impl ScriptedPciBus {
    pub fn new(devices: Vec<PciDeviceInfo>) -> Self {
        Self {
            devices,
            bars: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bar(self, device: PciDeviceInfo, bar: u8, value: u32) -> Self {
        self.bars.borrow_mut().push((device, bar, value));
        self
    }
}

impl PciBus for ScriptedPciBus {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device(&self, index: usize) -> PciDeviceInfo {
        self.devices[index]
    }

    fn read_bar(&self, device: PciDeviceInfo, bar: u8) -> u32 {
        self.bars
            .borrow()
            .iter()
            .find(|(d, b, _)| *d == device && *b == bar)
            .map(|(_, _, value)| *value)
            .unwrap_or(0)
    }

    fn write_interrupt_line(&self, _device: PciDeviceInfo, _irq: u8) {}
}

/// No-op interrupt line: `attach` just hands back a deterministic handle.
pub struct NullIrqLine;

impl IrqLine for NullIrqLine {
    fn attach(&self, irq: u8) -> IrqHandle {
        IrqHandle(u32::from(irq))
    }
}

/// Single-threaded scheduler fixture: `sleep` assumes the caller's
/// completion (or interruption) was already recorded via [`Self::signal`]
/// or [`Self::interrupt`] before `sleep` is called, since there is no real
/// concurrency in a unit test.
pub struct ImmediateScheduler {
    next_wake: RefCell<Option<WakeReason>>,
    events: RefCell<u32>,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self {
            next_wake: RefCell::new(None),
            events: RefCell::new(0),
        }
    }

    pub fn signal(&self) {
        *self.next_wake.borrow_mut() = Some(WakeReason::Completion);
    }

    pub fn interrupt(&self) {
        *self.next_wake.borrow_mut() = Some(WakeReason::Signal);
    }
}

impl Default for ImmediateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ImmediateScheduler {
    fn event_init(&self, _name: &str) -> EventId {
        let mut events = self.events.borrow_mut();
        let id = *events;
        *events += 1;
        EventId(id)
    }

    fn lock(&self) {}

    fn unlock(&self) {}

    fn sleep(&self, _event: EventId) -> WakeReason {
        self.next_wake
            .borrow_mut()
            .take()
            .unwrap_or(WakeReason::Completion)
    }

    fn wakeup(&self, _event: EventId) {}
}

/// Records every disk/partition registration for test assertions instead
/// of publishing them anywhere.
#[derive(Default)]
pub struct RecordingDeviceRegistry {
    pub disks: RefCell<Vec<(String, u64)>>,
    pub partitions: RefCell<Vec<(String, u8, u64)>>,
}

impl RecordingDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for RecordingDeviceRegistry {
    fn register_disk(&self, name: &str, total_sectors: u64) {
        self.disks.borrow_mut().push((name.into(), total_sectors));
    }

    fn register_partition(&self, name: &str, partition_type: u8, sector_count: u64) {
        self.partitions
            .borrow_mut()
            .push((name.into(), partition_type, sector_count));
    }
}

/// Maps straight through to a heap buffer the test owns, standing in for
/// `kmem_map`.
pub struct PassthroughBufferMap;

impl MapUserBuffer for PassthroughBufferMap {
    unsafe fn map<'a>(&self, user_ptr: usize, len: usize) -> Option<&'a mut [u8]> {
        if user_ptr == 0 {
            return None;
        }
        Some(core::slice::from_raw_parts_mut(user_ptr as *mut u8, len))
    }
}
