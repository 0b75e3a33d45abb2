//! Collaborator interfaces the driver core consumes but never implements
//! itself (`spec.md` §6): PCI enumeration, port I/O, interrupt attachment,
//! the scheduler, and user-buffer mapping. A real kernel implements these
//! against its own PCI bus walker, port instructions, IDT, and scheduler;
//! `mock` (test-only) implements them against a scripted fixture so the
//! request engine and register gateway are testable on the host, the way
//! `spec.md` §8 asks for.

/// 8/32-bit port I/O, standing in for the host kernel's port instructions.
/// KidneyOS talks to hardware directly via
/// `kidneyos_shared::serial::{inb, outb, insw, outsw}`; here that's a
/// trait object so the register gateway can be driven by a mock in tests.
pub trait PortIo {
    fn read8(&self, port: u16) -> u8;
    fn write8(&self, port: u16, value: u8);
    /// Reads one 32-bit PIO data word (two 16-bit words at once).
    fn read32(&self, port: u16) -> u32;
    /// Writes one 32-bit PIO data word.
    fn write32(&self, port: u16, value: u32);
}

/// A PCI function found during bus enumeration, as `spec.md` §6 describes
/// the collaborator's `pci_devices[i]` entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PciDeviceInfo {
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

pub const PCI_CLASS_STORAGE: u8 = 0x01;
pub const PCI_SUBCLASS_IDE: u8 = 0x01;

/// A pre-enumerated PCI bus. `spec.md` §1 explicitly scopes generic PCI
/// config-space enumeration out of the driver core; this is the seam it
/// consumes the result through.
pub trait PciBus {
    fn device_count(&self) -> usize;
    fn device(&self, index: usize) -> PciDeviceInfo;
    /// Reads BAR number `bar` (0-5) of `device`.
    fn read_bar(&self, device: PciDeviceInfo, bar: u8) -> u32;
    /// Writes the PCI interrupt line register, used when a controller is
    /// running in native mode and wants a specific IRQ wired up.
    fn write_interrupt_line(&self, device: PciDeviceInfo, irq: u8);
}

/// Opaque handle returned by [`IrqLine::attach`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IrqHandle(pub u32);

/// Result an ISR returns to the host's interrupt dispatcher: whether the
/// deferred interrupt service thread should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsrResult {
    /// Analogous to QNX's `INT_CONTINUE`: dispatch the IST.
    DispatchIst,
    /// Spurious: the ISR consumed nothing, do not dispatch.
    Ignore,
}

/// Interrupt-line registration, standing in for `irq_attach`.
pub trait IrqLine {
    fn attach(&self, irq: u8) -> IrqHandle;
}

/// Opaque completion-event handle, created by [`Scheduler::event_init`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventId(pub u32);

/// Why a parked caller woke up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    /// The event was signaled by [`Scheduler::wakeup`].
    Completion,
    /// The sleep was interrupted by a signal-equivalent (`SLP_INTR`).
    Signal,
}

/// The host scheduler's locking and parking primitives
/// (`sched_lock`/`sched_unlock`/`sched_sleep`/`sched_wakeup`/`event_init`).
pub trait Scheduler {
    fn event_init(&self, name: &str) -> EventId;
    fn lock(&self);
    fn unlock(&self);
    /// Atomically releases the scheduler lock and parks the caller until
    /// `event` is signaled or a pending signal interrupts the sleep.
    fn sleep(&self, event: EventId) -> WakeReason;
    fn wakeup(&self, event: EventId);
}

/// Publishes a probed disk or partition to the rest of the host system,
/// standing in for `device_create`/`device_private` (`spec.md` §6).
/// KidneyOS's equivalent is `BlockManager::register_block`, called from
/// `ata_core::identify_ata_device` for disks and
/// `partition_core::found_partition` for partitions; this trait is the
/// seam a real kernel implements against its own device tree instead of
/// a single global `BlockManager`.
pub trait DeviceRegistry {
    fn register_disk(&self, name: &str, total_sectors: u64);
    fn register_partition(&self, name: &str, partition_type: u8, sector_count: u64);
}

/// Maps a caller-supplied buffer into a kernel-addressable slice, standing
/// in for `kmem_map`. Returns `None` on failure (the kernel's `kmem_map`
/// returning `NULL`), which the facade turns into `EFAULT`.
pub trait MapUserBuffer {
    /// # Safety
    /// `user_ptr`/`len` describe a caller-owned region; implementations
    /// must only return a slice that is actually valid for `len` bytes of
    /// read-write access for the duration the returned borrow is held.
    unsafe fn map<'a>(&self, user_ptr: usize, len: usize) -> Option<&'a mut [u8]>;
}
