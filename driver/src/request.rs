//! The Request Engine (`spec.md` §4.4): the ISR/IST split that drives one
//! PIO read or write to completion on a channel's single in-flight slot.
//!
//! Grounded on the interaction between KidneyOS's `ata_device::AtaDevice`
//! (`ACCESS_MUTEX[channel].lock()` held for the whole operation,
//! `channel.sem_down()` to park for the interrupt) and
//! `ata_interrupt::on_ide_interrupt` (acks the status register and calls
//! `sem_up()`, or logs a spurious interrupt). We split the same two
//! halves into named entry points — [`RequestEngine::on_interrupt`] for
//! the ISR body, [`RequestEngine::service_completion`] for the interrupt
//! service thread that drains the PIO data — so each can be driven
//! directly in tests instead of only through a real IDT vector.

use crate::error::{DriverError, IoFailure};
use crate::hal::{EventId, Scheduler, WakeReason};
use crate::registers::{offset, DeviceSelect, RegisterGateway};
use pciide_shared::{log_error, log_info, Mutex};

pub const ATA_READ_SECTOR_EXT: u8 = 0x24;
pub const ATA_WRITE_SECTOR_EXT: u8 = 0x34;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Issued,
    DataReady,
    CompleteOk,
    CompleteErr,
}

/// A raw view of the caller's transfer buffer, stashed in the slot so the
/// interrupt service thread can reach it without sharing the issuing
/// call's stack frame.
///
/// `spec.md` §4.4/§5: the single-in-flight-slot invariant means only one
/// `BufferHandle` is ever live per channel, and it is only read back by
/// [`RequestEngine::service_completion`] while still holding the slot
/// lock that guards it, so exclusive access is guaranteed even though the
/// pointer itself isn't `Send` by default.
struct BufferHandle {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: see the `BufferHandle` doc comment above.
unsafe impl Send for BufferHandle {}

struct Slot {
    state: RequestState,
    outcome: Option<Result<(), DriverError>>,
    expecting_interrupt: bool,
    buffer: Option<BufferHandle>,
    write: bool,
}

/// Guards a channel's single in-flight PIO request slot. A controller
/// with two channels owns two of these, mirroring `ACCESS_MUTEX`'s
/// per-channel indexing.
pub struct RequestEngine {
    slot: Mutex<Slot>,
}

impl RequestEngine {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: RequestState::Idle,
                outcome: None,
                expecting_interrupt: false,
                buffer: None,
                write: false,
            }),
        }
    }

    pub fn state(&self) -> RequestState {
        self.slot.lock().state
    }

    /// Programs the LBA48 command-block registers and issues the command,
    /// leaving the channel waiting for an interrupt.
    ///
    /// `spec.md` §4.4 notes the command-block registers are a two-deep
    /// FIFO: each of SECTOR_COUNT and the three LBA registers must be
    /// written twice, high byte before low byte, so the controller's
    /// internal latch ends up holding the correct 48-bit value. Device
    /// selection happens first so the FIFO being written belongs to the
    /// right device.
    pub fn begin(
        &self,
        gateway: &RegisterGateway<'_>,
        slave: bool,
        lba: u64,
        sector_count: u16,
        buf: &mut [u8],
        write: bool,
    ) {
        let contended_before = self.slot.contention_count();
        let mut slot = self.slot.lock();
        if self.slot.contention_count() != contended_before {
            // Expected if the IST is still draining the previous
            // request; suspicious otherwise, since `spec.md` §9 rules
            // out concurrent in-flight requests per controller.
            log_info!("channel's request slot was contended when beginning a new request");
        }
        slot.state = RequestState::Issued;
        slot.outcome = None;
        slot.expecting_interrupt = true;
        slot.write = write;
        slot.buffer = Some(BufferHandle {
            ptr: buf.as_mut_ptr(),
            len: buf.len(),
        });
        drop(slot);

        let lba_bytes = lba.to_le_bytes();
        gateway.write_reg(offset::DISK_SELECT, DeviceSelect::for_device(slave).raw_value());
        gateway.delay_400ns();

        gateway.write_reg(offset::SECTOR_COUNT, (sector_count >> 8) as u8);
        gateway.write_reg(offset::LBA_LOW, lba_bytes[3]);
        gateway.write_reg(offset::LBA_MID, lba_bytes[4]);
        gateway.write_reg(offset::LBA_HIGH, lba_bytes[5]);

        gateway.write_reg(offset::SECTOR_COUNT, (sector_count & 0xFF) as u8);
        gateway.write_reg(offset::LBA_LOW, lba_bytes[0]);
        gateway.write_reg(offset::LBA_MID, lba_bytes[1]);
        gateway.write_reg(offset::LBA_HIGH, lba_bytes[2]);

        let command = if write {
            ATA_WRITE_SECTOR_EXT
        } else {
            ATA_READ_SECTOR_EXT
        };
        gateway.write_reg(offset::COMMAND_STATUS, command);
    }

    /// The ISR body: acknowledges the interrupt if this channel was
    /// expecting one, otherwise logs it as spurious and leaves the slot
    /// untouched (`spec.md` §4.4, mirroring
    /// `ata_interrupt::on_ide_interrupt`'s else branch). Must be fast: it
    /// only reads the status register to clear the interrupt line, it
    /// never drains PIO data.
    pub fn on_interrupt(&self, gateway: &RegisterGateway<'_>) -> crate::hal::IsrResult {
        let slot = self.slot.lock();
        if !slot.expecting_interrupt {
            log_error!("spurious IDE interrupt, channel not expecting one");
            return crate::hal::IsrResult::Ignore;
        }
        drop(slot);
        gateway.read_reg(offset::COMMAND_STATUS);
        crate::hal::IsrResult::DispatchIst
    }

    /// The interrupt service thread: drains (or pushes) the PIO data,
    /// computes the completion result, and records it on the slot before
    /// waking the parked caller.
    ///
    /// The slot's state and outcome are set while still holding the slot
    /// lock, and [`Scheduler::wakeup`] is only called after that guard is
    /// dropped, so a caller woken by `wakeup` is guaranteed to observe the
    /// completed state and can read the outcome back out without racing
    /// the write (`spec.md` §4.4, §9).
    pub fn service_completion(&self, gateway: &RegisterGateway<'_>, scheduler: &dyn Scheduler, event: EventId) {
        let status = gateway.read_altstatus();
        let mut slot = self.slot.lock();
        let write = slot.write;
        // SAFETY: `buffer` was stashed by `begin` from a caller-owned
        // slice that outlives the request (the caller is parked in
        // `wait`, not free to drop its buffer); the slot lock ensures
        // only this call ever reads it before it's cleared below.
        let buf = slot
            .buffer
            .take()
            .map(|handle| unsafe { core::slice::from_raw_parts_mut(handle.ptr, handle.len) });
        drop(slot);

        let outcome = if status.error() || status.device_failure() {
            let err = gateway.read_reg(offset::ERROR);
            log_error!("ATA command failed: status={:#04x} error={:#04x}", status.raw_value(), err);
            Err(DriverError::Eio(IoFailure::Hardware(
                0x8000_0000 | (u32::from(status.raw_value()) << 16) | u32::from(err),
            )))
        } else if let Some(buf) = buf {
            if write {
                for chunk in buf.chunks_exact(4) {
                    gateway.write_data32(u32::from_le_bytes(chunk.try_into().unwrap()));
                }
            } else {
                for chunk in buf.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&gateway.read_data32().to_le_bytes());
                }
            }
            log_info!("ATA {} of {} bytes complete", if write { "write" } else { "read" }, buf.len());
            Ok(())
        } else {
            Ok(())
        };

        let mut slot = self.slot.lock();
        slot.state = if outcome.is_ok() {
            RequestState::CompleteOk
        } else {
            RequestState::CompleteErr
        };
        slot.outcome = Some(outcome);
        slot.expecting_interrupt = false;
        drop(slot);

        scheduler.wakeup(event);
    }

    /// Parks the caller until the request completes or is interrupted,
    /// then returns the recorded outcome and resets the slot to `Idle`.
    ///
    /// An interrupted sleep (`WakeReason::Signal`) abandons the in-flight
    /// command: `spec.md` §4.4/§9 treats this as `EINTR` without waiting
    /// for the device, since a polled or reset channel will eventually
    /// clear BUSY on its own before the next request is issued.
    pub fn wait(&self, scheduler: &dyn Scheduler, event: EventId) -> Result<(), DriverError> {
        match scheduler.sleep(event) {
            WakeReason::Signal => {
                let mut slot = self.slot.lock();
                slot.state = RequestState::Idle;
                slot.expecting_interrupt = false;
                Err(DriverError::Eintr)
            }
            WakeReason::Completion => {
                let mut slot = self.slot.lock();
                let outcome = slot.outcome.take().unwrap_or(Ok(()));
                slot.state = RequestState::Idle;
                outcome
            }
        }
    }
}

impl Default for RequestEngine {
    fn default() -> Self {
        Self::new()
    }
}
