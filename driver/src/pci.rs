//! PCI IDE controller discovery (`spec.md` §4.0, §6).
//!
//! KidneyOS's `drivers::ata` never probes PCI at all: `ata_channel::new`
//! hardcodes the two legacy ISA port ranges (0x1F0/0x170) and channel
//! IRQs 14/15, the way Pintos (and real-mode BIOS-era IDE) always worked.
//! `spec.md` asks for PCI-attached controllers, which can run a channel
//! in "native" PCI mode (its own BAR-assigned ports and a shared PCI
//! interrupt line) instead of compatibility mode (the same legacy ports
//! and fixed IRQs KidneyOS uses) — selected per channel by the
//! `prog_if` byte, per the Programming Interface byte the PCI IDE
//! controller class (`0x01/0x01`) defines. This module is new relative
//! to the teacher, built against the [`PciBus`](crate::hal::PciBus) and
//! [`IrqLine`](crate::hal::IrqLine) collaborators `spec.md` §6 calls for.

use crate::hal::{IrqLine, PciBus, PciDeviceInfo, PCI_CLASS_STORAGE, PCI_SUBCLASS_IDE};
use crate::model::Channel;
use crate::registers::LEGACY_CONTROL_OFFSET;
use alloc::vec::Vec;
use pciide_shared::log_info;

/// Bit 0 of `prog_if`: primary channel is currently in native-PCI mode
/// (clear means legacy/compatibility mode, ports 0x1F0/0x3F6, IRQ 14).
const PROG_IF_PRIMARY_NATIVE: u8 = 1 << 0;
/// Bit 2 of `prog_if`: secondary channel is currently in native-PCI mode
/// (clear means legacy ports 0x170/0x376, IRQ 15).
const PROG_IF_SECONDARY_NATIVE: u8 = 1 << 2;

const LEGACY_PRIMARY_COMMAND: u16 = 0x1F0;
const LEGACY_PRIMARY_CONTROL: u16 = LEGACY_PRIMARY_COMMAND + LEGACY_CONTROL_OFFSET;
const LEGACY_PRIMARY_IRQ: u8 = 14;
const LEGACY_SECONDARY_COMMAND: u16 = 0x170;
const LEGACY_SECONDARY_CONTROL: u16 = LEGACY_SECONDARY_COMMAND + LEGACY_CONTROL_OFFSET;
const LEGACY_SECONDARY_IRQ: u8 = 15;

/// BAR index pairs PCI assigns a native-mode channel: command base in an
/// even BAR, control base in the following odd BAR (`spec.md` §4.0).
const NATIVE_BAR_PAIRS: [(u8, u8); 2] = [(0, 1), (2, 3)];

fn bar_to_port(raw: u32) -> u16 {
    // Bit 0 set marks an I/O-space BAR; bits 1-2 reserved, the rest is
    // the port base address. PCI BARs for legacy-compatible IDE
    // controllers are always I/O-space.
    (raw & 0xFFFC) as u16
}

/// Probes one PCI storage/IDE function and builds its two channels.
///
/// Each channel is independently native or legacy per the `prog_if` bits;
/// a legacy channel keeps using the fixed ISA ports and IRQ regardless of
/// what the PCI config space's BARs say (`spec.md` §4.0, §9).
pub fn probe_controller(pci: &dyn PciBus, irq_line: &dyn IrqLine, device: PciDeviceInfo) -> [Channel; 2] {
    let primary = if device.prog_if & PROG_IF_PRIMARY_NATIVE != 0 {
        native_channel(pci, irq_line, device, NATIVE_BAR_PAIRS[0])
    } else {
        Channel::new(LEGACY_PRIMARY_COMMAND, LEGACY_PRIMARY_CONTROL, LEGACY_PRIMARY_IRQ)
    };
    let secondary = if device.prog_if & PROG_IF_SECONDARY_NATIVE != 0 {
        native_channel(pci, irq_line, device, NATIVE_BAR_PAIRS[1])
    } else {
        Channel::new(LEGACY_SECONDARY_COMMAND, LEGACY_SECONDARY_CONTROL, LEGACY_SECONDARY_IRQ)
    };
    [primary, secondary]
}

fn native_channel(pci: &dyn PciBus, irq_line: &dyn IrqLine, device: PciDeviceInfo, bars: (u8, u8)) -> Channel {
    let command_base = bar_to_port(pci.read_bar(device, bars.0));
    // Control/altstatus sits two ports past the BAR's base in native mode
    // (`spec.md` §6: BAR1+2 / BAR3+2), unlike the legacy layout where it's
    // a separate fixed port range entirely.
    let control_base = bar_to_port(pci.read_bar(device, bars.1)) + 2;
    let handle = irq_line.attach(0);
    pci.write_interrupt_line(device, handle.0 as u8);
    Channel::new(command_base, control_base, handle.0 as u8)
}

/// Enumerates every PCI function matching the storage/IDE class and
/// subclass, returning the raw device records for [`probe_controller`] to
/// build controllers from.
pub fn discover(pci: &dyn PciBus) -> Vec<PciDeviceInfo> {
    let mut found = Vec::new();
    for index in 0..pci.device_count() {
        let device = pci.device(index);
        if device.class_code == PCI_CLASS_STORAGE && device.subclass == PCI_SUBCLASS_IDE {
            log_info!(
                "found IDE controller at {:02x}:{:02x}.{} (prog_if {:#04x})",
                device.bus,
                device.slot,
                device.function,
                device.prog_if
            );
            found.push(device);
        }
    }
    found
}
