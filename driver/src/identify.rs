//! IDENTIFY DEVICE response parsing (`spec.md` §4.2).
//!
//! Grounded on KidneyOS's `identify_ata_device`, which reads the 512-byte
//! IDENTIFY response into a `[u8; BLOCK_SECTOR_SIZE]` and pulls the LBA28
//! sector count out of bytes 120..124 by hand. We generalize that to also
//! read the model string and the LBA48 sector count, and replace the
//! manual byte slicing with a `zerocopy`-derived view over the raw
//! 512-byte buffer (grounded on the `zerocopy` dependency already present
//! in the teacher's `kernel/Cargo.toml`).

use crate::error::{DriverError, IoFailure};
use crate::hal::PortIo;
use crate::registers::{offset, RegisterGateway};
use alloc::string::String;
use zerocopy::{FromBytes, FromZeroes};

pub const ATA_IDENTIFY_DEVICE: u8 = 0xEC;

/// Raw layout of the 256 16-bit words returned by IDENTIFY DEVICE, limited
/// to the fields `spec.md` §4.2 cares about. Every ATA string field is
/// stored as byte-swapped 16-bit words, which [`IdentifyData::model`]
/// undoes.
#[derive(FromBytes, FromZeroes)]
#[repr(C)]
struct IdentifyWords {
    _word_0_9: [u16; 10],
    _serial: [u16; 10],
    _word_20_26: [u16; 7],
    model_raw: [u16; 20],
    _word_47_48: [u16; 2],
    capabilities: u16,
    _word_50: u16,
    _word_51_58: [u16; 8],
    _word_59: u16,
    lba28_sectors: u32,
    _word_62_82: [u16; 21],
    command_set_2: u16,
    _word_84_99: [u16; 16],
    lba48_sectors: u64,
    _rest: [u16; 152],
}

const _: () = assert!(core::mem::size_of::<IdentifyWords>() == 512);

/// Bit 8 of word 49 ("capabilities"), byte 99 bit 0: the device supports
/// DMA transfers.
pub(crate) const CAP_DMA: u16 = 1 << 8;
/// Bit 9 of word 49 ("capabilities"): the device supports LBA addressing.
pub(crate) const CAP_LBA: u16 = 1 << 9;
/// Bit 10 of word 83 ("command set supported 2"): the device supports
/// 48-bit addressing.
const CMD_SET_LBA48: u16 = 1 << 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyData {
    pub model: String,
    pub lba_capable: bool,
    /// Whether word 49 reports DMA support. `spec.md` §4.2 step 10 gates
    /// disk admission on this alongside `lba_capable` even though this
    /// driver only ever issues PIO commands: the gate is reproduced as-is
    /// rather than dropped because DMA is unused.
    pub dma_supported: bool,
    pub lba48_capable: bool,
    /// Total addressable sectors: the LBA48 field when the device reports
    /// LBA48 support, otherwise the LBA28 field (`spec.md` §4.2, §9).
    pub total_sectors: u64,
}

impl IdentifyData {
    fn from_words(words: &IdentifyWords) -> Self {
        let lba_capable = words.capabilities & CAP_LBA != 0;
        let dma_supported = words.capabilities & CAP_DMA != 0;
        let lba48_capable = words.command_set_2 & CMD_SET_LBA48 != 0;
        let total_sectors = if lba48_capable && words.lba48_sectors != 0 {
            words.lba48_sectors
        } else {
            u64::from(words.lba28_sectors)
        };
        IdentifyData {
            model: ascii_from_words(&words.model_raw),
            lba_capable,
            dma_supported,
            lba48_capable,
            total_sectors,
        }
    }
}

/// Undoes the ATA string byte-swap: each 16-bit word holds two ASCII
/// bytes in big-endian order relative to the rest of the structure.
/// Trailing spaces are trimmed, matching how device model strings are
/// conventionally padded.
fn ascii_from_words(words: &[u16]) -> String {
    let mut out = String::with_capacity(words.len() * 2);
    for word in words {
        let bytes = word.to_be_bytes();
        out.push(bytes[0] as char);
        out.push(bytes[1] as char);
    }
    out.trim_end().into()
}

/// Issues IDENTIFY DEVICE on the selected device and parses the response.
///
/// The caller must already have selected the device and waited for it to
/// settle; this issues the command, waits for BUSY to clear, and reads
/// the 256-word response via PIO (`spec.md` §4.2).
pub fn identify(gateway: &RegisterGateway<'_>) -> Result<IdentifyData, DriverError> {
    gateway.write_reg(offset::COMMAND_STATUS, ATA_IDENTIFY_DEVICE);
    let status = gateway.wait_not_busy()?;
    if status.error() || status.device_failure() {
        let err = gateway.read_reg(offset::ERROR);
        return Err(DriverError::Eio(IoFailure::Hardware(
            0x8000_0000 | (u32::from(status.raw_value()) << 16) | u32::from(err),
        )));
    }

    let mut raw = [0u8; 512];
    for chunk in raw.chunks_exact_mut(4) {
        let word = gateway.read_data32();
        chunk.copy_from_slice(&word.to_le_bytes());
    }

    let words = IdentifyWords::read_from(&raw[..]).ok_or(DriverError::Efault)?;
    Ok(IdentifyData::from_words(&words))
}
