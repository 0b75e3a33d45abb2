//! MBR partition table parsing (`spec.md` §4.3).
//!
//! Grounded on KidneyOS's `block::partitions::partition_core::{PartitionTable,
//! PartitionTableEntry}`, which hand-slices a 512-byte sector buffer at
//! fixed offsets. We keep the same field layout and the same 0xAA55
//! signature check, but parse it with `nom` (already a dependency of the
//! teacher's `kernel` crate) instead of manual slicing, and limit
//! ourselves to the four primary entries (`spec.md` explicitly scopes
//! extended/logical partitions out).

use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::{le_u16, le_u32, u8 as nom_u8};
use nom::sequence::tuple;
use nom::IResult;

pub const SECTOR_SIZE: usize = 512;
const SIGNATURE: u16 = 0xAA55;

/// Partition type bytes that `spec.md` §4.3 treats as "not a data
/// partition" and therefore skips.
const PARTITION_TYPE_EMPTY: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub bootable: bool,
    pub partition_type: u8,
    pub start_lba: u32,
    pub sector_count: u32,
}

fn partition_entry(input: &[u8]) -> IResult<&[u8], Option<PartitionEntry>> {
    let (input, bootable_flag) = nom_u8(input)?;
    let (input, _start_chs) = take(3usize)(input)?;
    let (input, partition_type) = nom_u8(input)?;
    let (input, _end_chs) = take(3usize)(input)?;
    let (input, start_lba) = le_u32(input)?;
    let (input, sector_count) = le_u32(input)?;

    let entry = if partition_type == PARTITION_TYPE_EMPTY || start_lba == 0 || sector_count == 0 {
        None
    } else {
        Some(PartitionEntry {
            bootable: bootable_flag & 0x80 != 0,
            partition_type,
            start_lba,
            sector_count,
        })
    };
    Ok((input, entry))
}

fn mbr(input: &[u8]) -> IResult<&[u8], [Option<PartitionEntry>; 4]> {
    let (input, _bootstrap) = take(446usize)(input)?;
    let (input, entries) = count(partition_entry, 4)(input)?;
    let (input, (signature,)) = tuple((le_u16,))(input)?;
    if signature != SIGNATURE {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let entries: [Option<PartitionEntry>; 4] = entries.try_into().unwrap_or([None; 4]);
    Ok((input, entries))
}

/// Parses a 512-byte sector into its up-to-four primary partition table
/// entries. Returns `None` if the sector isn't a valid MBR (bad
/// signature) rather than an error: an unpartitioned disk is presented by
/// the block facade as a single whole-disk device, not a fault
/// (`spec.md` §4.3, §4.5).
pub fn parse(sector: &[u8; SECTOR_SIZE]) -> Option<[Option<PartitionEntry>; 4]> {
    mbr(sector.as_slice()).ok().map(|(_, entries)| entries)
}
