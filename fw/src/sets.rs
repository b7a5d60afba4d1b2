// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flash metadata walker.
//!
//! The image generator appends a metadata region at 48KB and the remapped
//! ROM tables at 64KB.  Neither is linked into this binary - everything is
//! found by address and validated as it is read.  No allocation: records are
//! walked in place and table data is handed out as a `&'static [u8]` over
//! the memory-mapped flash.

use ghostrom_config::chip::{CsLogic, RomType};
use ghostrom_config::serve::ServeAlg;

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const METADATA_OFFSET: u32 = 48 * 1024;
const FLASH_SIZE: u32 = 0x0010_0000;

const HEADER_MAGIC: &[u8; 16] = b"GHOSTROM_META\0\0\0";
const MAX_VERSION: u32 = 1;
const SET_RECORD_LEN: u32 = 16;
const ROM_RECORD_LEN: u32 = 8;
const NO_FILENAME: u32 = 0xFFFF_FFFF;
const MAX_FILENAME_LEN: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    BadMagic,
    UnsupportedVersion(u32),
    NoSets,
    SetOutOfRange(u8),
    BadPointer(u32),
    BadField(&'static str, u8),
}

fn rd_u8(addr: u32) -> u8 {
    unsafe { (addr as *const u8).read_volatile() }
}

fn rd_u32(addr: u32) -> u32 {
    // All u32 fields in the metadata are 4-aligned
    unsafe { (addr as *const u32).read_volatile() }
}

fn check_ptr(ptr: u32, len: u32) -> Result<u32, Error> {
    if ptr < FLASH_BASE || ptr.saturating_add(len) > FLASH_BASE + FLASH_SIZE {
        return Err(Error::BadPointer(ptr));
    }
    Ok(ptr)
}

/// First chip of a set, as recorded by the generator.
#[derive(Debug, Clone, Copy)]
pub struct RomRecord {
    pub rom_type: RomType,
    pub cs1: CsLogic,
    pub cs2: CsLogic,
    pub cs3: CsLogic,
    pub filename: Option<&'static str>,
}

/// One servable ROM set.
pub struct RomSet {
    pub index: u8,
    pub data: &'static [u8],
    pub rom_count: u8,
    pub serve: ServeAlg,

    /// Shared CS1 polarity for multi-ROM sets, `Ignore` otherwise
    pub multi_cs1: CsLogic,

    /// First chip's record.  The serve loop only needs chip 0 - the table
    /// already encodes the bank layout for multi-ROM sets.
    pub rom: RomRecord,
}

/// The validated metadata region.
pub struct RomSets {
    count: u8,
    sets_ptr: u32,
}

impl RomSets {
    /// Validates the header at flash + 48KB.
    pub fn load() -> Result<Self, Error> {
        let base = FLASH_BASE + METADATA_OFFSET;

        for (i, &m) in HEADER_MAGIC.iter().enumerate() {
            if rd_u8(base + i as u32) != m {
                return Err(Error::BadMagic);
            }
        }

        let version = rd_u32(base + 16);
        if version > MAX_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let count = rd_u8(base + 20);
        if count == 0 {
            return Err(Error::NoSets);
        }

        let sets_ptr = check_ptr(rd_u32(base + 24), count as u32 * SET_RECORD_LEN)?;

        Ok(RomSets { count, sets_ptr })
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    /// Walks out set `index`.
    pub fn set(&self, index: u8) -> Result<RomSet, Error> {
        if index >= self.count {
            return Err(Error::SetOutOfRange(index));
        }
        let rec = self.sets_ptr + index as u32 * SET_RECORD_LEN;

        let data_ptr = check_ptr(rd_u32(rec), rd_u32(rec + 4))?;
        let size = rd_u32(rec + 4);
        let roms_ptr = rd_u32(rec + 8);
        let rom_count = rd_u8(rec + 12);
        let serve = ServeAlg::from_metadata_value(rd_u8(rec + 13))
            .ok_or(Error::BadField("serve", rd_u8(rec + 13)))?;
        let multi_cs1 = CsLogic::from_metadata_value(rd_u8(rec + 14))
            .ok_or(Error::BadField("multi_cs1", rd_u8(rec + 14)))?;

        if rom_count == 0 {
            return Err(Error::BadField("rom_count", 0));
        }
        check_ptr(roms_ptr, rom_count as u32 * 4)?;

        // Only chip 0's record is needed at runtime
        let rom_ptr = check_ptr(rd_u32(roms_ptr), ROM_RECORD_LEN)?;
        let rom = RomRecord {
            rom_type: RomType::from_metadata_value(rd_u8(rom_ptr))
                .ok_or(Error::BadField("rom_type", rd_u8(rom_ptr)))?,
            cs1: CsLogic::from_metadata_value(rd_u8(rom_ptr + 1))
                .ok_or(Error::BadField("cs1", rd_u8(rom_ptr + 1)))?,
            cs2: CsLogic::from_metadata_value(rd_u8(rom_ptr + 2))
                .ok_or(Error::BadField("cs2", rd_u8(rom_ptr + 2)))?,
            cs3: CsLogic::from_metadata_value(rd_u8(rom_ptr + 3))
                .ok_or(Error::BadField("cs3", rd_u8(rom_ptr + 3)))?,
            filename: read_filename(rd_u32(rom_ptr + 4)),
        };

        let data =
            unsafe { core::slice::from_raw_parts(data_ptr as *const u8, size as usize) };

        Ok(RomSet {
            index,
            data,
            rom_count,
            serve,
            multi_cs1,
            rom,
        })
    }
}

// NUL-terminated, for boot logs only.  Anything dubious becomes None rather
// than an error.
fn read_filename(ptr: u32) -> Option<&'static str> {
    if ptr == NO_FILENAME || check_ptr(ptr, MAX_FILENAME_LEN).is_err() {
        return None;
    }

    let mut len = 0u32;
    while len < MAX_FILENAME_LEN {
        if rd_u8(ptr + len) == 0 {
            break;
        }
        len += 1;
    }
    if len == MAX_FILENAME_LEN {
        return None;
    }

    let bytes = unsafe { core::slice::from_raw_parts(ptr as *const u8, len as usize) };
    core::str::from_utf8(bytes).ok()
}
