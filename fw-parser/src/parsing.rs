// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Wire-format structures and parse routines for Ghost ROM firmware.

use deku::prelude::*;
use static_assertions::const_assert_eq;

use crate::Reader;
use crate::{GhostCsState, GhostRomInfo, GhostRomSet, GhostRomType, GhostServe};
use crate::MAX_METADATA_VERSION;

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

// Maximum length of strings and bits of strings read from firmware
const MAX_STRING_LEN: usize = 1024;
const STRING_READ_CHUNK_SIZE: usize = 64;

// Runtime state at the start of RAM.  Reflects the firmware's RuntimeInfo
// structure.
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little", magic = b"grom")]
pub(crate) struct RuntimeInfoHeader {
    pub runtime_info_size: u8,
    pub image_sel: u8,
    pub rom_set_index: u8,
    pub count_rom_access: u8,
    pub access_count: u32,
    pub rom_table_ptr: u32,
    pub rom_table_size: u32,
}

impl RuntimeInfoHeader {
    const RUNTIME_INFO_HEADER_SIZE: usize = 20;

    pub(crate) const fn size() -> usize {
        // Rust struct size ignores the magic bytes
        const_assert_eq!(
            core::mem::size_of::<RuntimeInfoHeader>(),
            RuntimeInfoHeader::RUNTIME_INFO_HEADER_SIZE - 4
        );
        Self::RUNTIME_INFO_HEADER_SIZE
    }
}

// Fixed 64-byte header at the start of the metadata region.
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little", magic = b"GHOSTROM_META\0\0\0")]
pub(crate) struct MetadataHeader {
    pub version: u32,
    #[deku(pad_bytes_after = "3")]
    pub rom_set_count: u8,
    pub rom_sets_ptr: u32,
    pub _reserved: [u8; 36],
}

impl MetadataHeader {
    const METADATA_HEADER_SIZE: usize = 64;

    pub(crate) const fn size() -> usize {
        Self::METADATA_HEADER_SIZE
    }
}

// One entry of the ROM set record array.
#[derive(Debug, DekuRead, DekuWrite)]
pub(crate) struct RomSetHeader {
    #[deku(endian = "little")]
    pub data_ptr: u32,
    #[deku(endian = "little")]
    pub size: u32,
    #[deku(endian = "little")]
    pub roms_ptr: u32,
    pub rom_count: u8,
    pub serve: GhostServe,
    #[deku(pad_bytes_after = "1")]
    pub multi_rom_cs1_state: GhostCsState,
}

impl RomSetHeader {
    const ROM_SET_HEADER_SIZE: usize = 16;

    pub(crate) const fn size() -> usize {
        Self::ROM_SET_HEADER_SIZE
    }
}

// One ROM record, reached through the set's pointer array.
#[derive(Debug, DekuRead, DekuWrite)]
struct RomInfoRecord {
    pub rom_type: GhostRomType,
    pub cs1_state: GhostCsState,
    pub cs2_state: GhostCsState,
    pub cs3_state: GhostCsState,
    #[deku(endian = "little")]
    pub filename_ptr: u32,
}

impl RomInfoRecord {
    const ROM_INFO_RECORD_SIZE: usize = 8;

    fn size() -> usize {
        const_assert_eq!(
            core::mem::size_of::<RomInfoRecord>(),
            RomInfoRecord::ROM_INFO_RECORD_SIZE
        );
        Self::ROM_INFO_RECORD_SIZE
    }
}

/// Parse and validate runtime information from a copy of the start of RAM
pub(crate) fn parse_and_validate_runtime_info(data: &[u8]) -> Result<RuntimeInfoHeader, String> {
    if data.len() < RuntimeInfoHeader::size() {
        return Err("Runtime info data too small".into());
    }

    let (_, header) = RuntimeInfoHeader::from_bytes((data, 0))
        .map_err(|e| format!("Failed to parse runtime info header: {}", e))?;

    if header.runtime_info_size < RuntimeInfoHeader::size() as u8 {
        return Err(format!(
            "Invalid runtime info size: {} < {}",
            header.runtime_info_size,
            RuntimeInfoHeader::size()
        ));
    }

    Ok(header)
}

/// Read and validate the metadata header at the given flash address
pub(crate) fn read_metadata_header<R: Reader>(
    reader: &mut R,
    addr: u32,
) -> Result<MetadataHeader, String> {
    let mut buf = [0u8; MetadataHeader::size()];
    reader
        .read(addr, &mut buf)
        .map_err(|_| format!("Failed to read metadata header at {addr:#010X}"))?;

    let (_, header) = MetadataHeader::from_bytes((&buf, 0))
        .map_err(|e| format!("Failed to parse metadata header: {e}"))?;

    if header.version > MAX_METADATA_VERSION {
        return Err(format!(
            "Metadata version {} unsupported - max version {}",
            header.version, MAX_METADATA_VERSION
        ));
    }

    Ok(header)
}

/// Read ROM sets from firmware
pub(crate) fn read_rom_sets<R: Reader>(
    reader: &mut R,
    ptr: u32,
    count: u8,
    base_addr: u32,
) -> Result<Vec<GhostRomSet>, String> {
    if count == 0 {
        return Ok(Vec::new());
    }

    if ptr < base_addr {
        return Err(format!(
            "ROM set pointer {ptr:#010X} is below base address {base_addr:#010X}"
        ));
    }

    let mut rom_sets = Vec::with_capacity(count as usize);

    for i in 0..count {
        let header_addr = ptr + (i as u32 * RomSetHeader::size() as u32);

        // Read ROM set header
        let mut header_buf = [0u8; RomSetHeader::size()];
        reader
            .read(header_addr, &mut header_buf)
            .map_err(|_| format!("Failed to read ROM set header {i}"))?;

        let (_, header) = RomSetHeader::from_bytes((&header_buf, 0))
            .map_err(|e| format!("Failed to parse ROM set header {i}: {e}"))?;

        // Read ROM records
        let roms = read_rom_infos(reader, &header, base_addr)?;

        // Note: We don't read the table data itself - just store where it is
        rom_sets.push(GhostRomSet {
            data_ptr: header.data_ptr,
            size: header.size,
            roms,
            rom_count: header.rom_count,
            serve: header.serve,
            multi_rom_cs1_state: header.multi_rom_cs1_state,
        });
    }

    Ok(rom_sets)
}

// Read ROM records for one set
fn read_rom_infos<R: Reader>(
    reader: &mut R,
    rom_set_header: &RomSetHeader,
    base_addr: u32,
) -> Result<Vec<GhostRomInfo>, String> {
    let ptr = rom_set_header.roms_ptr;
    let count = rom_set_header.rom_count;

    if count == 0 {
        return Ok(Vec::new());
    }

    if ptr < base_addr {
        return Err(format!(
            "ROM record pointer {ptr:#010X} is below base address {base_addr:#010X}"
        ));
    }

    let mut rom_infos = Vec::with_capacity(count as usize);

    for i in 0..count {
        // Read pointer to ROM record
        let ptr_addr = ptr + (i as u32 * core::mem::size_of::<u32>() as u32);
        let mut ptr_buf = [0u8; core::mem::size_of::<u32>()];
        reader
            .read(ptr_addr, &mut ptr_buf)
            .map_err(|_| format!("Failed to read ROM record pointer {}", i))?;

        let rom_info_ptr = u32::from_le_bytes(ptr_buf);

        // Read the ROM record itself
        let mut info_buf = [0u8; RomInfoRecord::ROM_INFO_RECORD_SIZE];
        reader
            .read(rom_info_ptr, &mut info_buf)
            .map_err(|_| format!("Failed to read ROM record {}", i))?;
        debug_assert_eq!(info_buf.len(), RomInfoRecord::size());

        let (_, info) = RomInfoRecord::from_bytes((&info_buf, 0))
            .map_err(|e| format!("Failed to parse ROM record {}: {}", i, e))?;

        // A missing filename is recorded as the sentinel pointer; anything
        // else invalid is treated the same way rather than failing the parse
        let filename = if info.filename_ptr >= base_addr && info.filename_ptr != 0xFFFFFFFF {
            read_string_at_ptr(reader, info.filename_ptr, base_addr).ok()
        } else {
            None
        };
        if filename.is_none() {
            log::debug!("ROM record {} has no filename", i);
        }

        rom_infos.push(GhostRomInfo {
            rom_type: info.rom_type,
            cs1_state: info.cs1_state,
            cs2_state: info.cs2_state,
            cs3_state: info.cs3_state,
            filename,
        });
    }

    Ok(rom_infos)
}

/// Read a null-terminated string from the given pointer
pub(crate) fn read_string_at_ptr<R: Reader>(
    reader: &mut R,
    ptr: u32,
    base_addr: u32,
) -> Result<String, String> {
    if ptr < base_addr {
        return Err(format!("Invalid pointer: 0x{:08X}", ptr));
    }

    let mut result = Vec::new();
    let mut addr = ptr;
    let mut buf = [0u8; STRING_READ_CHUNK_SIZE];

    loop {
        let chunk_size = buf.len().min(MAX_STRING_LEN - result.len());
        reader
            .read(addr, &mut buf[..chunk_size])
            .map_err(|_| format!("Failed to read string at 0x{:08X}", ptr))?;

        if let Some(null_pos) = buf[..chunk_size].iter().position(|&b| b == 0) {
            result.extend_from_slice(&buf[..null_pos]);
            break;
        }

        result.extend_from_slice(&buf[..chunk_size]);
        addr += chunk_size as u32;

        if result.len() >= MAX_STRING_LEN {
            return Err("String too long (>1KB)".into());
        }
    }

    String::from_utf8(result).map_err(|_| "Invalid UTF-8 string".into())
}
