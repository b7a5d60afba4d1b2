// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ghostrom-fw-parser
//!
//! Parses the flash metadata and RAM runtime structures of Ghost ROM
//! firmware, for host tooling: flashers that need to know where the ROM
//! tables live, and debug-probe utilities that inspect a running device.
//!
//! All access goes through the [`Reader`] trait, so the same code works
//! against a firmware file on disk and against a live target behind a
//! probe.  Use [`GhostMetadata::from_reader()`] as the entry point.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod parsing;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use deku::prelude::*;

use ghostrom_config::chip::{CsLogic, RomType};
use ghostrom_config::hw::{Board, NO_PIN};
use ghostrom_config::serve::ServeAlg;

/// Highest metadata version this parser understands
pub const MAX_METADATA_VERSION: u32 = 1;

/// Offset of the metadata from the start of flash
pub const METADATA_OFFSET: u32 = 48 * 1024;

/// Byte-level access to a firmware image, by absolute address.
///
/// Implement over a local buffer with [`SliceReader`], or over a debug
/// probe for live targets.
pub trait Reader {
    type Error;

    /// Fills `buf` from `addr`.  Must fill the whole buffer or error.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> core::result::Result<(), Self::Error>;
}

/// [`Reader`] over an in-memory copy of the firmware, mapped at `base`.
pub struct SliceReader<'a> {
    base: u32,
    data: &'a [u8],
}

impl<'a> SliceReader<'a> {
    pub fn new(base: u32, data: &'a [u8]) -> Self {
        Self { base, data }
    }
}

impl Reader for SliceReader<'_> {
    type Error = ();

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> core::result::Result<(), ()> {
        let start = addr.checked_sub(self.base).ok_or(())? as usize;
        let end = start.checked_add(buf.len()).ok_or(())?;
        if end > self.data.len() {
            return Err(());
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// ROM type as encoded in firmware metadata
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite, serde::Serialize, serde::Deserialize,
)]
#[deku(id_type = "u8")]
#[serde(rename_all = "snake_case")]
pub enum GhostRomType {
    #[deku(id = 0)]
    Rom2316,
    #[deku(id = 1)]
    Rom2332,
    #[deku(id = 2)]
    Rom2364,
}

impl GhostRomType {
    pub const fn rom_type(&self) -> RomType {
        match self {
            GhostRomType::Rom2316 => RomType::Rom2316,
            GhostRomType::Rom2332 => RomType::Rom2332,
            GhostRomType::Rom2364 => RomType::Rom2364,
        }
    }
}

impl From<RomType> for GhostRomType {
    fn from(rom_type: RomType) -> Self {
        match rom_type {
            RomType::Rom2316 => GhostRomType::Rom2316,
            RomType::Rom2332 => GhostRomType::Rom2332,
            RomType::Rom2364 => GhostRomType::Rom2364,
        }
    }
}

impl core::fmt::Display for GhostRomType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.rom_type().name())
    }
}

/// Chip select line state as encoded in firmware metadata
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite, serde::Serialize, serde::Deserialize,
)]
#[deku(id_type = "u8")]
#[serde(rename_all = "snake_case")]
pub enum GhostCsState {
    #[deku(id = 0)]
    ActiveLow,
    #[deku(id = 1)]
    ActiveHigh,
    #[deku(id = 2)]
    NotUsed,
}

impl GhostCsState {
    pub const fn cs_logic(&self) -> CsLogic {
        match self {
            GhostCsState::ActiveLow => CsLogic::ActiveLow,
            GhostCsState::ActiveHigh => CsLogic::ActiveHigh,
            GhostCsState::NotUsed => CsLogic::Ignore,
        }
    }
}

/// Serving algorithm as encoded in firmware metadata
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite, serde::Serialize, serde::Deserialize,
)]
#[deku(id_type = "u8")]
#[serde(rename_all = "snake_case")]
pub enum GhostServe {
    #[deku(id = 0)]
    Default,
    #[deku(id = 1)]
    TwoCsOneAddr,
    #[deku(id = 2)]
    AddrOnCs,
    #[deku(id = 3)]
    AddrOnAnyCs,
}

impl GhostServe {
    pub const fn serve_alg(&self) -> ServeAlg {
        match self {
            GhostServe::Default => ServeAlg::Default,
            GhostServe::TwoCsOneAddr => ServeAlg::TwoCsOneAddr,
            GhostServe::AddrOnCs => ServeAlg::AddrOnCs,
            GhostServe::AddrOnAnyCs => ServeAlg::AddrOnAnyCs,
        }
    }
}

/// Information about a single ROM image in the firmware
#[derive(Debug, Clone, serde::Serialize)]
pub struct GhostRomInfo {
    pub rom_type: GhostRomType,
    pub cs1_state: GhostCsState,
    pub cs2_state: GhostCsState,
    pub cs3_state: GhostCsState,

    /// Source filename, if the generator recorded one
    pub filename: Option<String>,
}

/// Information about a set of ROMs in the firmware
///
/// Single ROMs get a set each; ROMs served together share one set.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GhostRomSet {
    /// Absolute flash address of this set's serve table.  The table is
    /// post-processed: index with [`mangle_address()`], interpret bytes
    /// with [`demangle_byte()`].
    pub data_ptr: u32,

    /// Size of the serve table in bytes
    pub size: u32,

    /// The ROMs in this set
    pub roms: Vec<GhostRomInfo>,

    pub rom_count: u8,

    /// The serving algorithm used for this set
    pub serve: GhostServe,

    /// Shared CS1/X1/X2 polarity.  Only meaningful for multi-ROM sets.
    pub multi_rom_cs1_state: GhostCsState,
}

/// Parsed firmware metadata
#[derive(Debug, Clone, serde::Serialize)]
pub struct GhostMetadata {
    pub version: u32,
    pub rom_sets: Vec<GhostRomSet>,
}

impl GhostMetadata {
    /// Reads and parses the metadata of a firmware image whose flash is
    /// mapped at `flash_base`.
    pub fn from_reader<R: Reader>(reader: &mut R, flash_base: u32) -> Result<Self, String> {
        let header = parsing::read_metadata_header(reader, flash_base + METADATA_OFFSET)?;

        log::debug!(
            "Metadata v{} with {} ROM set(s)",
            header.version,
            header.rom_set_count
        );

        let rom_sets = parsing::read_rom_sets(
            reader,
            header.rom_sets_ptr,
            header.rom_set_count,
            flash_base,
        )?;

        Ok(Self {
            version: header.version,
            rom_sets,
        })
    }

    /// Reads a set's serve table out of the firmware.
    pub fn read_set_data<R: Reader>(
        &self,
        reader: &mut R,
        set_index: usize,
    ) -> Result<Vec<u8>, String> {
        let set = self
            .rom_sets
            .get(set_index)
            .ok_or_else(|| format!("No ROM set {set_index}"))?;

        let mut data = alloc::vec![0u8; set.size as usize];
        reader
            .read(set.data_ptr, &mut data)
            .map_err(|_| format!("Failed to read ROM set data at {:#010X}", set.data_ptr))?;
        Ok(data)
    }
}

/// Runtime state the firmware maintains at the start of RAM
#[derive(Debug, Clone, serde::Serialize)]
pub struct GhostRuntimeInfo {
    /// Select jumper value read at boot
    pub image_sel: u8,

    /// Index of the ROM set being served
    pub rom_set_index: u8,

    /// Whether the firmware counts ROM accesses
    pub count_rom_access: bool,

    /// Access count, live while the firmware runs
    pub access_count: u32,

    /// Address of the serve table in use (flash, or RAM when preloaded)
    pub rom_table_ptr: u32,

    pub rom_table_size: u32,
}

impl GhostRuntimeInfo {
    /// Size of the structure in RAM, including its magic
    pub const SIZE: usize = 20;

    /// Offset of the live access count field, for tooling that polls it
    pub const ACCESS_COUNT_OFFSET: usize = 8;

    /// Parses the structure from a copy of the start of RAM.
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let header = parsing::parse_and_validate_runtime_info(data)?;
        Ok(Self {
            image_sel: header.image_sel,
            rom_set_index: header.rom_set_index,
            count_rom_access: header.count_rom_access != 0,
            access_count: header.access_count,
            rom_table_ptr: header.rom_table_ptr,
            rom_table_size: header.rom_table_size,
        })
    }
}

/// Demangles a byte from the physical pin representation to the logical
/// byte the emulated ROM drives on D0-D7.  Use when looking up a byte in
/// the serve table to get the "real" byte.
pub fn demangle_byte(board: &Board, byte: u8) -> u8 {
    let mut result = 0u8;
    for (logic_bit, &phys_pin) in board.data.iter().enumerate() {
        assert!(phys_pin < 8, "Physical pin {} out of range", phys_pin);
        if (byte & (1 << phys_pin)) != 0 {
            result |= 1 << logic_bit;
        }
    }
    result
}

/// Takes a logical address and all chip select line states, and produces
/// the table index the firmware uses to look up a byte in the serve table.
/// Use together with [`demangle_byte()`] to read logical bytes back out of
/// a built firmware.
///
/// CS and bank lines are folded into high logical address bits before the
/// pin permutation: CS1 at bit 13, the type-specific CS2/CS3 below it, and
/// X1/X2 at bits 14/15 for multi-ROM sets.
pub fn mangle_address(
    board: &Board,
    rom_type: RomType,
    rom_count: u8,
    addr: u32,
    cs1: bool,
    cs2: Option<bool>,
    cs3: Option<bool>,
    x1: Option<bool>,
    x2: Option<bool>,
) -> Result<u32, String> {
    let mut pin_to_addr_map = board.pin_to_addr_map();

    if rom_count > 1 {
        if board.x1 == NO_PIN || board.x2 == NO_PIN {
            return Err(format!(
                "Board {} has no bank lines for a multi-ROM set",
                board.name
            ));
        }
        assert!(
            pin_to_addr_map[board.x1 as usize].is_none()
                && pin_to_addr_map[board.x2 as usize].is_none(),
            "X1 and X2 pins must not overlap with address pins"
        );
        pin_to_addr_map[board.x1 as usize] = Some(14);
        pin_to_addr_map[board.x2 as usize] = Some(15);
    }

    pin_to_addr_map[board.cs1(rom_type) as usize] = Some(13);
    match rom_type {
        RomType::Rom2364 => {}
        RomType::Rom2332 => {
            pin_to_addr_map[board.cs2_2332 as usize] = Some(12);
        }
        RomType::Rom2316 => {
            pin_to_addr_map[board.cs2_2316 as usize] = Some(11);
            pin_to_addr_map[board.cs3_2316 as usize] = Some(12);
        }
    }

    let addr_mask = (1u32 << rom_type.num_addr_lines()) - 1;
    let overflow = addr & !addr_mask;
    if overflow != 0 {
        return Err(format!(
            "Requested address {:#010X} overflows the address space for ROM type {}",
            addr,
            rom_type.name()
        ));
    }

    let mut input_addr = addr & addr_mask;
    if cs1 {
        input_addr |= 1 << 13;
    }
    match rom_type {
        RomType::Rom2364 => {}
        RomType::Rom2332 => {
            if cs2 == Some(true) {
                input_addr |= 1 << 12;
            }
        }
        RomType::Rom2316 => {
            if cs2 == Some(true) {
                input_addr |= 1 << 11;
            }
            if cs3 == Some(true) {
                input_addr |= 1 << 12;
            }
        }
    }

    if rom_count > 1 {
        if x1 == Some(true) {
            input_addr |= 1 << 14;
        }
        if x2 == Some(true) {
            input_addr |= 1 << 15;
        }
    }

    let mut result = 0;
    for (pin, item) in pin_to_addr_map.iter().enumerate() {
        if let Some(addr_bit) = item
            && (input_addr & (1 << addr_bit)) != 0
        {
            result |= 1 << pin;
        }
    }

    Ok(result)
}
