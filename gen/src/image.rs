// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM image table generator.
//!
//! Takes logical ROM images and produces the remapped byte tables the
//! firmware serves from.  Addresses are permuted into input-port bit order
//! and data bytes into output-port bit order ahead of time, so the serve
//! loop is a single indexed load and a single store.
//!
//! Create one or more [`Rom`] instances, group them into [`RomSet`]
//! instances, and call [`RomSet::build_table()`] to get the table to place
//! in flash at the offset the metadata points to.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;

use ghostrom_config::chip::{CsLogic, RomType};
use ghostrom_config::hw::{Board, NO_PIN};
use ghostrom_config::serve::ServeAlg;

use crate::{Error, Result};

/// Value used when told to pad a ROM image
pub const PAD_BLANK_BYTE: u8 = 0xAA;

/// Value served for table regions no ROM in the set responds to
pub const PAD_NO_ROM_BYTE: u8 = 0xAA;

/// How to handle ROM images whose size does not match the ROM type
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeHandling {
    /// No special handling.  Errors if the image size does not exactly match
    /// the ROM size.
    #[default]
    None,

    /// Duplicates the image as many times as needed to fill the ROM.  Errors
    /// if the image size is not an exact divisor of the ROM size.
    Duplicate,

    /// Truncates the image to the ROM size.  Errors if the image already
    /// fits exactly.
    Truncate,

    /// Pads the image out with [`PAD_BLANK_BYTE`].
    Pad,
}

/// Configuration of the up-to-3 chip select lines of a ROM.
///
/// CS2/CS3 are `None` for ROM types that don't have the line, and
/// [`CsLogic::Ignore`] for lines the host board ties permanently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CsConfig {
    pub cs1: CsLogic,
    pub cs2: Option<CsLogic>,
    pub cs3: Option<CsLogic>,
}

impl CsConfig {
    pub fn new(cs1: CsLogic, cs2: Option<CsLogic>, cs3: Option<CsLogic>) -> Self {
        Self { cs1, cs2, cs3 }
    }

    pub fn cs1_logic(&self) -> CsLogic {
        self.cs1
    }

    pub fn cs2_logic(&self) -> Option<CsLogic> {
        self.cs2
    }

    pub fn cs3_logic(&self) -> Option<CsLogic> {
        self.cs3
    }
}

/// Single ROM image.  May be part of a multi-ROM set.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Rom {
    index: usize,

    filename: String,

    rom_type: RomType,

    cs_config: CsConfig,

    data: Vec<u8>,
}

impl Rom {
    fn new(
        index: usize,
        filename: String,
        rom_type: RomType,
        cs_config: CsConfig,
        data: Vec<u8>,
    ) -> Self {
        Self {
            index,
            filename,
            rom_type,
            cs_config,
            data,
        }
    }

    /// Returns the index of the ROM in the configuration
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the chip select configuration for the ROM.
    pub fn cs_config(&self) -> &CsConfig {
        &self.cs_config
    }

    /// Returns the ROM filename to use in metadata.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the ROM type.
    pub fn rom_type(&self) -> RomType {
        self.rom_type
    }

    /// Returns a [`Rom`] instance.
    ///
    /// Takes a raw ROM image (binary data, loaded from file) and processes
    /// it according to the specified size handling (none, duplicate,
    /// truncate, pad) to ensure it matches the expected size for the given
    /// ROM type.
    pub fn from_raw_image(
        index: usize,
        filename: String,
        source: &[u8],
        rom_type: RomType,
        cs_config: CsConfig,
        size_handling: &SizeHandling,
    ) -> Result<Self> {
        let expected_size = rom_type.size_bytes();
        let mut dest = vec![0u8; expected_size];

        // See what handling is required, if any
        match source.len().cmp(&expected_size) {
            Ordering::Equal => {
                // Exact match - error if dup/pad specified unnecessarily
                match size_handling {
                    SizeHandling::None => {
                        dest.copy_from_slice(&source[..expected_size]);
                    }
                    _ => {
                        return Err(Error::RightSize {
                            size: expected_size,
                        });
                    }
                }
            }
            Ordering::Less => {
                // File too small - handle with dup/pad
                match size_handling {
                    SizeHandling::None => {
                        return Err(Error::ImageTooSmall {
                            index,
                            expected: expected_size,
                            actual: source.len(),
                        });
                    }
                    SizeHandling::Duplicate => {
                        if !expected_size.is_multiple_of(source.len()) {
                            return Err(Error::DuplicationNotExactDivisor {
                                image_size: source.len(),
                                expected_size,
                            });
                        }
                        let multiples = expected_size / source.len();

                        // Copy multiples of source into dest
                        for i in 0..multiples {
                            let start = i * source.len();
                            let end = start + source.len();
                            dest[start..end].copy_from_slice(source);
                        }
                    }
                    SizeHandling::Pad => {
                        dest[..source.len()].copy_from_slice(source);
                        for byte in &mut dest[source.len()..] {
                            *byte = PAD_BLANK_BYTE;
                        }
                    }
                    SizeHandling::Truncate => {
                        return Err(Error::ImageTooLarge {
                            image_size: source.len(),
                            expected_size,
                        });
                    }
                }
            }
            Ordering::Greater => {
                match size_handling {
                    SizeHandling::Truncate => {
                        dest.copy_from_slice(&source[..expected_size]);
                    }
                    _ => {
                        return Err(Error::ImageTooLarge {
                            image_size: source.len(),
                            expected_size,
                        });
                    }
                }
            }
        }

        Ok(Self::new(index, filename, rom_type, cs_config, dest))
    }

    // Transforms a physical address (input port bit pattern) into a logical
    // ROM address.  The table stores the physical mapping, so this runs at
    // build time, once per table entry, not in the firmware.
    fn address_to_logical(
        pin_to_addr_map: &[Option<usize>],
        address: usize,
        num_addr_lines: usize,
    ) -> usize {
        let mut result = 0;

        for (pin, item) in pin_to_addr_map.iter().enumerate() {
            if let Some(addr_bit) = item
                && *addr_bit < num_addr_lines
                && (address & (1 << pin)) != 0
            {
                result |= 1 << addr_bit;
            }
        }

        result
    }

    // Rearranges a data byte's bits to match the board's data pin wiring,
    // so the firmware can write the byte straight to the output port.
    //
    // For the shipped boards the mapping is:
    // Original:  7 6 5 4 3 2 1 0
    // Mapped to: 3 4 5 6 7 2 1 0
    pub(crate) fn byte_mangled(byte: u8, board: &Board) -> u8 {
        let mut result = 0;

        for bit_pos in 0..8 {
            if (byte & (1 << bit_pos)) != 0 {
                let new_pos = board.data[bit_pos];
                assert!(new_pos < 8);
                result |= 1 << new_pos;
            }
        }

        result
    }

    // Get byte at the given address with both address and data
    // transformations applied.
    //
    // This function:
    // 1. Transforms the address to match the board's address pin wiring
    // 2. Retrieves the byte at that transformed address
    // 3. Transforms the byte's bit pattern to match the board's data pin
    //    wiring
    //
    // This ensures that when the firmware indexes the table with a raw input
    // port value, it gets the byte the emulated ROM would drive, already in
    // output port order.
    fn get_byte(&self, pin_to_addr_map: &[Option<usize>], address: usize, board: &Board) -> u8 {
        let num_addr_lines = self.rom_type.num_addr_lines();
        let logical = Self::address_to_logical(pin_to_addr_map, address, num_addr_lines);

        // A logical address must by definition fit within the ROM size.
        let byte = self.data.get(logical).copied().unwrap_or_else(|| {
            panic!(
                "Logical address {} out of bounds for ROM image of size {}",
                logical,
                self.data.len()
            )
        });

        Self::byte_mangled(byte, board)
    }
}

/// Type of ROM set
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    /// Single ROM - the default
    #[default]
    Single,

    /// Set of multiple ROMs selected by CS lines.  Allows one Ghost ROM to
    /// serve up to 3 ROM sockets simultaneously.
    Multi,
}

/// A set of ROMs served together.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct RomSet {
    /// ID of the ROM set
    pub id: usize,

    /// Type of ROM set
    pub set_type: SetType,

    /// Serving algorithm for the ROM set
    serve_alg: ServeAlg,

    /// ROMs in the set
    roms: Vec<Rom>,
}

impl RomSet {
    /// Creates a new ROM set of the specified ID, type, and containing the
    /// given ROMs.
    ///
    /// The ID is an arbitrary index, usually the set ID from the config,
    /// starting at 0.
    pub fn new(id: usize, set_type: SetType, serve_alg: ServeAlg, roms: Vec<Rom>) -> Result<Self> {
        // Check some ROMs were supplied
        if roms.is_empty() {
            return Err(Error::NoRoms);
        }

        // Check set type matches number of ROMs
        if roms.len() > 1 && set_type == SetType::Single {
            return Err(Error::TooManyRoms {
                expected: 1,
                actual: roms.len(),
            });
        }

        if roms.len() == 1 && set_type != SetType::Single {
            return Err(Error::TooFewRoms {
                expected: 2,
                actual: roms.len(),
            });
        }

        // Correct the serving algorithm if necessary - a multi-ROM set always
        // uses the any-CS algorithm regardless of what was asked for, but an
        // invalid value for a single set is an error.
        let serve_alg = match set_type {
            SetType::Single => {
                if !matches!(
                    serve_alg,
                    ServeAlg::Default | ServeAlg::AddrOnCs | ServeAlg::TwoCsOneAddr
                ) {
                    return Err(Error::InvalidServeAlg { serve_alg });
                }
                serve_alg
            }
            SetType::Multi => ServeAlg::AddrOnAnyCs,
        };

        Ok(Self {
            id,
            set_type,
            serve_alg,
            roms,
        })
    }

    /// Returns the shared CS polarity for a multi-ROM set.
    ///
    /// CS1/X1/X2 all share one polarity at runtime, so every ROM in the set
    /// must agree on CS1 logic and must ignore CS2/CS3.
    pub fn multi_cs_logic(&self) -> Result<CsLogic> {
        let first_cs1 = self.roms[0].cs_config.cs1_logic();
        if self.roms.len() == 1 {
            // Unused
            return Ok(CsLogic::Ignore);
        }

        for rom in &self.roms {
            if rom.cs_config.cs1_logic() != first_cs1 {
                return Err(Error::InconsistentCsLogic {
                    first: first_cs1,
                    other: rom.cs_config.cs1_logic(),
                });
            }

            if let Some(cs2) = rom.cs_config.cs2_logic()
                && cs2 != CsLogic::Ignore
            {
                return Err(Error::InconsistentCsLogic {
                    first: CsLogic::Ignore,
                    other: cs2,
                });
            }
            if let Some(cs3) = rom.cs_config.cs3_logic()
                && cs3 != CsLogic::Ignore
            {
                return Err(Error::InconsistentCsLogic {
                    first: CsLogic::Ignore,
                    other: cs3,
                });
            }
        }

        Ok(first_cs1)
    }

    /// Returns the size of the table for this ROM set, in bytes.
    pub fn image_size(&self, board: &Board) -> usize {
        match self.set_type {
            SetType::Single => board.single_table_size(),
            SetType::Multi => board.banked_table_size(),
        }
    }

    fn truncate_pin_to_addr_map(map: &mut [Option<usize>], num_addr_lines: usize) {
        // Clear any address lines beyond what the ROM type has - physical
        // lines carrying no logical bit cause the image to repeat across
        // their states, which is exactly what a smaller chip in a bigger
        // socket footprint does.
        for item in map.iter_mut() {
            if let Some(addr_bit) = item
                && *addr_bit >= num_addr_lines
            {
                *item = None;
            }
        }
    }

    /// Gets a byte from the ROM set at the given address (as the MCU sees
    /// it on the input port) and returns the byte, ready for the MCU to
    /// serve.
    pub fn get_byte(&self, address: usize, board: &Board) -> u8 {
        if self.roms.len() == 1 {
            assert!(
                address < board.single_table_size(),
                "Address out of bounds for single ROM set"
            );

            let rom = &self.roms[0];
            let mut map = board.pin_to_addr_map();
            Self::truncate_pin_to_addr_map(&mut map, rom.rom_type.num_addr_lines());
            return rom.get_byte(&map, address, board);
        }

        // Multiple ROMs: check CS line states to select the responding ROM.
        assert!(
            address < board.banked_table_size(),
            "Address out of bounds for multi-ROM set"
        );

        for (index, rom) in self.roms.iter().enumerate() {
            // All of CS1/X1/X2 have the same active low/high status, taken
            // from CS1 (X1/X2 aren't separately configured in the set).
            let active_high = rom.cs_config.cs1_logic() == CsLogic::ActiveHigh;

            let pin_active = |pin: u8| {
                let high = (address & (1 << pin)) != 0;
                if active_high { high } else { !high }
            };

            // Get the CS pin that controls this ROM's selection
            let Some(select_pin) = board.cs_for_chip_in_set(index) else {
                continue;
            };
            if !pin_active(select_pin) {
                continue;
            }

            // A ROM only responds when its line is the only active one -
            // with several select lines active the bus would be contended,
            // so the table serves the blank value instead.
            let mut active_count = 0;
            for pin in [board.cs1, board.x1, board.x2] {
                if pin != NO_PIN && pin_active(pin) {
                    active_count += 1;
                }
            }
            if active_count != 1 {
                continue;
            }

            let mut map = board.pin_to_addr_map();
            Self::truncate_pin_to_addr_map(&mut map, rom.rom_type.num_addr_lines());
            return rom.get_byte(&map, address, board);
        }

        // No ROM is selected, so this part of the address space is blank
        Rom::byte_mangled(PAD_NO_ROM_BYTE, board)
    }

    /// Builds the complete serve table for this set.
    pub fn build_table(&self, board: &Board) -> Result<Vec<u8>> {
        if self.set_type == SetType::Multi && !board.supports_multi_sets() {
            return Err(Error::MultiSetNotSupported { board: board.name });
        }

        // Validates CS consistency up front for multi sets
        self.multi_cs_logic()?;

        let size = self.image_size(board);
        let mut table = vec![0u8; size];
        for (addr, byte) in table.iter_mut().enumerate() {
            *byte = self.get_byte(addr, board);
        }

        Ok(table)
    }

    /// Returns a slice of the ROMs in this set.
    pub fn roms(&self) -> &[Rom] {
        &self.roms
    }

    pub fn serve_alg(&self) -> ServeAlg {
        self.serve_alg
    }
}
