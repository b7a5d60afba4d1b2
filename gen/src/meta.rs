// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Flash metadata generator.
//!
//! Lays out the structures the firmware walks at boot: a fixed header, the
//! array of ROM set records, per-ROM records reached through an indirection
//! array, and null-terminated filenames.  All pointers are absolute flash
//! addresses, little-endian.

use alloc::vec;
use alloc::vec::Vec;

use ghostrom_config::hw::Board;

use crate::image::RomSet;
use crate::{Error, FIRMWARE_SIZE, METADATA_VERSION, Result};

pub const PAD_METADATA_BYTE: u8 = 0xFF;

const HEADER_MAGIC: &[u8; 16] = b"GHOSTROM_META\0\0\0";

/// Start of flash on the STM32F4.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Metadata starts at 48KB from the start of flash, directly after the
/// firmware.
pub const METADATA_START: u32 = FIRMWARE_SIZE as u32;

/// ROM tables start at 64KB from the start of flash.
pub const DATA_START: u32 = 65536;

/// Metadata max length
pub const MAX_METADATA_LEN: usize = 16384;

const METADATA_HEADER_LEN: usize = 64;

// Offset of the set array pointer in the header
const METADATA_SET_PTR_OFFSET: usize = 24;

pub(crate) const ROM_SET_METADATA_LEN: usize = 16;
pub(crate) const ROM_METADATA_LEN: usize = 8;

impl RomSet {
    /// Returns the length of metadata required for all of the ROMs in this
    /// set, not including the array of pointers to them.
    pub fn roms_metadata_len(&self) -> usize {
        ROM_METADATA_LEN * self.roms().len()
    }

    /// Writes the ROM metadata records for all ROMs in this set.
    ///
    /// Returns the number of bytes written, and fills `rom_metadata_ptrs`
    /// with the offset of each record so the pointer array can be written
    /// afterwards.
    pub fn write_rom_metadata(
        &self,
        buf: &mut [u8],
        filename_ptrs: &[u32],
        rom_metadata_ptrs: &mut [u32],
        filenames: bool,
    ) -> Result<usize> {
        let num_roms = self.roms().len();

        // Check enough buffer space
        let expected_len = self.roms_metadata_len();
        if buf.len() < expected_len {
            return Err(Error::BufferTooSmall {
                location: "write_rom_metadata1",
                expected: expected_len,
                actual: buf.len(),
            });
        }

        // Check enough space for pointers
        if rom_metadata_ptrs.len() < num_roms {
            return Err(Error::BufferTooSmall {
                location: "write_rom_metadata2",
                expected: num_roms,
                actual: rom_metadata_ptrs.len(),
            });
        }

        let mut offset = 0;

        for (ii, rom) in self.roms().iter().enumerate() {
            // Set up the pointer to be returned first
            rom_metadata_ptrs[ii] = offset as u32;

            // Write the ROM type
            buf[offset] = rom.rom_type().metadata_value();
            offset += 1;

            // Write the CS states.  Absent lines encode as Ignore.
            buf[offset] = rom.cs_config().cs1_logic().metadata_value();
            offset += 1;
            buf[offset] = rom
                .cs_config()
                .cs2_logic()
                .map_or(2, |cs| cs.metadata_value());
            offset += 1;
            buf[offset] = rom
                .cs_config()
                .cs3_logic()
                .map_or(2, |cs| cs.metadata_value());
            offset += 1;

            // Filename pointer, or the sentinel when filenames are omitted
            let filename_ptr = if filenames {
                filename_ptrs
                    .get(rom.index())
                    .copied()
                    .ok_or(Error::MissingPointer { id: rom.index() })?
            } else {
                0xFFFF_FFFF
            };
            buf[offset..offset + 4].copy_from_slice(&filename_ptr.to_le_bytes());
            offset += 4;
        }

        Ok(offset)
    }

    /// Writes the array of pointers to each ROM metadata record.  Must be
    /// called after [`Self::write_rom_metadata()`].
    pub fn write_rom_pointer_array(
        &self,
        buf: &mut [u8],
        rom_metadata_ptrs: &[u32],
    ) -> Result<usize> {
        let num_roms = self.roms().len();

        // Check enough buffer space
        let expected_len = 4 * num_roms;
        if buf.len() < expected_len {
            return Err(Error::BufferTooSmall {
                location: "write_rom_pointer_array",
                expected: expected_len,
                actual: buf.len(),
            });
        }

        // Check enough pointers
        if rom_metadata_ptrs.len() < num_roms {
            return Err(Error::MissingPointer {
                id: rom_metadata_ptrs.len(),
            });
        }

        let mut offset = 0;

        for ptr in rom_metadata_ptrs.iter() {
            buf[offset..offset + 4].copy_from_slice(&ptr.to_le_bytes());
            offset += 4;
        }

        Ok(offset)
    }

    /// Writes the set record for this set.  Must be called for each set one
    /// after the other, in order of set ID, as the records form an array.
    pub fn write_set_metadata(
        &self,
        buf: &mut [u8],
        data_ptr: u32,
        rom_array_ptr: u32,
        board: &Board,
    ) -> Result<usize> {
        // Check enough buffer space
        if buf.len() < ROM_SET_METADATA_LEN {
            return Err(Error::BufferTooSmall {
                location: "write_set_metadata",
                expected: ROM_SET_METADATA_LEN,
                actual: buf.len(),
            });
        }

        let mut offset = 0;

        // Write the table data pointer
        buf[offset..offset + 4].copy_from_slice(&data_ptr.to_le_bytes());
        offset += 4;

        // Write the table data size
        let data_size = self.image_size(board) as u32;
        buf[offset..offset + 4].copy_from_slice(&data_size.to_le_bytes());
        offset += 4;

        // Write the ROM pointer array pointer
        buf[offset..offset + 4].copy_from_slice(&rom_array_ptr.to_le_bytes());
        offset += 4;

        // Write the number of ROMs in this set
        buf[offset] = self.roms().len() as u8;
        offset += 1;

        // Write the serving algorithm
        buf[offset] = self.serve_alg().metadata_value();
        offset += 1;

        // Write the multi-ROM CS polarity
        buf[offset] = self.multi_cs_logic()?.metadata_value();
        offset += 1;

        // Pad to 16 bytes
        buf[offset] = PAD_METADATA_BYTE;
        offset += 1;

        assert_eq!(
            offset, ROM_SET_METADATA_LEN,
            "Internal error: offset does not match record length"
        );

        Ok(offset)
    }
}

/// Metadata for Ghost ROM firmware
#[derive(Debug, serde::Serialize)]
pub struct Metadata {
    board: Board,
    rom_sets: Vec<RomSet>,
    filenames: bool,
}

impl Metadata {
    pub fn new(board: Board, rom_sets: Vec<RomSet>, filenames: bool) -> Self {
        Self {
            board,
            rom_sets,
            filenames,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    const fn header_len(&self) -> usize {
        METADATA_HEADER_LEN
    }

    const fn abs_metadata_start(&self) -> u32 {
        FLASH_BASE + METADATA_START
    }

    const fn abs_data_start(&self) -> u32 {
        FLASH_BASE + DATA_START
    }

    /// Length of buffer required for metadata.
    pub fn metadata_len(&self) -> usize {
        // Size needs to include:
        // - Header (64 bytes)
        // - All ROM filenames - char[]
        // - All ROM set records (16 bytes each)
        // - Array of pointers to ROMs in each set (4 bytes per ROM)
        // - Each ROM record (8 bytes)
        let len = self.header_len() + self.filenames_metadata_len() + self.sets_len();

        if len > MAX_METADATA_LEN {
            panic!(
                "Metadata too large: {} bytes (max {})",
                len, MAX_METADATA_LEN
            );
        }

        len
    }

    pub fn total_set_count(&self) -> usize {
        self.rom_sets.len()
    }

    // Total number of ROMs across all sets
    fn total_rom_count(&self) -> usize {
        self.rom_sets.iter().map(|rs| rs.roms().len()).sum()
    }

    // Total length, including null terminators, of all filenames, aligned
    // to 4 bytes
    fn filenames_metadata_len(&self) -> usize {
        let len = if !self.filenames {
            0
        } else {
            self.rom_sets
                .iter()
                .flat_map(|rs| rs.roms())
                .map(|rom| rom.filename().len() + 1)
                .sum()
        };
        if len % 4 != 0 {
            len + (4 - (len % 4))
        } else {
            len
        }
    }

    // Total length of sets: all set records, all ROM records, and the ROM
    // pointer arrays.  Does not include filename lengths.
    fn sets_len(&self) -> usize {
        let mut total = 0;
        for set in &self.rom_sets {
            total += set.roms_metadata_len();
            total += set.roms().len() * 4;
        }

        total += self.rom_sets.len() * ROM_SET_METADATA_LEN;

        total
    }

    /// Writes all metadata to the provided buffer.
    ///
    /// It is advisable to call [`Self::metadata_len`] first to ensure the
    /// buffer provided is large enough.  Also [`Self::total_set_count`]
    /// should be called to get the number of ROM sets, so the caller can
    /// allocate space for the returned table data pointers.
    ///
    /// The `rtn_data_ptrs` slice is filled with offsets from the start of
    /// the table data location (flash base + 64KB) for each ROM set; the
    /// caller writes each set's table there.
    pub fn write_all(&self, buf: &mut [u8], rtn_data_ptrs: &mut [u32]) -> Result<usize> {
        // Check we have enough of a buffer.
        if self.metadata_len() > buf.len() {
            return Err(Error::BufferTooSmall {
                location: "write_all",
                expected: self.metadata_len(),
                actual: buf.len(),
            });
        }

        let mut offset = 0;

        // Write the header
        offset += self.write_header(&mut buf[offset..])?;

        // Write the filenames.
        let mut filename_ptrs = vec![0xFF_u32; self.total_rom_count()];
        if self.filenames {
            // Store off the offset where filenames start
            let filename_offset = offset;

            // write_filenames() fills in filename_ptrs, but starts at 0
            let filename_len = self.write_filenames(&mut buf[offset..], &mut filename_ptrs)?;
            offset += filename_len;

            // Correct filename pointers to absolute flash addresses
            for ptr in filename_ptrs.iter_mut() {
                *ptr += (filename_offset as u32) + self.abs_metadata_start();
            }

            if filename_len % 4 != 0 {
                // Align to 4 bytes
                let padding = 4 - (filename_len % 4);
                for _ in 0..padding {
                    buf[offset] = PAD_METADATA_BYTE;
                    offset += 1;
                }
            }

            assert_eq!(
                offset % 4,
                0,
                "Metadata offset not 4 byte aligned after writing filenames"
            );
        }

        // Pre-compute where each set's table data will live, so the set
        // records can carry absolute pointers.  Tables are packed one after
        // another from flash base + 64KB.
        let mut table_data_ptrs = vec![0u32; self.rom_sets.len()];
        let mut table_data_ptr = self.abs_data_start();
        let mut rtn_data_ptr = 0;
        for (ii, set) in self.rom_sets.iter().enumerate() {
            table_data_ptrs[ii] = table_data_ptr;
            rtn_data_ptrs[ii] = rtn_data_ptr;
            let table_size = set.image_size(&self.board) as u32;
            table_data_ptr += table_size;
            rtn_data_ptr += table_size;
        }

        // Write each set's ROM records, collecting pointers to each record.
        // The set records themselves come last.
        let mut rom_array_ptrs = vec![Vec::new(); self.rom_sets.len()];
        for (ii, set) in self.rom_sets.iter().enumerate() {
            let mut rom_metadata_ptrs = vec![0u32; set.roms().len()];
            let len = set.write_rom_metadata(
                &mut buf[offset..],
                &filename_ptrs,
                &mut rom_metadata_ptrs,
                self.filenames,
            )?;

            // Now update this set's ROM record pointers to be absolute
            for ptr in rom_metadata_ptrs.iter_mut() {
                *ptr += offset as u32 + self.abs_metadata_start();
            }
            rom_array_ptrs[ii] = rom_metadata_ptrs;

            offset += len;
        }

        // Next, write each of the ROM pointer arrays, noting the absolute
        // address of each array to include in its set record.
        let mut actual_rom_array_ptrs = vec![0u32; self.rom_sets.len()];
        for (ii, set) in self.rom_sets.iter().enumerate() {
            let len = set.write_rom_pointer_array(&mut buf[offset..], &rom_array_ptrs[ii])?;
            actual_rom_array_ptrs[ii] = offset as u32 + self.abs_metadata_start();
            offset += len;
        }

        // Write each set record - together they form an array of records.
        let first_set_ptr = offset as u32 + self.abs_metadata_start();
        for (ii, set) in self.rom_sets.iter().enumerate() {
            offset += set.write_set_metadata(
                &mut buf[offset..],
                table_data_ptrs[ii],
                actual_rom_array_ptrs[ii],
                &self.board,
            )?;
        }

        // Finally, update the pointer to the first ROM set in the header.
        self.update_set_ptr(&mut buf[..], first_set_ptr)?;

        Ok(offset)
    }

    // Writes all ROM filenames to provided buffer.
    fn write_filenames(&self, buf: &mut [u8], ptrs: &mut [u32]) -> Result<usize> {
        if !self.filenames {
            return Ok(0);
        }

        if buf.len() < self.filenames_metadata_len() {
            return Err(Error::BufferTooSmall {
                location: "write_filenames1",
                expected: self.filenames_metadata_len(),
                actual: buf.len(),
            });
        }

        let mut offset = 0;

        // Set up array of filename pointers.
        let num_roms = self.total_rom_count();
        if ptrs.len() < num_roms {
            return Err(Error::BufferTooSmall {
                location: "write_filenames2",
                expected: num_roms,
                actual: ptrs.len(),
            });
        }

        for (ii, rom) in self.rom_sets.iter().flat_map(|rs| rs.roms()).enumerate() {
            assert_eq!(ii, rom.index());

            let name_bytes = rom.filename().as_bytes();
            let len = name_bytes.len();

            // Store off the pointer
            ptrs[ii] = offset as u32;

            // Store the null terminated filename
            buf[offset..offset + len].copy_from_slice(name_bytes);
            offset += len;
            buf[offset] = 0;
            offset += 1;
        }
        Ok(offset)
    }

    fn write_header(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < METADATA_HEADER_LEN {
            return Err(Error::BufferTooSmall {
                location: "write_header",
                expected: METADATA_HEADER_LEN,
                actual: buf.len(),
            });
        }

        let mut offset = 0;
        let len = 16;
        buf[0..offset + len].copy_from_slice(HEADER_MAGIC);
        offset += len;

        let len = 4;
        buf[offset..offset + len].copy_from_slice(&METADATA_VERSION.to_le_bytes());
        offset += len;

        let len = 1;
        buf[offset..offset + len].copy_from_slice(&[self.rom_sets.len() as u8]);
        offset += len;

        let len = 3;
        buf[offset..offset + len].copy_from_slice(&[0u8; 3]);
        offset += len;

        // Patched with the real pointer once the set records are written
        let len = 4;
        assert_eq!(offset, METADATA_SET_PTR_OFFSET);
        buf[offset..offset + len].copy_from_slice(&0xFFFFFFFF_u32.to_le_bytes());
        offset += len;

        let len = 36;
        buf[offset..offset + len].copy_from_slice(&[PAD_METADATA_BYTE; 36]);
        offset += len;

        // Final sanity check
        assert_eq!(offset, self.header_len());

        Ok(offset)
    }

    fn update_set_ptr(&self, buf: &mut [u8], ptr: u32) -> Result<()> {
        if buf.len() < (METADATA_SET_PTR_OFFSET + 4) {
            return Err(Error::BufferTooSmall {
                location: "update_set_ptr",
                expected: METADATA_SET_PTR_OFFSET + 4,
                actual: buf.len(),
            });
        }

        buf[METADATA_SET_PTR_OFFSET..METADATA_SET_PTR_OFFSET + 4]
            .copy_from_slice(&ptr.to_le_bytes());
        Ok(())
    }

    /// Returns the total size needed for all ROM tables
    pub fn rom_images_size(&self) -> usize {
        self.rom_sets
            .iter()
            .map(|set| set.image_size(&self.board))
            .sum()
    }

    /// Writes all ROM tables to the buffer, packed in set order.
    pub fn write_roms(&self, buf: &mut [u8]) -> Result<()> {
        // Validate buffer size
        if buf.len() < self.rom_images_size() {
            return Err(Error::BufferTooSmall {
                location: "write_roms",
                expected: self.rom_images_size(),
                actual: buf.len(),
            });
        }

        let mut offset = 0;
        for set in &self.rom_sets {
            let table = set.build_table(&self.board)?;
            buf[offset..offset + table.len()].copy_from_slice(&table);
            offset += table.len();
        }

        Ok(())
    }
}
