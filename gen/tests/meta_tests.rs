// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Tests for flash metadata layout.
//!
//! # Test Plan
//!
//! ## Phase 1: Header
//! - [x] Magic, version, set count
//! - [x] Set array pointer patched to a sane in-metadata address
//!
//! ## Phase 2: Pointer Chain
//! - [x] Header → set record → ROM pointer array → ROM record
//! - [x] ROM record fields (type, CS states)
//! - [x] Filename pointer resolves to the null-terminated name
//! - [x] Filename pointer sentinel when filenames are omitted
//!
//! ## Phase 3: Table Data Layout
//! - [x] Set records carry absolute table pointers, packed from flash
//!   base + 64KB
//! - [x] Returned data offsets match
//! - [x] write_roms fills the combined buffer set by set

use ghostrom_config::chip::{CsLogic, RomType};
use ghostrom_config::hw::Board;
use ghostrom_config::serve::ServeAlg;
use ghostrom_gen::{
    CsConfig, DATA_START, FLASH_BASE, METADATA_START, Metadata, Rom, RomSet, SetType,
    SizeHandling,
};

const ABS_METADATA_START: u32 = FLASH_BASE + METADATA_START;
const ABS_DATA_START: u32 = FLASH_BASE + DATA_START;

fn rd_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

// Converts an absolute metadata pointer back to a buffer offset
fn meta_offset(ptr: u32, buf: &[u8]) -> usize {
    let offset = ptr.checked_sub(ABS_METADATA_START).unwrap() as usize;
    assert!(offset < buf.len(), "pointer {ptr:#010x} outside metadata");
    offset
}

fn rom(index: usize, name: &str, rom_type: RomType) -> Rom {
    let cs2 = (rom_type != RomType::Rom2364).then_some(CsLogic::ActiveHigh);
    let cs3 = (rom_type == RomType::Rom2316).then_some(CsLogic::Ignore);
    Rom::from_raw_image(
        index,
        name.into(),
        &vec![0x42; rom_type.size_bytes()],
        rom_type,
        CsConfig::new(CsLogic::ActiveLow, cs2, cs3),
        &SizeHandling::None,
    )
    .unwrap()
}

fn two_set_metadata(filenames: bool) -> Metadata {
    let set0 = RomSet::new(
        0,
        SetType::Single,
        ServeAlg::Default,
        vec![rom(0, "kernal.bin", RomType::Rom2364)],
    )
    .unwrap();
    let set1 = RomSet::new(
        1,
        SetType::Single,
        ServeAlg::AddrOnCs,
        vec![rom(1, "chargen.bin", RomType::Rom2332)],
    )
    .unwrap();
    Metadata::new(Board::REV_D.clone(), vec![set0, set1], filenames)
}

#[test]
fn test_header_layout() {
    let meta = two_set_metadata(true);
    let mut buf = vec![0u8; meta.metadata_len()];
    let mut data_ptrs = vec![0u32; meta.total_set_count()];
    let written = meta.write_all(&mut buf, &mut data_ptrs).unwrap();
    assert_eq!(written, buf.len());

    assert_eq!(&buf[0..16], b"GHOSTROM_META\0\0\0");
    assert_eq!(rd_u32(&buf, 16), 1); // version
    assert_eq!(buf[20], 2); // set count
    assert_eq!(&buf[21..24], &[0, 0, 0]);

    // Set array pointer patched and in range
    let set_ptr = rd_u32(&buf, 24);
    assert_ne!(set_ptr, 0xFFFF_FFFF);
    meta_offset(set_ptr, &buf);

    // Reserved tail of the header
    assert!(buf[28..64].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_pointer_chain() {
    let meta = two_set_metadata(true);
    let mut buf = vec![0u8; meta.metadata_len()];
    let mut data_ptrs = vec![0u32; 2];
    meta.write_all(&mut buf, &mut data_ptrs).unwrap();

    let sets = meta_offset(rd_u32(&buf, 24), &buf);

    // First set record: 16KB single 2364 table at the start of data
    assert_eq!(rd_u32(&buf, sets), ABS_DATA_START);
    assert_eq!(rd_u32(&buf, sets + 4), 16384);
    assert_eq!(buf[sets + 12], 1); // rom count
    assert_eq!(buf[sets + 13], ServeAlg::Default.metadata_value());
    assert_eq!(buf[sets + 14], CsLogic::Ignore.metadata_value()); // no multi CS
    assert_eq!(buf[sets + 15], 0xFF);

    // Second record follows immediately, table packed after the first
    let set1 = sets + 16;
    assert_eq!(rd_u32(&buf, set1), ABS_DATA_START + 16384);
    assert_eq!(rd_u32(&buf, set1 + 4), 16384);
    assert_eq!(buf[set1 + 13], ServeAlg::AddrOnCs.metadata_value());

    // Follow set 0's ROM pointer array to its single ROM record
    let rom_array = meta_offset(rd_u32(&buf, sets + 8), &buf);
    let rom0 = meta_offset(rd_u32(&buf, rom_array), &buf);
    assert_eq!(buf[rom0], RomType::Rom2364.metadata_value());
    assert_eq!(buf[rom0 + 1], CsLogic::ActiveLow.metadata_value());
    assert_eq!(buf[rom0 + 2], 2); // absent CS2 encodes as Ignore
    assert_eq!(buf[rom0 + 3], 2);

    // Filename pointer resolves to the null-terminated name
    let name = meta_offset(rd_u32(&buf, rom0 + 4), &buf);
    assert_eq!(&buf[name..name + 11], b"kernal.bin\0");

    // Set 1's ROM is a 2332 with a real CS2
    let rom_array = meta_offset(rd_u32(&buf, set1 + 8), &buf);
    let rom1 = meta_offset(rd_u32(&buf, rom_array), &buf);
    assert_eq!(buf[rom1], RomType::Rom2332.metadata_value());
    assert_eq!(buf[rom1 + 2], CsLogic::ActiveHigh.metadata_value());
    let name = meta_offset(rd_u32(&buf, rom1 + 4), &buf);
    assert_eq!(&buf[name..name + 12], b"chargen.bin\0");
}

#[test]
fn test_filenames_omitted() {
    let meta = two_set_metadata(false);
    let mut buf = vec![0u8; meta.metadata_len()];
    let mut data_ptrs = vec![0u32; 2];
    meta.write_all(&mut buf, &mut data_ptrs).unwrap();

    let sets = meta_offset(rd_u32(&buf, 24), &buf);
    let rom_array = meta_offset(rd_u32(&buf, sets + 8), &buf);
    let rom0 = meta_offset(rd_u32(&buf, rom_array), &buf);

    // ROM record keeps its 8-byte shape, with the sentinel pointer
    assert_eq!(rd_u32(&buf, rom0 + 4), 0xFFFF_FFFF);
}

#[test]
fn test_multi_set_record() {
    let image = vec![0x42u8; 8192];
    let mk = |index: usize| {
        Rom::from_raw_image(
            index,
            format!("rom{index}.bin"),
            &image,
            RomType::Rom2364,
            CsConfig::new(CsLogic::ActiveLow, None, None),
            &SizeHandling::None,
        )
        .unwrap()
    };
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, vec![mk(0), mk(1)]).unwrap();
    let meta = Metadata::new(Board::REV_D.clone(), vec![set], true);

    let mut buf = vec![0u8; meta.metadata_len()];
    let mut data_ptrs = vec![0u32; 1];
    meta.write_all(&mut buf, &mut data_ptrs).unwrap();

    let sets = meta_offset(rd_u32(&buf, 24), &buf);
    assert_eq!(rd_u32(&buf, sets + 4), 65536); // full-port table
    assert_eq!(buf[sets + 12], 2);
    assert_eq!(buf[sets + 13], ServeAlg::AddrOnAnyCs.metadata_value());
    assert_eq!(buf[sets + 14], CsLogic::ActiveLow.metadata_value());
}

#[test]
fn test_table_data_offsets_and_write_roms() {
    let meta = two_set_metadata(true);
    let mut buf = vec![0u8; meta.metadata_len()];
    let mut data_ptrs = vec![0u32; 2];
    meta.write_all(&mut buf, &mut data_ptrs).unwrap();

    assert_eq!(data_ptrs, vec![0, 16384]);
    assert_eq!(meta.rom_images_size(), 32768);

    let mut tables = vec![0u8; meta.rom_images_size()];
    meta.write_roms(&mut tables).unwrap();

    // Both images are solid 0x42; every table byte is its mangled form.
    // 0x42 has bits 1 and 6 set; bit 6 maps to output bit 4.
    assert!(tables.iter().all(|&b| b == 0x12));
}
