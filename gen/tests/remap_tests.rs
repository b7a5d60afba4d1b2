// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Tests for ROM image remapping and serve table generation.
//!
//! # Test Plan
//!
//! ## Phase 1: Address/Data Remapping
//! - [x] Full table sweep against an independent pin model, per ROM type
//! - [x] Chip select bits are don't-cares for single ROM tables
//! - [x] Unrouted input bit duplicates the image (rev C)
//! - [x] First byte of the image lands at table index 0
//!
//! ## Phase 2: Size Handling
//! - [x] Exact size match (no size_handling needed)
//! - [x] Duplicate (smaller file, exact divisor)
//! - [x] Pad (smaller file)
//! - [x] Truncate (larger file)
//! - [x] Error cases (too large, too small, wrong divisor, unnecessary
//!   size_handling)
//!
//! ## Phase 3: Set Validation
//! - [x] Empty set, too many/too few ROMs for the set type
//! - [x] Serve algorithm correction and rejection
//! - [x] Multi-ROM CS consistency rules
//! - [x] Multi sets rejected on boards without bank lines
//!
//! ## Phase 4: Multi-ROM Tables
//! - [x] Each select line serves its own ROM's bytes
//! - [x] Contended and idle regions serve the blank value

use ghostrom_config::chip::{CsLogic, RomType};
use ghostrom_config::hw::Board;
use ghostrom_config::serve::ServeAlg;
use ghostrom_gen::{CsConfig, Error, PAD_NO_ROM_BYTE, Rom, RomSet, SetType, SizeHandling};

// Independent model of the data bit rearrangement, straight from the board's
// data pin table.
fn mangle_data(byte: u8, board: &Board) -> u8 {
    let mut result = 0;
    for bit in 0..8 {
        if byte & (1 << bit) != 0 {
            result |= 1 << board.data[bit];
        }
    }
    result
}

// Independent model of the address permutation: recover the logical address
// a raw input port value selects.
fn logical_of(board: &Board, phys: usize, num_addr_lines: usize) -> usize {
    let mut logical = 0;
    for (bit, &pin) in board.addr.iter().enumerate().take(num_addr_lines) {
        if phys & (1 << pin) != 0 {
            logical |= 1 << bit;
        }
    }
    logical
}

// Distinctive image content so every logical address has a recognizable byte
fn test_image(size: usize) -> Vec<u8> {
    (0..size).map(|a| (a.wrapping_mul(31) ^ (a >> 8)) as u8).collect()
}

fn single_set(board_image: Vec<u8>, rom_type: RomType, cs_config: CsConfig) -> RomSet {
    let rom = Rom::from_raw_image(
        0,
        "test.bin".into(),
        &board_image,
        rom_type,
        cs_config,
        &SizeHandling::None,
    )
    .unwrap();
    RomSet::new(0, SetType::Single, ServeAlg::Default, vec![rom]).unwrap()
}

fn all_low(rom_type: RomType) -> CsConfig {
    match rom_type {
        RomType::Rom2364 => CsConfig::new(CsLogic::ActiveLow, None, None),
        RomType::Rom2332 => CsConfig::new(CsLogic::ActiveLow, Some(CsLogic::ActiveLow), None),
        RomType::Rom2316 => CsConfig::new(
            CsLogic::ActiveLow,
            Some(CsLogic::ActiveLow),
            Some(CsLogic::ActiveLow),
        ),
    }
}

#[test]
fn test_single_table_sweep_all_rom_types() {
    let board = &Board::REV_D;

    for rom_type in [RomType::Rom2316, RomType::Rom2332, RomType::Rom2364] {
        let image = test_image(rom_type.size_bytes());
        let set = single_set(image.clone(), rom_type, all_low(rom_type));
        let table = set.build_table(board).unwrap();

        assert_eq!(table.len(), board.single_table_size());
        for (phys, &byte) in table.iter().enumerate() {
            let logical = logical_of(board, phys, rom_type.num_addr_lines());
            assert_eq!(
                byte,
                mangle_data(image[logical], board),
                "{} phys {phys:#x}",
                rom_type.name()
            );
        }
    }
}

// Input port bits carrying no address line for the ROM type (the CS pins
// among them) must not affect the served byte.
#[test]
fn test_non_address_bits_are_dont_cares() {
    let board = &Board::REV_D;
    let rom_type = RomType::Rom2316;
    let image = test_image(rom_type.size_bytes());
    let set = single_set(image, rom_type, all_low(rom_type));
    let table = set.build_table(board).unwrap();

    // Pins 9, 10 and 12 carry CS lines, not 2316 address bits
    let dont_care_pins = [9u8, 10, 12];
    for phys in 0..table.len() {
        for pin in dont_care_pins {
            let flipped = phys ^ (1 << pin);
            assert_eq!(table[phys], table[flipped], "phys {phys:#x} pin {pin}");
        }
    }
}

#[test]
fn test_rev_c_floating_bit_duplicates_image() {
    let board = &Board::REV_C;
    let rom_type = RomType::Rom2364;
    let image = test_image(rom_type.size_bytes());
    let set = single_set(image.clone(), rom_type, all_low(rom_type));
    let table = set.build_table(board).unwrap();

    assert_eq!(table.len(), 32768);

    // Bit 13 is unrouted on rev C; both halves must serve identically
    for phys in 0..table.len() {
        assert_eq!(table[phys], table[phys ^ (1 << 13)], "phys {phys:#x}");
    }

    // And the table still follows the independent model, with A9 on bit 14
    for (phys, &byte) in table.iter().enumerate() {
        let logical = logical_of(board, phys, rom_type.num_addr_lines());
        assert_eq!(byte, mangle_data(image[logical], board));
    }
}

// The all-address-lines-low entry is the first byte of the image, however
// the lines are permuted.
#[test]
fn test_image_origin_lands_at_table_origin() {
    let board = &Board::REV_D;
    let mut image = test_image(RomType::Rom2364.size_bytes());
    image[0] = 0x5A;
    let set = single_set(image, RomType::Rom2364, all_low(RomType::Rom2364));
    let table = set.build_table(board).unwrap();

    assert_eq!(table[0], mangle_data(0x5A, board));
}

#[test]
fn test_size_handling_exact() {
    let image = test_image(4096);
    let rom = Rom::from_raw_image(
        0,
        "exact.bin".into(),
        &image,
        RomType::Rom2332,
        all_low(RomType::Rom2332),
        &SizeHandling::None,
    );
    assert!(rom.is_ok());

    // Dup/pad on an exact fit is an error, not a no-op
    for handling in [SizeHandling::Duplicate, SizeHandling::Pad] {
        let rom = Rom::from_raw_image(
            0,
            "exact.bin".into(),
            &image,
            RomType::Rom2332,
            all_low(RomType::Rom2332),
            &handling,
        );
        assert!(matches!(rom, Err(Error::RightSize { size: 4096 })));
    }
}

#[test]
fn test_size_handling_duplicate() {
    let board = &Board::REV_D;
    let image = test_image(2048);
    let rom = Rom::from_raw_image(
        0,
        "small.bin".into(),
        &image,
        RomType::Rom2364,
        all_low(RomType::Rom2364),
        &SizeHandling::Duplicate,
    )
    .unwrap();
    let set = RomSet::new(0, SetType::Single, ServeAlg::Default, vec![rom]).unwrap();
    let table = set.build_table(board).unwrap();

    // The 2KB image repeats 4 times across the 8KB logical space
    for (phys, &byte) in table.iter().enumerate() {
        let logical = logical_of(board, phys, RomType::Rom2364.num_addr_lines());
        assert_eq!(byte, mangle_data(image[logical % 2048], board));
    }
}

#[test]
fn test_size_handling_errors() {
    let cs = all_low(RomType::Rom2364);

    // Too small with no handling
    let rom = Rom::from_raw_image(
        3,
        "small.bin".into(),
        &test_image(4096),
        RomType::Rom2364,
        cs,
        &SizeHandling::None,
    );
    assert!(matches!(
        rom,
        Err(Error::ImageTooSmall {
            index: 3,
            expected: 8192,
            actual: 4096
        })
    ));

    // Duplicate with a non-divisor size
    let rom = Rom::from_raw_image(
        0,
        "odd.bin".into(),
        &test_image(3000),
        RomType::Rom2364,
        cs,
        &SizeHandling::Duplicate,
    );
    assert!(matches!(rom, Err(Error::DuplicationNotExactDivisor { .. })));

    // Too large without truncate
    let rom = Rom::from_raw_image(
        0,
        "big.bin".into(),
        &test_image(16384),
        RomType::Rom2364,
        cs,
        &SizeHandling::None,
    );
    assert!(matches!(rom, Err(Error::ImageTooLarge { .. })));

    // Truncate on a file that's too small is also an error
    let rom = Rom::from_raw_image(
        0,
        "small.bin".into(),
        &test_image(4096),
        RomType::Rom2364,
        cs,
        &SizeHandling::Truncate,
    );
    assert!(matches!(rom, Err(Error::ImageTooLarge { .. })));
}

#[test]
fn test_size_handling_pad_and_truncate() {
    let board = &Board::REV_D;

    let image = test_image(4096);
    let rom = Rom::from_raw_image(
        0,
        "pad.bin".into(),
        &image,
        RomType::Rom2364,
        all_low(RomType::Rom2364),
        &SizeHandling::Pad,
    )
    .unwrap();
    let set = RomSet::new(0, SetType::Single, ServeAlg::Default, vec![rom]).unwrap();
    let table = set.build_table(board).unwrap();

    // Second half of the logical space serves the pad byte
    for (phys, &byte) in table.iter().enumerate() {
        let logical = logical_of(board, phys, RomType::Rom2364.num_addr_lines());
        let expected = if logical < 4096 { image[logical] } else { 0xAA };
        assert_eq!(byte, mangle_data(expected, board));
    }

    // Truncate keeps the front of an oversized file
    let image = test_image(16384);
    let rom = Rom::from_raw_image(
        0,
        "trunc.bin".into(),
        &image,
        RomType::Rom2364,
        all_low(RomType::Rom2364),
        &SizeHandling::Truncate,
    )
    .unwrap();
    let set = RomSet::new(0, SetType::Single, ServeAlg::Default, vec![rom]).unwrap();
    let table = set.build_table(board).unwrap();
    for (phys, &byte) in table.iter().enumerate() {
        let logical = logical_of(board, phys, RomType::Rom2364.num_addr_lines());
        assert_eq!(byte, mangle_data(image[logical], board));
    }
}

fn rom_2364(index: usize, image: &[u8], cs1: CsLogic) -> Rom {
    Rom::from_raw_image(
        index,
        format!("rom{index}.bin"),
        image,
        RomType::Rom2364,
        CsConfig::new(cs1, None, None),
        &SizeHandling::None,
    )
    .unwrap()
}

#[test]
fn test_set_validation() {
    let image = test_image(8192);

    assert!(matches!(
        RomSet::new(0, SetType::Single, ServeAlg::Default, vec![]),
        Err(Error::NoRoms)
    ));

    let roms = vec![
        rom_2364(0, &image, CsLogic::ActiveLow),
        rom_2364(1, &image, CsLogic::ActiveLow),
    ];
    assert!(matches!(
        RomSet::new(0, SetType::Single, ServeAlg::Default, roms),
        Err(Error::TooManyRoms {
            expected: 1,
            actual: 2
        })
    ));

    let roms = vec![rom_2364(0, &image, CsLogic::ActiveLow)];
    assert!(matches!(
        RomSet::new(0, SetType::Multi, ServeAlg::Default, roms),
        Err(Error::TooFewRoms {
            expected: 2,
            actual: 1
        })
    ));

    // The any-CS algorithm is reserved for multi sets
    let roms = vec![rom_2364(0, &image, CsLogic::ActiveLow)];
    assert!(matches!(
        RomSet::new(0, SetType::Single, ServeAlg::AddrOnAnyCs, roms),
        Err(Error::InvalidServeAlg { .. })
    ));

    // A multi set gets it regardless of what was asked for
    let roms = vec![
        rom_2364(0, &image, CsLogic::ActiveLow),
        rom_2364(1, &image, CsLogic::ActiveLow),
    ];
    let set = RomSet::new(0, SetType::Multi, ServeAlg::TwoCsOneAddr, roms).unwrap();
    assert_eq!(set.serve_alg(), ServeAlg::AddrOnAnyCs);
}

#[test]
fn test_multi_cs_consistency() {
    let image = test_image(8192);

    // Mixed CS1 polarity is rejected
    let roms = vec![
        rom_2364(0, &image, CsLogic::ActiveLow),
        rom_2364(1, &image, CsLogic::ActiveHigh),
    ];
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, roms).unwrap();
    assert!(matches!(
        set.multi_cs_logic(),
        Err(Error::InconsistentCsLogic { .. })
    ));

    // A used CS2 in a multi set is rejected
    let image32 = test_image(4096);
    let rom0 = rom_2364(0, &image, CsLogic::ActiveLow);
    let rom1 = Rom::from_raw_image(
        1,
        "rom1.bin".into(),
        &image32,
        RomType::Rom2332,
        CsConfig::new(CsLogic::ActiveLow, Some(CsLogic::ActiveLow), None),
        &SizeHandling::None,
    )
    .unwrap();
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, vec![rom0, rom1]).unwrap();
    assert!(matches!(
        set.multi_cs_logic(),
        Err(Error::InconsistentCsLogic { .. })
    ));

    // Consistent active-low pair passes and reports the shared polarity
    let roms = vec![
        rom_2364(0, &image, CsLogic::ActiveLow),
        rom_2364(1, &image, CsLogic::ActiveLow),
    ];
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, roms).unwrap();
    assert_eq!(set.multi_cs_logic().unwrap(), CsLogic::ActiveLow);
}

#[test]
fn test_multi_set_needs_bank_lines() {
    let image = test_image(8192);
    let roms = vec![
        rom_2364(0, &image, CsLogic::ActiveLow),
        rom_2364(1, &image, CsLogic::ActiveLow),
    ];
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, roms).unwrap();
    assert!(matches!(
        set.build_table(&Board::REV_C),
        Err(Error::MultiSetNotSupported { board: "rev-c" })
    ));
}

#[test]
fn test_multi_table_region_selection() {
    let board = &Board::REV_D;

    let mut image0 = test_image(8192);
    let mut image1 = test_image(8192);
    image0[0x123] = 0x11;
    image1[0x123] = 0x22;

    let roms = vec![
        rom_2364(0, &image0, CsLogic::ActiveLow),
        rom_2364(1, &image1, CsLogic::ActiveLow),
    ];
    let set = RomSet::new(0, SetType::Multi, ServeAlg::Default, roms).unwrap();
    let table = set.build_table(board).unwrap();
    assert_eq!(table.len(), 65536);

    // Address bits for logical 0x123 on the input port
    let mut addr_bits = 0usize;
    for bit in 0..13 {
        if 0x123 & (1 << bit) != 0 {
            addr_bits |= 1 << board.addr[bit];
        }
    }
    let cs1 = 1 << board.cs1;
    let x1 = 1 << board.x1;
    let x2 = 1 << board.x2;

    // Only CS1 low: ROM 0 responds
    assert_eq!(table[addr_bits | x1 | x2], mangle_data(0x11, board));

    // Only X1 low: ROM 1 responds
    assert_eq!(table[addr_bits | cs1 | x2], mangle_data(0x22, board));

    // CS1 and X1 both low: contended, blank value served
    assert_eq!(
        table[addr_bits | x2],
        mangle_data(PAD_NO_ROM_BYTE, board)
    );

    // Nothing low: idle, blank value served
    assert_eq!(
        table[addr_bits | cs1 | x1 | x2],
        mangle_data(PAD_NO_ROM_BYTE, board)
    );
}
