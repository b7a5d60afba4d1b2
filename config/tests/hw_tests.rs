// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Tests for the board pin model.

use ghostrom_config::chip::RomType;
use ghostrom_config::hw::{Board, BoardIssue, JumperPull, NO_PIN};

fn issues(board: &Board) -> Vec<BoardIssue> {
    let mut found = Vec::new();
    board.validate(|issue| found.push(issue));
    found
}

#[test]
fn test_shipping_boards_validate_clean() {
    assert!(issues(&Board::REV_D).is_empty(), "{:?}", issues(&Board::REV_D));
    assert!(issues(&Board::REV_C).is_empty(), "{:?}", issues(&Board::REV_C));
}

#[test]
fn test_validate_reports_duplicate_addr_pin() {
    let mut board = Board::REV_D.clone();
    board.addr[1] = board.addr[0];
    assert!(
        issues(&board)
            .iter()
            .any(|i| matches!(i, BoardIssue::DuplicatePin { .. }))
    );
}

#[test]
fn test_validate_reports_data_pin_out_of_range() {
    let mut board = Board::REV_D.clone();
    board.data[3] = 9;
    assert!(
        issues(&board)
            .iter()
            .any(|i| matches!(i, BoardIssue::DataPinOutOfRange { line: 3, pin: 9 }))
    );
}

#[test]
fn test_validate_reports_bank_pin_conflict() {
    let mut board = Board::REV_D.clone();
    board.x1 = board.addr[0];
    assert!(
        issues(&board)
            .iter()
            .any(|i| matches!(i, BoardIssue::BankPinConflict { .. }))
    );
}

#[test]
fn test_pin_to_addr_map_inverts_addr_table() {
    let board = &Board::REV_D;
    let map = board.pin_to_addr_map();

    for (addr_bit, &pin) in board.addr.iter().enumerate() {
        if pin == NO_PIN {
            continue;
        }
        assert_eq!(map[pin as usize], Some(addr_bit));
    }

    // CS1 and the bank lines carry no address bit
    assert_eq!(map[board.cs1 as usize], None);
    assert_eq!(map[board.x1 as usize], None);
    assert_eq!(map[board.x2 as usize], None);
}

#[test]
fn test_cs_pins_per_rom_type() {
    let board = &Board::REV_D;

    assert_eq!(board.cs1(RomType::Rom2364), 10);
    assert_eq!(board.cs2(RomType::Rom2364), None);
    assert_eq!(board.cs3(RomType::Rom2364), None);

    assert_eq!(board.cs2(RomType::Rom2332), Some(9));
    assert_eq!(board.cs3(RomType::Rom2332), None);

    assert_eq!(board.cs2(RomType::Rom2316), Some(12));
    assert_eq!(board.cs3(RomType::Rom2316), Some(9));
}

#[test]
fn test_table_sizes() {
    assert_eq!(Board::REV_D.single_table_size(), 16384);
    assert_eq!(Board::REV_D.banked_table_size(), 65536);

    // Rev C's moved A9 pushes the single-chip index out a bit
    assert_eq!(Board::REV_C.single_table_size(), 32768);
}

#[test]
fn test_multi_set_support() {
    assert!(Board::REV_D.supports_multi_sets());
    assert!(!Board::REV_C.supports_multi_sets());

    assert_eq!(Board::REV_D.cs_for_chip_in_set(0), Some(10));
    assert_eq!(Board::REV_D.cs_for_chip_in_set(1), Some(14));
    assert_eq!(Board::REV_D.cs_for_chip_in_set(2), Some(15));
    assert_eq!(Board::REV_D.cs_for_chip_in_set(3), None);
    assert_eq!(Board::REV_C.cs_for_chip_in_set(1), None);
}

#[test]
fn test_sel_value_decode() {
    let board = &Board::REV_D;

    // Jumpers on port bits 0, 1, 2, 7, pulled down: fitted reads high
    assert_eq!(board.sel_value(0x00), 0);
    assert_eq!(board.sel_value(0x01), 1);
    assert_eq!(board.sel_value(0x07), 7);
    assert_eq!(board.sel_value(0x80), 8);
    assert_eq!(board.sel_value(0x87), 15);

    // Bits outside the jumper set are ignored
    assert_eq!(board.sel_value(0x78), 0);

    // Pull-up inverts the reading
    let mut board = board.clone();
    board.sel_pull = JumperPull::Up;
    assert_eq!(board.sel_value(0x87), 0);
    assert_eq!(board.sel_value(0x00), 15);
}

#[test]
fn test_board_serializes_for_tooling() {
    let json: serde_json::Value = serde_json::to_value(&Board::REV_D).unwrap();
    assert_eq!(json["name"], "rev-d");
    assert_eq!(json["cs1"], 10);
    assert_eq!(json["x_pull"], "down");
    assert_eq!(json["addr"][0], 5);
    assert_eq!(json["single_index_bits"], 14);
}
