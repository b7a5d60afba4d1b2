// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Static per-board-revision pin model.
//!
//! Each supported PCB revision gets one const [`Board`].  The firmware and
//! the image remapper both consult the same structure, so a board change is
//! a data change, not a code change.
//!
//! Pin numbering is the bit index within the relevant GPIO port register:
//! address and chip select lines all live on one input port (read with a
//! single halfword load), data lines on one output port starting at bit 0
//! (written with a single byte store), and select jumpers plus the status
//! LED on a third port.

use serde::{Deserialize, Serialize};

use crate::chip::RomType;

/// Marker for an absent pin.
pub const NO_PIN: u8 = 0xFF;

/// Maximum number of address lines the input port can carry.
pub const MAX_ADDR_LINES: usize = 16;

/// Number of image select jumpers.
pub const SEL_JUMPERS: usize = 4;

/// Idle state of a jumper input, set by the configured pull resistor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumperPull {
    /// Pulled low; fitting the jumper reads 1
    Down,

    /// Pulled high; fitting the jumper reads 0
    Up,
}

/// Problems [`Board::validate`] can report.
///
/// These are complaints, not errors: the caller logs them and carries on
/// serving with whatever the board description says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardIssue {
    /// An address line bit is out of range for the input port
    AddrPinOutOfRange { line: usize, pin: u8 },

    /// A data line bit would not fit in a single byte store
    DataPinOutOfRange { line: usize, pin: u8 },

    /// Two logical lines share a physical bit
    DuplicatePin { pin: u8 },

    /// X1/X2 assigned but colliding with an address or CS line
    BankPinConflict { pin: u8 },

    /// The chip select line sits outside the input port
    CsPinOutOfRange { pin: u8 },
}

/// A physical board revision.
///
/// Serializes for host tooling output; boards are only ever constructed as
/// consts in this crate, so there is no deserialize path.
#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub name: &'static str,

    /// Logical address bit -> input port bit.  `NO_PIN` for absent lines.
    pub addr: [u8; MAX_ADDR_LINES],

    /// Logical data bit -> output port bit.  All entries must be < 8.
    pub data: [u8; 8],

    /// CS1, shared by all ROM types
    pub cs1: u8,

    /// CS2 as wired for a 2316
    pub cs2_2316: u8,

    /// CS3 as wired for a 2316
    pub cs3_2316: u8,

    /// CS2 as wired for a 2332.  Shares the 2316 CS3 pin on every revision
    /// so far, but kept separate in the model.
    pub cs2_2332: u8,

    /// Bank select lines for multi-ROM sets, `NO_PIN` if not wired
    pub x1: u8,
    pub x2: u8,

    /// Idle state of X1/X2
    pub x_pull: JumperPull,

    /// Image select jumpers, port bit per jumper, LSB first
    pub sel: [u8; SEL_JUMPERS],

    /// Idle state of the select jumpers
    pub sel_pull: JumperPull,

    /// Status LED port bit, `NO_PIN` if not fitted.  Driven low to light.
    pub status: u8,

    /// Number of input port bits a single-ROM table index spans
    pub single_index_bits: u8,
}

impl Board {
    /// Standard 24-pin STM32F4 board.
    pub const REV_D: Board = Board {
        name: "rev-d",
        addr: [
            5, 4, 6, 7, 3, 2, 1, 0, 8, 13, 11, 12, 9, NO_PIN, NO_PIN, NO_PIN,
        ],
        data: [0, 1, 2, 7, 6, 5, 4, 3],
        cs1: 10,
        cs2_2316: 12,
        cs3_2316: 9,
        cs2_2332: 9,
        x1: 14,
        x2: 15,
        x_pull: JumperPull::Down,
        sel: [0, 1, 2, 7],
        sel_pull: JumperPull::Down,
        status: 15,
        single_index_bits: 14,
    };

    /// Earlier revision with a damaged route on input bit 13: A9 was moved
    /// out to bit 14, leaving bit 13 floating mid-range.  No bank lines.
    pub const REV_C: Board = Board {
        name: "rev-c",
        addr: [
            5, 4, 6, 7, 3, 2, 1, 0, 8, 14, 11, 12, 9, NO_PIN, NO_PIN, NO_PIN,
        ],
        data: [0, 1, 2, 7, 6, 5, 4, 3],
        cs1: 10,
        cs2_2316: 12,
        cs3_2316: 9,
        cs2_2332: 9,
        x1: NO_PIN,
        x2: NO_PIN,
        x_pull: JumperPull::Down,
        sel: [0, 1, 2, 7],
        sel_pull: JumperPull::Down,
        status: 15,
        single_index_bits: 15,
    };

    /// CS1 bit for the given ROM type.  The same pin on all supported types.
    pub const fn cs1(&self, _rom_type: RomType) -> u8 {
        self.cs1
    }

    /// CS2 bit, if the ROM type has one.
    pub const fn cs2(&self, rom_type: RomType) -> Option<u8> {
        match rom_type {
            RomType::Rom2316 => Some(self.cs2_2316),
            RomType::Rom2332 => Some(self.cs2_2332),
            RomType::Rom2364 => None,
        }
    }

    /// CS3 bit, if the ROM type has one.
    pub const fn cs3(&self, rom_type: RomType) -> Option<u8> {
        match rom_type {
            RomType::Rom2316 => Some(self.cs3_2316),
            RomType::Rom2332 | RomType::Rom2364 => None,
        }
    }

    /// CS bit that selects chip `index` of a multi-ROM set.  Chip 0 sits on
    /// CS1; further chips on the bank lines.
    pub fn cs_for_chip_in_set(&self, index: usize) -> Option<u8> {
        match index {
            0 => Some(self.cs1),
            1 => (self.x1 != NO_PIN).then_some(self.x1),
            2 => (self.x2 != NO_PIN).then_some(self.x2),
            _ => None,
        }
    }

    pub const fn supports_multi_sets(&self) -> bool {
        self.x1 != NO_PIN && self.x2 != NO_PIN
    }

    /// Input port bit -> logical address bit, the inverse of `addr`.
    pub fn pin_to_addr_map(&self) -> [Option<usize>; MAX_ADDR_LINES] {
        let mut map = [None; MAX_ADDR_LINES];
        for (addr_bit, &pin) in self.addr.iter().enumerate() {
            if (pin as usize) < MAX_ADDR_LINES {
                map[pin as usize] = Some(addr_bit);
            }
        }
        map
    }

    /// Size in bytes of the remapped table for a single-ROM set.
    pub const fn single_table_size(&self) -> usize {
        1 << self.single_index_bits
    }

    /// Size in bytes of the remapped table for a banked or multi-ROM set.
    /// Covers the full input port, including the bank lines.
    pub const fn banked_table_size(&self) -> usize {
        1 << MAX_ADDR_LINES
    }

    /// Decodes the raw select-jumper port value into a selector integer,
    /// LSB-first across `sel`, accounting for the jumper pull.
    pub fn sel_value(&self, raw_port: u32) -> u8 {
        let mut value = 0;
        for (i, &pin) in self.sel.iter().enumerate() {
            if pin == NO_PIN {
                continue;
            }
            let high = raw_port & (1 << pin) != 0;
            let fitted = match self.sel_pull {
                JumperPull::Down => high,
                JumperPull::Up => !high,
            };
            if fitted {
                value |= 1 << i;
            }
        }
        value
    }

    /// Best-effort consistency check.  Every problem found is handed to
    /// `complain`; the board is still usable afterwards, mis-serving being
    /// preferable to not serving at all.
    pub fn validate(&self, mut complain: impl FnMut(BoardIssue)) {
        let mut seen = [false; 32];
        let mut claim = |pin: u8, complain: &mut dyn FnMut(BoardIssue)| {
            if (pin as usize) < seen.len() {
                if seen[pin as usize] {
                    complain(BoardIssue::DuplicatePin { pin });
                }
                seen[pin as usize] = true;
            }
        };

        for (line, &pin) in self.addr.iter().enumerate() {
            if pin == NO_PIN {
                continue;
            }
            if pin as usize >= MAX_ADDR_LINES {
                complain(BoardIssue::AddrPinOutOfRange { line, pin });
            }
            claim(pin, &mut complain);
        }

        for (line, &pin) in self.data.iter().enumerate() {
            if pin >= 8 {
                complain(BoardIssue::DataPinOutOfRange { line, pin });
            }
        }

        // CS pins deliberately share input bits with the high address lines
        // of larger chips (a 2316's CS2 sits where a 2364 has A11), so they
        // are range checked but not claimed.
        for cs in [self.cs1, self.cs2_2316, self.cs3_2316, self.cs2_2332] {
            if cs as usize >= MAX_ADDR_LINES {
                complain(BoardIssue::CsPinOutOfRange { pin: cs });
            }
        }

        for x in [self.x1, self.x2] {
            if x == NO_PIN {
                continue;
            }
            if x as usize >= MAX_ADDR_LINES {
                complain(BoardIssue::BankPinConflict { pin: x });
            } else if seen[x as usize] {
                complain(BoardIssue::BankPinConflict { pin: x });
            } else {
                seen[x as usize] = true;
            }
        }
    }
}
