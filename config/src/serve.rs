// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Serve-mode selection: serving algorithms, chip select mask derivation and
//! the runtime self-repair rules.
//!
//! The serve loop itself depends on exactly two derived words - a check mask
//! and an invert mask.  XORing the raw input register with the invert mask
//! normalizes any active-high lines, after which "active" is a single test:
//! all relevant lines low (single chip), or any relevant line low (multi-ROM
//! sets).  Deriving the masks here, once, at startup, is what keeps the hot
//! loop free of per-access configuration branches.

use serde::{Deserialize, Serialize};

use crate::chip::{CsLogic, RomType};
use crate::hw::{Board, NO_PIN};

/// The serving algorithms.
///
/// All three implement the same two-state machine (idle with data pins
/// high-impedance, serving with data pins driven); they differ in how often
/// the chip select test runs relative to the table lookup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeAlg {
    /// Resolves to [`ServeAlg::TwoCsOneAddr`]
    #[default]
    Default,

    /// Tests CS roughly twice per table lookup.  The default for single
    /// chips, where tCO is tight relative to tACC.
    TwoCsOneAddr,

    /// Tests CS once, then serves; re-tests without re-fetching the address
    /// when nothing changed.  Alternative single-chip algorithm.
    AddrOnCs,

    /// Like [`ServeAlg::AddrOnCs`] but "active" means any line of the check
    /// mask is active.  Used exclusively for multi-ROM sets.
    AddrOnAnyCs,
}

impl ServeAlg {
    /// Collapses [`ServeAlg::Default`] to the concrete algorithm.
    pub const fn resolve(self) -> ServeAlg {
        match self {
            ServeAlg::Default => ServeAlg::TwoCsOneAddr,
            other => other,
        }
    }

    pub const fn metadata_value(&self) -> u8 {
        match self {
            ServeAlg::Default => 0,
            ServeAlg::TwoCsOneAddr => 1,
            ServeAlg::AddrOnCs => 2,
            ServeAlg::AddrOnAnyCs => 3,
        }
    }

    pub const fn from_metadata_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(ServeAlg::Default),
            1 => Some(ServeAlg::TwoCsOneAddr),
            2 => Some(ServeAlg::AddrOnCs),
            3 => Some(ServeAlg::AddrOnAnyCs),
            _ => None,
        }
    }
}

/// Why [`repair_serve_alg`] changed the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeAlgRepair {
    /// Multi-ROM set was not using the any-CS algorithm
    ForcedAnyCs,

    /// Single-ROM set was using the any-CS algorithm
    ResetToDefault,
}

/// The algorithm is produced by an external build-time generator and treated
/// as untrusted: a multi-ROM set must use the any-CS algorithm and a single
/// ROM must not.  Returns the corrected algorithm and what was repaired, if
/// anything - the caller logs, never aborts.
pub fn repair_serve_alg(alg: ServeAlg, rom_count: u8) -> (ServeAlg, Option<ServeAlgRepair>) {
    let alg = alg.resolve();
    if rom_count > 1 && alg != ServeAlg::AddrOnAnyCs {
        (ServeAlg::AddrOnAnyCs, Some(ServeAlgRepair::ForcedAnyCs))
    } else if rom_count <= 1 && alg == ServeAlg::AddrOnAnyCs {
        (ServeAlg::TwoCsOneAddr, Some(ServeAlgRepair::ResetToDefault))
    } else {
        (alg, None)
    }
}

/// The two words the hot loop runs on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CsMasks {
    /// Bit set for every chip select line relevant to the selected mode
    pub check: u32,

    /// Bit set for every such line configured active-high
    pub invert: u32,
}

impl CsMasks {
    /// "All lines active" test, as the single-chip serve loops perform it.
    pub const fn all_active(&self, raw: u32) -> bool {
        (raw ^ self.invert) & self.check == 0
    }

    /// "Any line active" test, as the multi-ROM serve loop performs it
    /// (bit-clear-and-compare rather than XOR-and-test).
    pub const fn any_active(&self, raw: u32) -> bool {
        self.check & !(raw ^ self.invert) != 0
    }
}

/// Derives the masks for a single-chip set.
///
/// Lines configured [`CsLogic::Ignore`] stay in the check mask with
/// active-high polarity: the host board ties an unused select line to +5V
/// (a C64 character ROM's CS2, say), so it reads high constantly and always
/// tests active.  A line left low instead means a miswired socket, and the
/// chip correctly refuses to serve.
pub fn derive_masks(
    board: &Board,
    rom_type: RomType,
    cs1: CsLogic,
    cs2: CsLogic,
    cs3: CsLogic,
) -> CsMasks {
    let mut masks = CsMasks::default();

    let mut add = |pin: u8, logic: CsLogic| {
        masks.check |= 1 << pin;
        if logic != CsLogic::ActiveLow {
            masks.invert |= 1 << pin;
        }
    };

    add(board.cs1(rom_type), cs1);
    if let Some(pin) = board.cs2(rom_type) {
        add(pin, cs2);
    }
    if let Some(pin) = board.cs3(rom_type) {
        add(pin, cs3);
    }

    masks
}

/// Derives the masks for a multi-ROM set: CS1 plus one bank line per extra
/// chip, all with the polarity of the shared select line.
///
/// Returns the mask and whether the ROM count was supported; unsupported
/// counts fall back to CS1 only, and the caller logs.
pub fn derive_multi_masks(board: &Board, rom_count: u8, shared: CsLogic) -> (CsMasks, bool) {
    let mut check = 1u32 << board.cs1;
    let supported = match rom_count {
        2 if board.x1 != NO_PIN => {
            check |= 1 << board.x1;
            true
        }
        3 if board.supports_multi_sets() => {
            check |= (1 << board.x1) | (1 << board.x2);
            true
        }
        _ => false,
    };

    let invert = if shared == CsLogic::ActiveHigh { check } else { 0 };

    (CsMasks { check, invert }, supported)
}

/// Maps a select-jumper value onto a set index, with explicit wraparound:
/// selecting N when only M < N sets exist resolves to N mod M.
pub fn select_set(sel_value: u8, set_count: usize) -> usize {
    if set_count == 0 {
        return 0;
    }
    sel_value as usize % set_count
}
