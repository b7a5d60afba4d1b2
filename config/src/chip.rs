// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM chip types and chip select line configuration.

use serde::{Deserialize, Serialize};

/// The ROM types Ghost ROM can emulate.
///
/// All are 24-pin parallel mask ROMs.  They differ in capacity and in how
/// many of the high-order socket pins are chip select lines rather than
/// address lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomType {
    /// 2KB, three chip select lines
    Rom2316,

    /// 4KB, two chip select lines
    Rom2332,

    /// 8KB, one chip select line
    Rom2364,
}

impl RomType {
    /// Size of the logical image in bytes.
    pub const fn size_bytes(&self) -> usize {
        match self {
            RomType::Rom2316 => 2048,
            RomType::Rom2332 => 4096,
            RomType::Rom2364 => 8192,
        }
    }

    /// Number of address lines on the chip.
    pub const fn num_addr_lines(&self) -> usize {
        match self {
            RomType::Rom2316 => 11,
            RomType::Rom2332 => 12,
            RomType::Rom2364 => 13,
        }
    }

    /// Number of chip select lines on the chip.
    pub const fn cs_line_count(&self) -> usize {
        match self {
            RomType::Rom2316 => 3,
            RomType::Rom2332 => 2,
            RomType::Rom2364 => 1,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            RomType::Rom2316 => "2316",
            RomType::Rom2332 => "2332",
            RomType::Rom2364 => "2364",
        }
    }

    /// Value used to encode this ROM type in metadata.
    pub const fn metadata_value(&self) -> u8 {
        match self {
            RomType::Rom2316 => 0,
            RomType::Rom2332 => 1,
            RomType::Rom2364 => 2,
        }
    }

    /// Decodes a metadata value.  Returns `None` for unrecognized values -
    /// callers choose a default (2364) and log, rather than abort.
    pub const fn from_metadata_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(RomType::Rom2316),
            1 => Some(RomType::Rom2332),
            2 => Some(RomType::Rom2364),
            _ => None,
        }
    }
}

/// Configured behaviour of a single chip select line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsLogic {
    /// Line selects the chip when low
    ActiveLow,

    /// Line selects the chip when high
    ActiveHigh,

    /// Line is permanently tied active on the host board and plays no part
    /// in selection
    Ignore,
}

impl CsLogic {
    pub const fn metadata_value(&self) -> u8 {
        match self {
            CsLogic::ActiveLow => 0,
            CsLogic::ActiveHigh => 1,
            CsLogic::Ignore => 2,
        }
    }

    pub const fn from_metadata_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(CsLogic::ActiveLow),
            1 => Some(CsLogic::ActiveHigh),
            2 => Some(CsLogic::Ignore),
            _ => None,
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "0" | "low" => Some(CsLogic::ActiveLow),
            "1" | "high" => Some(CsLogic::ActiveHigh),
            "ignore" => Some(CsLogic::Ignore),
            _ => None,
        }
    }
}
