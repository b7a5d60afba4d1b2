// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Generates firmware artifacts for Ghost ROM.
//!
//! Takes logical ROM images, remaps them through a board's pin model into
//! the raw byte tables the firmware serves from, and lays out the flash
//! metadata the firmware reads at boot.

#![no_std]

extern crate alloc;

pub mod image;
pub mod meta;

pub use image::{CsConfig, Rom, RomSet, SetType, SizeHandling};
pub use image::{PAD_BLANK_BYTE, PAD_NO_ROM_BYTE};
pub use meta::{
    DATA_START, FLASH_BASE, MAX_METADATA_LEN, METADATA_START, Metadata, PAD_METADATA_BYTE,
};

use ghostrom_config::chip::CsLogic;
use ghostrom_config::serve::ServeAlg;

/// Version of metadata produced by this version of the crate
pub const METADATA_VERSION: u32 = 1;

/// Firmware size reserved at the start of flash, before metadata
pub const FIRMWARE_SIZE: usize = 48 * 1024; // 48KB

/// Error type
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub enum Error {
    RightSize {
        size: usize,
    },
    ImageTooSmall {
        index: usize,
        expected: usize,
        actual: usize,
    },
    ImageTooLarge {
        image_size: usize,
        expected_size: usize,
    },
    DuplicationNotExactDivisor {
        image_size: usize,
        expected_size: usize,
    },
    BufferTooSmall {
        location: &'static str,
        expected: usize,
        actual: usize,
    },
    NoRoms,
    TooManyRoms {
        expected: usize,
        actual: usize,
    },
    TooFewRoms {
        expected: usize,
        actual: usize,
    },
    InvalidServeAlg {
        serve_alg: ServeAlg,
    },
    InconsistentCsLogic {
        first: CsLogic,
        other: CsLogic,
    },
    MultiSetNotSupported {
        board: &'static str,
    },
    MissingPointer {
        id: usize,
    },
}
type Result<T> = core::result::Result<T, Error>;

pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
