// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Copies the selected ROM table from flash into RAM.
//!
//! RAM loads take 1 cycle against 5-8 wait states for flash at full sysclk,
//! which is the difference between meeting tACC and not.  The destination is
//! a dedicated linker region sized for the largest (multi-ROM) table; single
//! tables only fill the bottom quarter and the serve loop never indexes past
//! them, because the unused high input bits are pulled low.

use core::mem::MaybeUninit;

use crate::sets::RomSet;

const ROM_TABLE_SIZE: usize = 64 * 1024;

#[unsafe(link_section = ".ghostrom_rom_table")]
static mut ROM_TABLE: [MaybeUninit<u8>; ROM_TABLE_SIZE] =
    [MaybeUninit::uninit(); ROM_TABLE_SIZE];

/// Copies the set's table into RAM and returns the RAM address to serve from.
pub fn preload(set: &RomSet) -> *const u8 {
    let dst = (&raw mut ROM_TABLE) as *mut u8;
    unsafe {
        core::ptr::copy_nonoverlapping(set.data.as_ptr(), dst, set.data.len());
    }
    log::info!(
        "Preloaded {} bytes to RAM {:#010X}",
        set.data.len(),
        dst as usize
    );
    dst
}
