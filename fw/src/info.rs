// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Fixed-address firmware and runtime information.
//!
//! Two structures host tooling can find without symbols:
//! - [`FLASH_INFO`] at flash + 0x200, baked in at build time
//! - [`RUNTIME_INFO`] at the very start of RAM, updated as the firmware
//!   boots so a debug probe can see what is being served
//!
//! The runtime structure's initial value lives in flash (the linker gives
//! the section a load address) and is copied into place by
//! [`copy_runtime_info`] from `pre_init`, before statics are initialised.
//!
//! Layout changes here must be mirrored in the ghostrom-fw-parser crate.

use ghostrom_config::hw::Board;

pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(feature = "f401re")]
const MCU: &str = "STM32F401RE";
#[cfg(feature = "f405rg")]
const MCU: &str = "STM32F405RG";
#[cfg(feature = "f411re")]
const MCU: &str = "STM32F411RE";
#[cfg(feature = "f446re")]
const MCU: &str = "STM32F446RE";

/// The board revision this firmware is built for.
pub const BOARD: &Board = &Board::REV_D;

const fn padded<const N: usize>(s: &str) -> [u8; N] {
    let bytes = s.as_bytes();
    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() && i < N {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Build-time firmware description, NUL-padded strings throughout.
#[repr(C)]
pub struct FlashInfo {
    pub magic: [u8; 4],
    pub version: [u8; 12],
    pub mcu: [u8; 12],
    pub board: [u8; 8],
}

#[used]
#[unsafe(link_section = ".ghostrom_flash_info")]
pub static FLASH_INFO: FlashInfo = FlashInfo {
    magic: *b"GRfw",
    version: padded(PKG_VERSION),
    mcu: padded(MCU),
    board: padded(BOARD.name),
};

/// Runtime state, 20 bytes at the start of RAM.
#[repr(C)]
pub struct RuntimeInfo {
    pub magic: [u8; 4],
    pub size: u8,
    pub image_sel: u8,
    pub rom_set_index: u8,
    pub count_rom_access: u8,
    pub access_count: u32,
    pub rom_table_ptr: u32,
    pub rom_table_size: u32,
}

// Offset the serve loop and the host parser both rely on
const _: () = assert!(core::mem::offset_of!(RuntimeInfo, access_count) == 8);

#[used]
#[unsafe(link_section = ".ghostrom_ram_info")]
pub static mut RUNTIME_INFO: RuntimeInfo = RuntimeInfo {
    magic: *b"grom",
    size: size_of::<RuntimeInfo>() as u8,
    image_sel: 0,
    rom_set_index: 0,
    count_rom_access: cfg!(feature = "count-access") as u8,
    access_count: 0,
    rom_table_ptr: 0,
    rom_table_size: 0,
};

/// Copies [`RUNTIME_INFO`]'s initial value from its flash load address into
/// RAM.  Must only be called from `pre_init`.
pub unsafe fn copy_runtime_info() {
    unsafe extern "C" {
        static __ghostrom_ram_info_load: u8;
        static mut __ghostrom_ram_info_start: u8;
        static __ghostrom_ram_info_size: u8;
    }

    unsafe {
        // The size symbol's address is its value
        let size = (&raw const __ghostrom_ram_info_size) as usize;
        core::ptr::copy_nonoverlapping(
            &raw const __ghostrom_ram_info_load,
            &raw mut __ghostrom_ram_info_start,
            size,
        );
    }
}

/// Address of the live access counter, for the serve loop to bump.
#[cfg(feature = "count-access")]
pub fn access_count_addr() -> u32 {
    unsafe { (&raw mut RUNTIME_INFO.access_count) as u32 }
}

pub fn record_selection(image_sel: u8, rom_set_index: u8) {
    unsafe {
        RUNTIME_INFO.image_sel = image_sel;
        RUNTIME_INFO.rom_set_index = rom_set_index;
    }
}

pub fn record_table(ptr: *const u8, size: usize) {
    unsafe {
        RUNTIME_INFO.rom_table_ptr = ptr as u32;
        RUNTIME_INFO.rom_table_size = size as u32;
    }
}
