// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! System bootloader entry.
//!
//! Fitting all four select jumpers requests the ST system bootloader, so a
//! board that is soldered into a host machine can still be reflashed over
//! UART.  The bootloader needs the chip in its reset clock state, so entry is
//! two-stage: set a magic word in RAM, reset, and jump from `pre_init` on the
//! way back up - before any clock or peripheral configuration has happened.

const BOOTLOADER_MAGIC: u32 = 0x1234567F;

// Last word of the 256-byte info region at the bottom of RAM.  The linker
// hands out nothing there beyond the runtime info block, so the flag
// survives reset without the preload table, statics or stack landing on it.
const MAGIC_ADDR: u32 = 0x2000_00FC;
const SYSTEM_BOOTLOADER: u32 = 0x1FFF_0000;

const _: () = {
    let info_end = 0x2000_0000 + size_of::<crate::info::RuntimeInfo>();
    assert!(MAGIC_ADDR as usize >= info_end);
    assert!((MAGIC_ADDR as usize) < 0x2000_0100);
};

/// Called from `pre_init`.  Jumps to the system bootloader if the magic word
/// was left in RAM by [`enter_bootloader`].
pub fn check_bootloader_flag() {
    let magic_ptr = MAGIC_ADDR as *mut u32;
    unsafe {
        if magic_ptr.read_volatile() == BOOTLOADER_MAGIC {
            magic_ptr.write_volatile(0);
            cortex_m::asm::bootload(SYSTEM_BOOTLOADER as *const u32);
        }
    }
}

/// Sets the bootloader flag and resets.
pub fn enter_bootloader() -> ! {
    log::info!("Resetting into the system bootloader");
    unsafe {
        (MAGIC_ADDR as *mut u32).write_volatile(BOOTLOADER_MAGIC);
    }
    cortex_m::peripheral::SCB::sys_reset();
}
