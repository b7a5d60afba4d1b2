// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn main() {
    // Set up STM32 linking
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    // Police features
    let variants = [
        cfg!(feature = "f401re"),
        cfg!(feature = "f405rg"),
        cfg!(feature = "f411re"),
        cfg!(feature = "f446re"),
    ];
    let count = variants.iter().filter(|&&f| f).count();
    if count != 1 {
        panic!("Exactly one of 'f401re', 'f405rg', 'f411re' or 'f446re' must be enabled");
    }

    // Set the cargo runner
    set_cargo_runner();

    // Generate memory.x
    generate_memory_x();
}

fn set_cargo_runner() {
    const RUN_CMD_PREFIX: &str = "probe-rs run --no-location --chip ";

    let chip_id = if cfg!(feature = "f401re") {
        "STM32F401RETx"
    } else if cfg!(feature = "f405rg") {
        "STM32F405RGTx"
    } else if cfg!(feature = "f411re") {
        "STM32F411RETx"
    } else if cfg!(feature = "f446re") {
        "STM32F446RETx"
    } else {
        unreachable!()
    };

    // Create the script to run the binary using probe-rs
    let runner_cmd = format!("{RUN_CMD_PREFIX}{chip_id}");
    let script = format!(
        r#"#!/bin/bash
echo "-----"
echo Running {runner_cmd} "$@"
echo "-----"
{runner_cmd} "$@"
"#
    );

    let out_dir = env::var("OUT_DIR").unwrap();
    let runner_path = format!("{out_dir}/runner.sh");

    fs::write(&runner_path, script).unwrap();
    fs::set_permissions(&runner_path, fs::Permissions::from_mode(0o755)).unwrap();
}

// Creates a custom memory.x file for this firmware.
//
// The firmware proper must fit in the first 48KB of flash - the metadata and
// ROM images that the generator appends start there, and are found at runtime
// by address, not by linking.  FLASH is therefore deliberately undersized so
// the linker catches firmware growth before it corrupts the metadata region.
//
// Two extra sections are carved out so host tooling can find them at fixed
// addresses:
// - FLASH_INFO at 0x08000200, just after the vector table
// - RAM_INFO at the very start of RAM (it has a flash load address, and is
//   copied into place by info.rs at startup)
//
// With preload-to-ram, a further 64KB RAM region holds the ROM table, sized
// for the largest (multi-set) table.
fn generate_memory_x() {
    const STM32_FLASH_START: usize = 0x08000000;
    const STM32_RAM_START: usize = 0x20000000;
    const FIRMWARE_MAX_SIZE: usize = 48 * 1024;

    const FLASH_INFO_OFFSET: usize = 0x200;
    const FLASH_INFO_SIZE: usize = 256;
    const RAM_INFO_SIZE: usize = 256;

    const FLASH_INFO_START: usize = STM32_FLASH_START + FLASH_INFO_OFFSET;
    const RAM_INFO_LOAD_START: usize = FLASH_INFO_START + FLASH_INFO_SIZE;
    const POST_FLASH_INFO: usize = RAM_INFO_LOAD_START + RAM_INFO_SIZE;

    const FLASH_INFO_SECTION: &str = ".ghostrom_flash_info";
    const RAM_INFO_SECTION: &str = ".ghostrom_ram_info";
    const ROM_TABLE_SECTION: &str = ".ghostrom_rom_table";
    const ROM_TABLE_SIZE: usize = 64 * 1024;

    let ram_size: usize = if cfg!(feature = "f401re") {
        96 * 1024
    } else {
        128 * 1024
    };

    let rom_table_size = if cfg!(feature = "preload-to-ram") {
        ROM_TABLE_SIZE
    } else {
        0
    };

    let ram_start = STM32_RAM_START + RAM_INFO_SIZE + rom_table_size;
    let ram_len = ram_size - RAM_INFO_SIZE - rom_table_size;

    let rom_table_region = if cfg!(feature = "preload-to-ram") {
        let origin = STM32_RAM_START + RAM_INFO_SIZE;
        format!("    TABLE   : ORIGIN = {origin:#010X}, LENGTH = {ROM_TABLE_SIZE:#07X}\n")
    } else {
        String::new()
    };

    let rom_table_section = if cfg!(feature = "preload-to-ram") {
        format!(
            r#"
/* RAM copy of the ROM table - never initialised, filled by preload.rs */
SECTIONS
{{
    {ROM_TABLE_SECTION} (NOLOAD) : {{
        *({ROM_TABLE_SECTION}*)
    }} > TABLE
}}
INSERT AFTER .uninit;
"#
        )
    } else {
        String::new()
    };

    let out_dir = env::var("OUT_DIR").unwrap();
    let memory_path = Path::new(&out_dir).join("memory.x");

    let memory_x = format!(
        r#"
MEMORY
{{
    FLASH   : ORIGIN = {STM32_FLASH_START:#010X}, LENGTH = {FIRMWARE_MAX_SIZE:#07X}
    PRIVATE : ORIGIN = {STM32_RAM_START:#010X}, LENGTH = {RAM_INFO_SIZE:#05X}
{rom_table_region}    RAM     : ORIGIN = {ram_start:#010X}, LENGTH = {ram_len:#07X}
}}

/* Section to store firmware information to flash */
SECTIONS
{{
    {FLASH_INFO_SECTION} {FLASH_INFO_START:#010X} : AT({FLASH_INFO_START:#010X}) {{
        *({FLASH_INFO_SECTION}*)
    }} > FLASH
}}
INSERT AFTER .vector_table

/* Force .text to start after {FLASH_INFO_SECTION} */
PROVIDE(_stext = {POST_FLASH_INFO:#010X});

/* Section to store runtime information in RAM */
/* Needs to be physically located in flash (hence AT) and copied by info.rs at startup */
SECTIONS
{{
    {RAM_INFO_SECTION} {STM32_RAM_START:#010X} : AT({RAM_INFO_LOAD_START:#010X}) {{
        __ghostrom_ram_info_start = .;
        *({RAM_INFO_SECTION}*)
        __ghostrom_ram_info_end = .;
    }} > PRIVATE
     __ghostrom_ram_info_load = LOADADDR({RAM_INFO_SECTION});
     __ghostrom_ram_info_size = __ghostrom_ram_info_end - __ghostrom_ram_info_start;
}}
INSERT AFTER .rodata;
{rom_table_section}
_SEGGER_RTT_ADDRESS = ABSOLUTE(_SEGGER_RTT);
"#
    );

    fs::write(memory_path, memory_x).unwrap();

    println!("cargo:rustc-link-search={out_dir}");
}
