//! Ghost ROM firmware
//!
//! Emulates one or more 2316/2332/2364 mask ROMs on an STM32F4, serving
//! bytes from a pre-remapped table in RAM or flash.  Boot has to finish -
//! jumpers read, metadata parsed, table preloaded, GPIO configured - before
//! the host machine starts fetching from the ROM socket, so everything here
//! runs once, quickly, and then hands over to the serve loop forever.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![no_std]
#![no_main]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use embassy_executor::Spawner;
use embassy_executor::main as embassy_main;
use embassy_stm32::gpio::{Flex, Pull};
use embassy_stm32::rcc::clocks;
use embassy_time::Timer;
use panic_rtt_target as _;

use ghostrom_config::hw::JumperPull;
use ghostrom_config::serve::{
    ServeAlgRepair, derive_masks, derive_multi_masks, repair_serve_alg, select_set,
};

#[cfg(feature = "bootloader")]
mod boot;
mod info;
#[cfg(feature = "boot-logging")]
mod logs;
#[cfg(feature = "preload-to-ram")]
mod preload;
mod rcc;
mod rom;
mod sets;

use info::{BOARD, PKG_VERSION};

#[cortex_m_rt::pre_init]
unsafe fn pre_init() {
    #[cfg(feature = "bootloader")]
    boot::check_bootloader_flag();
    unsafe {
        info::copy_runtime_info();
    }
}

#[embassy_main]
async fn main(_spawner: Spawner) {
    // Set up clock config
    let mut config = embassy_stm32::Config::default();
    rcc::configure_hsi(&mut config);

    // Get peripherals
    let p = embassy_stm32::init(config);

    // Configure clocks
    let clocks = clocks(&p.RCC);

    #[cfg(feature = "boot-logging")]
    logs::init_rtt();

    info!("-----");
    info!("Ghost ROM v{}", PKG_VERSION);
    info!("Copyright (C) 2025 Piers Finlayson");
    info!("-----");
    match clocks.sys.to_hertz() {
        Some(hz) => debug!("SYSCLK: {hz}"),
        None => warn!("SYSCLK: Unknown"),
    }
    debug!(
        "Flash info address:   {:#010X}",
        &info::FLASH_INFO as *const _ as usize
    );
    #[allow(static_mut_refs)]
    unsafe {
        debug!(
            "Runtime info address: {:#010X}",
            (&raw const info::RUNTIME_INFO) as usize
        );
    }

    BOARD.validate(|issue| warn!("!!! Board problem: {issue:?}"));

    // Read the image select jumpers.  The pulls need a moment to settle
    // before the pins are sampled.
    let mut sel_pins = [
        Flex::new(p.PB0),
        Flex::new(p.PB1),
        Flex::new(p.PB2),
        Flex::new(p.PB7),
    ];
    let pull = match BOARD.sel_pull {
        JumperPull::Down => Pull::Down,
        JumperPull::Up => Pull::Up,
    };
    for pin in sel_pins.iter_mut() {
        pin.set_as_input(pull);
    }
    Timer::after_micros(10).await;
    let mut raw_sel = 0u32;
    for (pin, &bit) in sel_pins.iter().zip(BOARD.sel.iter()) {
        if pin.is_high() {
            raw_sel |= 1 << bit;
        }
    }
    drop(sel_pins);
    let sel = BOARD.sel_value(raw_sel);

    // All jumpers fitted means reflash, not serve
    #[cfg(feature = "bootloader")]
    if sel == 0b1111 {
        info!("All select jumpers fitted - entering bootloader");
        boot::enter_bootloader();
    }

    // Find and validate the metadata the generator appended to flash
    let metadata = match sets::RomSets::load() {
        Ok(metadata) => metadata,
        Err(e) => fail("metadata", e),
    };
    let set_index = select_set(sel, metadata.count() as usize) as u8;
    info!("ROM sel/set {}/{} of {}", sel, set_index, metadata.count());
    info::record_selection(sel, set_index);

    let set = match metadata.set(set_index) {
        Ok(set) => set,
        Err(e) => fail("ROM set", e),
    };
    info!(
        "Serving {} ({}), {} chip(s), {} bytes",
        set.rom.filename.unwrap_or("<unnamed>"),
        set.rom.rom_type.name(),
        set.rom_count,
        set.data.len()
    );

    // The serve algorithm comes from the generator but is treated as
    // untrusted - repair it rather than serve garbage
    let (alg, repaired) = repair_serve_alg(set.serve, set.rom_count);
    match repaired {
        Some(ServeAlgRepair::ForcedAnyCs) => {
            warn!("!!! Multi-ROM set without the any-CS algorithm - rectifying")
        }
        Some(ServeAlgRepair::ResetToDefault) => {
            warn!("!!! Single ROM with the any-CS algorithm - using default")
        }
        None => (),
    }

    let masks = if set.rom_count > 1 {
        let (masks, supported) = derive_multi_masks(BOARD, set.rom_count, set.multi_cs1);
        if !supported {
            warn!("!!! Unsupported ROM count: {}", set.rom_count);
        }
        masks
    } else {
        derive_masks(BOARD, set.rom.rom_type, set.rom.cs1, set.rom.cs2, set.rom.cs3)
    };
    debug!("CS check mask:  {:#010X}", masks.check);
    debug!("CS invert mask: {:#010X}", masks.invert);

    #[cfg(feature = "preload-to-ram")]
    let table = preload::preload(&set);
    #[cfg(not(feature = "preload-to-ram"))]
    let table = set.data.as_ptr();
    info::record_table(table, set.data.len());

    rom::status_led_on(BOARD);

    info!("Start serving - logging ends");
    rom::serve(&set, masks, alg, table)
}

// A board with no servable image must not drive the bus - blink instead
fn fail(what: &str, e: sets::Error) -> ! {
    error!("Bad {what}: {e:?} - not serving");
    rom::fault_blink(BOARD)
}

// By the time a hard fault fires the serve loop has already failed, so
// diagnostics win over any attempt to carry on
#[cortex_m_rt::exception]
unsafe fn HardFault(_frame: &cortex_m_rt::ExceptionFrame) -> ! {
    rom::fault_blink(BOARD)
}
