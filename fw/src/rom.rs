// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The ROM serving engine: final GPIO configuration and the hand-written
//! serve loops.
//!
//! The loops aim to beat the 300ns access time of the fastest 2332/2364
//! parts (slower 350ns and 450ns ROMs follow for free).  That is achieved
//! by:
//! - running the MCU flat out from the PLL
//! - keeping every loop-carried value in a register: the table base, the
//!   GPIO register addresses, the MODER output/input words and the two CS
//!   masks are all preloaded before entry
//! - reading all address and CS lines with a single halfword load of one
//!   port, and writing all data lines with a single byte store to another -
//!   the image generator has already remapped ("mangled") every table so
//!   the raw input word indexes it directly
//!
//! Register allocation mirrors that scheme (low registers for the
//! hot-loop operands, as those encodings are 16-bit):
//! - r0 address/CS input word, r1 data byte
//! - r2 table base, r3 MODER output word, r6 MODER input word
//! - r4 input port IDR, r5 data port ODR, r10 data port MODER
//! - r8 CS invert mask, r9 CS check mask, r12 scratch for the CS test
//! - r11 access counter address (count-access builds only)
//!
//! With the count-access feature, each loop bumps the runtime info access
//! counter once per chip select activation.  The counter is advisory - a
//! single aligned word with one writer, so the host sees at worst a stale
//! value - and the bump spends a few cycles of tCO margin, which is why
//! counting is off by default.
//!
//! The timing targets, from the MOS 2364 data sheet (February 1980):
//! - tACC - address to data valid - 450ns
//! - tCO  - data lines driven after CS activates - 200ns
//! - tDF  - data lines released after CS deactivates - 175ns
//! - tOH  - data held after address change - at least 40ns
//!
//! tACC and tCO are not cumulative, but both hold: there are always 450ns
//! from the address lines settling AND 200ns from CS activating.  The
//! default loop exploits that ratio by testing CS twice per table lookup.
//!
//! None of these functions return.  Interrupts are disabled on entry and
//! the MODER halfword stores assume the data port's upper pins (SWD) keep
//! their reset configuration.

use ghostrom_config::hw::Board;
#[cfg(feature = "status-led")]
use ghostrom_config::hw::NO_PIN;
use ghostrom_config::serve::{CsMasks, ServeAlg};

#[cfg(feature = "status-led")]
use embassy_stm32::pac::GPIOB;
use embassy_stm32::pac::gpio::regs::{Moder, Pupdr};
use embassy_stm32::pac::{GPIOA, GPIOC, RCC};

use crate::sets::RomSet;

// MODER words for the data port: PA0-7 as outputs/inputs, PA13/14 left as
// AF so SWD stays attached.  Only the low halfword is ever stored.
const DATA_OUTPUT_MASK: u32 = 0x2800_5555;
const DATA_INPUT_MASK: u32 = 0x2800_0000;

struct ServeParams {
    table: u32,
    idr: u32,
    odr: u32,
    moder: u32,
    check: u32,
    invert: u32,
    counter: u32,
}

/// Puts the GPIO ports in their serving state and enters the loop for the
/// given algorithm.
pub fn serve(set: &RomSet, masks: CsMasks, alg: ServeAlg, table: *const u8) -> ! {
    setup_gpio(set.rom_count);

    #[cfg(feature = "count-access")]
    let counter = crate::info::access_count_addr();
    #[cfg(not(feature = "count-access"))]
    let counter = 0u32;

    let params = ServeParams {
        table: table as u32,
        idr: GPIOC.idr().as_ptr() as u32,
        odr: GPIOA.odr().as_ptr() as u32,
        moder: GPIOA.moder().as_ptr() as u32,
        check: masks.check,
        invert: masks.invert,
        counter,
    };

    cortex_m::interrupt::disable();

    match alg.resolve() {
        ServeAlg::AddrOnCs => serve_addr_on_cs(&params),
        ServeAlg::AddrOnAnyCs => serve_addr_on_any_cs(&params),
        _ => serve_two_cs_one_addr(&params),
    }
}

fn setup_gpio(rom_count: u8) {
    // Clocks for the data (A) and address/CS (C) ports
    RCC.ahb1enr().modify(|w| w.0 |= (1 << 0) | (1 << 2));

    // PA0-7 as inputs for now, no pulls.  PA10-12 shadow CS lines on this
    // board, so they are cleared to inputs too.  Output speed "fast" rather
    // than "high" keeps V(OL) inside the 0.4V the host logic needs.
    GPIOA.moder().modify(|w| w.0 &= !0x00FC_FFFF);
    GPIOA.pupdr().modify(|w| w.0 &= !0x00FC_FFFF);
    GPIOA.ospeedr().modify(|w| {
        w.0 &= !0xFFFF;
        w.0 |= 0xAAAA;
    });

    // All of port C as inputs
    GPIOC.moder().write_value(Moder(0));

    // The table index is the raw input word, so unused high input bits must
    // read zero.  Single sets pull both bank lines down (16KB table); two
    // ROM sets leave X1 live; three leave both bank lines live (64KB table).
    let pupdr = match rom_count {
        1 => 0xA000_0000,
        2 => 0x8000_0000,
        3 => 0,
        _ => {
            log::warn!("!!! Unsupported ROM count: {rom_count}");
            0xA000_0000
        }
    };
    GPIOC.pupdr().write_value(Pupdr(pupdr));
}

/// Lights the status LED.  Driven low to light; stays on while serving.
#[cfg(feature = "status-led")]
pub fn status_led_on(board: &Board) {
    let pin = board.status;
    if pin == NO_PIN || pin > 15 {
        log::warn!("!!! Status pin {pin} unusable - not using");
        return;
    }
    let pin = pin as usize;

    RCC.ahb1enr().modify(|w| w.0 |= 1 << 1);
    GPIOB.moder().modify(|w| {
        w.0 &= !(0b11 << (pin * 2));
        w.0 |= 0b01 << (pin * 2);
    });
    GPIOB.ospeedr().modify(|w| w.0 |= 0b11 << (pin * 2));
    GPIOB.otyper().modify(|w| w.0 &= !(1 << pin));
    GPIOB.pupdr().modify(|w| w.0 &= !(0b11 << (pin * 2)));

    GPIOB.bsrr().write(|w| w.0 = 1 << (pin + 16));
}

#[cfg(not(feature = "status-led"))]
pub fn status_led_on(_board: &Board) {}

/// Diagnostic blink: two short flashes, pause, repeat.  For states where
/// serving is impossible - there is nothing left to protect, so this never
/// returns.
#[cfg(feature = "status-led")]
pub fn fault_blink(board: &Board) -> ! {
    if board.status == NO_PIN || board.status > 15 {
        loop {
            cortex_m::asm::wfe();
        }
    }
    status_led_on(board);
    let pin = board.status as usize;

    loop {
        for _ in 0..2 {
            GPIOB.bsrr().write(|w| w.0 = 1 << (pin + 16));
            cortex_m::asm::delay(8_000_000);
            GPIOB.bsrr().write(|w| w.0 = 1 << pin);
            cortex_m::asm::delay(8_000_000);
        }
        cortex_m::asm::delay(32_000_000);
    }
}

#[cfg(not(feature = "status-led"))]
pub fn fault_blink(_board: &Board) -> ! {
    loop {
        cortex_m::asm::wfe();
    }
}

// The default single-chip algorithm.  Tests CS roughly twice as often as it
// looks the byte up, reflecting the 200ns tCO vs 450ns tACC budget, and
// keeps the data lines loaded with the current address's byte even while
// idle so activation only has to flip MODER.
//
// Each macro takes the instructions to run on CS activation, after the data
// lines are driven; counting builds pass the access counter bump, plain
// builds pass nothing.  r12 is free at that point and retested before use.
macro_rules! two_cs_one_addr_loop {
    ($name:ident $(, $bump:literal)*) => {
fn $name(p: &ServeParams) -> ! {
    unsafe {
        core::arch::asm!(
            // Enter via the idle loop, so deactivation falls straight
            // through into it with no branch on the golden path
            "b 2f",

            // CS went active - drive the data lines immediately
            "3:",
            "strh r3, [r10]",
            $($bump,)*

            // The address in hand was just tested, so look its byte up and
            // apply it, testing CS again between the two
            "ldrb r1, [r2, r0]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "bne 5f",
            "4:",
            "strb r1, [r5]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "bne 6f",
            "ldrb r1, [r2, r0]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 4b",
            // Fall through - CS went inactive with a fresh byte in hand:
            // release the bus, then park the byte for the idle loop
            "5:",
            "strh r6, [r10]",
            "strb r1, [r5]",

            // Idle loop - track the address lines, watching for CS
            "2:",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 3b",
            "ldrb r1, [r2, r0]",
            "ldrh r0, [r4]",
            "strb r1, [r5]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 3b",
            "b 2b",

            // CS went inactive with no byte in hand.  Release the bus, then
            // run a copy of the idle loop to avoid a branch on the way in
            "6:",
            "strh r6, [r10]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 3b",
            "ldrb r1, [r2, r0]",
            "ldrh r0, [r4]",
            "strb r1, [r5]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 3b",
            "b 2b",

            in("r0") 0u32,
            in("r1") 0u32,
            in("r2") p.table,
            in("r3") DATA_OUTPUT_MASK,
            in("r4") p.idr,
            in("r5") p.odr,
            in("r6") DATA_INPUT_MASK,
            in("r8") p.invert,
            in("r9") p.check,
            in("r10") p.moder,
            in("r11") p.counter,
            in("r12") 0u32,
            options(noreturn),
        )
    }
}
    };
}

// Alternative single-chip algorithm: nothing is looked up until CS goes
// active.  More stable on some hosts, less on others - selectable per set.
macro_rules! addr_on_cs_loop {
    ($name:ident $(, $bump:literal)*) => {
fn $name(p: &ServeParams) -> ! {
    unsafe {
        core::arch::asm!(
            "b 2f",

            // CS went active.  The address is in hand from the test that
            // got us here; look up first, then flip MODER, so the load-use
            // delay of ldrb is spent doing useful work
            "3:",
            "ldrb r1, [r2, r0]",
            "strh r3, [r10]",
            $($bump,)*

            // Serve until CS drops.  The next byte is fetched before the
            // backwards branch (which the CPU predicts taken): some hosts
            // settle their address lines late, and this ordering picks the
            // final value up on the next pass rather than serving a byte
            // for a half-settled address
            "4:",
            "strb r1, [r5]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "ldrb r1, [r2, r0]",
            "beq 4b",

            // CS dropped - release the bus and fall into the idle loop
            "strh r6, [r10]",
            "2:",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "tst r12, r9",
            "beq 3b",
            "b 2b",

            in("r0") 0u32,
            in("r1") 0u32,
            in("r2") p.table,
            in("r3") DATA_OUTPUT_MASK,
            in("r4") p.idr,
            in("r5") p.odr,
            in("r6") DATA_INPUT_MASK,
            in("r8") p.invert,
            in("r9") p.check,
            in("r10") p.moder,
            in("r11") p.counter,
            in("r12") 0u32,
            options(noreturn),
        )
    }
}
    };
}

// Multi-ROM sets: same structure as the addr-on-CS loop, but "active" means
// any line of the check mask is active.  bics computes check & !normalized,
// leaving non-zero (NE) when at least one line is active, so every branch
// sense is reversed relative to the all-lines test.
macro_rules! addr_on_any_cs_loop {
    ($name:ident $(, $bump:literal)*) => {
fn $name(p: &ServeParams) -> ! {
    unsafe {
        core::arch::asm!(
            "b 2f",

            "3:",
            "ldrb r1, [r2, r0]",
            "strh r3, [r10]",
            $($bump,)*

            "4:",
            "strb r1, [r5]",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "bics r12, r9, r12",
            "ldrb r1, [r2, r0]",
            "bne 4b",

            "strh r6, [r10]",
            "2:",
            "ldrh r0, [r4]",
            "eor r12, r0, r8",
            "bics r12, r9, r12",
            "bne 3b",
            "b 2b",

            in("r0") 0u32,
            in("r1") 0u32,
            in("r2") p.table,
            in("r3") DATA_OUTPUT_MASK,
            in("r4") p.idr,
            in("r5") p.odr,
            in("r6") DATA_INPUT_MASK,
            in("r8") p.invert,
            in("r9") p.check,
            in("r10") p.moder,
            in("r11") p.counter,
            in("r12") 0u32,
            options(noreturn),
        )
    }
}
    };
}

#[cfg(not(feature = "count-access"))]
two_cs_one_addr_loop!(serve_two_cs_one_addr);
#[cfg(not(feature = "count-access"))]
addr_on_cs_loop!(serve_addr_on_cs);
#[cfg(not(feature = "count-access"))]
addr_on_any_cs_loop!(serve_addr_on_any_cs);

#[cfg(feature = "count-access")]
two_cs_one_addr_loop!(
    serve_two_cs_one_addr,
    "ldr r12, [r11]",
    "adds r12, r12, #1",
    "str r12, [r11]"
);
#[cfg(feature = "count-access")]
addr_on_cs_loop!(
    serve_addr_on_cs,
    "ldr r12, [r11]",
    "adds r12, r12, #1",
    "str r12, [r11]"
);
#[cfg(feature = "count-access")]
addr_on_any_cs_loop!(
    serve_addr_on_any_cs,
    "ldr r12, [r11]",
    "adds r12, r12, #1",
    "str r12, [r11]"
);
