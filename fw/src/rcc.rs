// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! RCC (clock) configuration.
//!
//! The serve loop's worst-case path is a fixed number of cycles, so meeting
//! the ROM timing budget is purely a matter of clock speed - each variant is
//! driven at its maximum rated sysclk from the HSI via the PLL.

use embassy_stm32::Config;
use embassy_stm32::rcc::{
    AHBPrescaler, APBPrescaler, Pll, PllMul, PllPDiv, PllPreDiv, PllSource, Sysclk,
};

// Configure max clock using HSI
pub fn configure_hsi(config: &mut Config) {
    config.rcc.hsi = true;
    config.rcc.pll_src = PllSource::HSI;
    config.rcc.sys = Sysclk::PLL1_P;

    // 84MHz
    #[cfg(feature = "f401re")]
    {
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV16,
            mul: PllMul::MUL336,
            divp: Some(PllPDiv::DIV4),
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
    }

    // 100MHz
    #[cfg(feature = "f411re")]
    {
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV16,
            mul: PllMul::MUL400,
            divp: Some(PllPDiv::DIV4),
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
    }

    // 168MHz
    #[cfg(feature = "f405rg")]
    {
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV16,
            mul: PllMul::MUL336,
            divp: Some(PllPDiv::DIV2),
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
    }

    // 180MHz
    #[cfg(feature = "f446re")]
    {
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV16,
            mul: PllMul::MUL360,
            divp: Some(PllPDiv::DIV2),
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
    }
}
