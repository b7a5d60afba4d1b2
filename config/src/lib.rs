// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Shared configuration types for Ghost ROM.
//!
//! Everything the firmware and the host-side image tooling need to agree on
//! lives here: the supported ROM types and their chip select behaviour, the
//! per-board pin model, and the serve-mode selection logic (check/invert mask
//! derivation and self-repair).
//!
//! The crate is `no_std` with no allocation, so the firmware can use the same
//! code paths the host tests exercise.

#![no_std]

pub mod chip;
pub mod hw;
pub mod serve;

pub use chip::{CsLogic, RomType};
pub use hw::{Board, JumperPull, NO_PIN};
pub use serve::{CsMasks, ServeAlg};

pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
