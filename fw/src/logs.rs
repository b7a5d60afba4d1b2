// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! RTT logging bring-up.
//!
//! Boot logging only - the serve loop runs with interrupts off and never
//! logs.  NoBlockSkip so an unattached probe cannot stall startup.

use rtt_target::ChannelMode;

pub fn init_rtt() {
    rtt_target::rtt_init_log!(log::LevelFilter::Debug, ChannelMode::NoBlockSkip);
}
