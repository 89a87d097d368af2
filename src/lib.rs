//! # ESP8266 AT command engine
//!
//! Blocking driver for ESP8266 modems running the AT firmware, based on [embedded_io] streams and
//! [fugit_timer] timers. The crate writes command lines, matches the response tokens and extracts
//! inbound socket data (`+IPD` frames) from the same stream.
//!
//! * [matcher]: Token matching and response extraction
//! * [frame]: Deframing of inbound socket data
//! * [session]: Single and multiplexed connections, TCP server
//! * [wifi]: Access point, soft AP, restart and module queries
//! * [stack]: [TcpClientStack](embedded_nal::TcpClientStack) implementation
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod adapter;
pub(crate) mod commands;
pub mod config;
pub mod frame;
pub mod matcher;
pub(crate) mod responses;
pub mod session;
pub mod stack;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
