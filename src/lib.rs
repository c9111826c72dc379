//! Pupilscope firmware core
//!
//! # Design
//! The scanner runs a single cooperative loop. Each [Scanner::tick] applies a staged
//! configuration, checks which serial ports are attached, processes at most one host command
//! and acquires one image column: from streamed probe data when a STREAM command completed,
//! from the synthetic phantom otherwise.
//!
//! Board bring-up, the panel driver and the sidebar layout live in the board support package.
//! They plug in through the traits of [hardware].
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod hardware;
pub mod image;
pub mod scanner;

pub use config::{Config, ConfigStore};
pub use image::{Image, Placement};
pub use scanner::{DeviceLink, Scanner, Source, Tick};

/// Rows of the B-mode image: panel width minus the top bar.
pub const ROWS: usize = 128 - 16;

/// Columns of the B-mode image: panel height minus both sidebars.
pub const COLUMNS: usize = 160 - 28 - 20;

/// Capacity of a streamed A-scan.
pub const SIGNAL_CAPACITY: usize = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Demodulation failed")]
    Demodulation(#[from] echo_dsp::Error),
}
