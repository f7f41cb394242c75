//! Acquisition programs for the PicoHarp 300 TCSPC instrument on top of the
//! vendor's PHLib.
//!
//! All timing, histogramming and FIFO management happens inside the vendor
//! library. This crate sequences calls into it through a [`Session`],
//! marshals the fixed-size buffers the library fills, and persists the
//! results: a histogram file ([`histogram`]), a routed four-channel table
//! ([`routing`]) or a raw record stream ([`tttr`]).
//!
//! The library is reached through the [`PhLib`] trait. [`VendorLib`]
//! (behind the `phlib` feature) links the real library; [`SimulatedLib`]
//! stands in for it in tests and with `--simulate`.

mod buffer;
pub mod config;
pub mod console;
#[cfg(feature = "phlib")]
mod ffi;
pub mod histogram;
mod library;
pub mod phlib;
pub mod routing;
pub mod session;
pub mod sim;
pub mod tttr;
pub mod writer;

pub use buffer::{Histogram, RecordBuffer};
pub use config::Conf;
pub use console::{Console, Prompt, Unattended};
#[cfg(feature = "phlib")]
pub use ffi::VendorLib;
pub use library::{HardwareInfo, LibResult, PhLib, RouterInfo};
pub use phlib::{Flags, Mode, PhLibReturn};
pub use session::{Session, SessionState};
pub use sim::SimulatedLib;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{call} failed with error {code} ({message})")]
    Library {
        call: &'static str,
        code: i32,
        message: String,
    },
    #[error("no device available")]
    NoDeviceFound,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("router reports {0} routing channels, 4 are required")]
    InvalidRoutingChannels(i32),
    #[error("{0}")]
    InvalidState(String),
    #[error("session already closed")]
    SessionClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
