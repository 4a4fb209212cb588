//! NetFlow collection and export agent
//!
//! The servers and sinks around the wire codec and the flow cache: a UDP
//! collector that decodes router export datagrams, a traffic aggregator
//! feeding the cache and a UDP exporter that pushes expired flows to
//! downstream collectors.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod collector;
pub mod config;
pub mod exporter;
pub mod traffic;

pub use collector::{PacketListener, Server};
pub use config::Config;
pub use exporter::Exporter;
pub use traffic::Aggregator;
