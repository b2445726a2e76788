//! gcadapter — driver for the Wii U/Switch GameCube controller USB adapter.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod pad;
pub mod protocol;
pub mod sync;

pub use adapter::{AdapterStatus, GcAdapter};
pub use error::GcAdapterError;
