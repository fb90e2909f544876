//! Core types and utilities for DLMS/COSEM protocol
//!
//! This crate provides fundamental types, error handling, and utilities
//! used throughout the DLMS/COSEM implementation:
//!
//! - [`DlmsError`] / [`DlmsResult`]: the shared error surface
//! - [`ByteBuffer`]: growable byte buffer with A-XDR object count encoding
//! - [`Command`]: APDU tags recognized by the security layer

pub mod buffer;
pub mod command;
pub mod error;

pub use buffer::{ByteBuffer, object_count_size};
pub use command::Command;
pub use error::{DlmsError, DlmsResult};
