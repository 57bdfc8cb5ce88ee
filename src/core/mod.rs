//! # Core Protocol Components
//!
//! The SDP binary codec and the length-prefixed framing built on it.
//!
//! ## Components
//! - **SDP**: self-describing tag/type/length encoding of records
//! - **Frame**: 4-byte big-endian length prefix plus helpers for reassembly
//!
//! ## Wire Format
//! ```text
//! [Length(4)] [0x7_ record-begin] [fields...] [0x80 record-end]
//! ```
//!
//! ## Safety
//! - Decoding never panics on hostile input
//! - Element counts are checked against the remaining input before allocation
//! - Nesting depth is bounded while decoding and skipping

pub mod frame;
pub mod sdp;
