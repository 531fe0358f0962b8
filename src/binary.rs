#![deny(missing_docs)]

//! Reading of binary table data.
//!
//! Every multi-byte integer in a Graphite table is big-endian.

pub mod read;
