//! LVS Prefix Codec
//!
//! Packed IPv4/IPv6 network prefixes as used by the forwarding table and by
//! BGP route announcements:
//! - [`Prefix`]: address family, full-width padded octets and prefix length
//! - [`Address`]: a single address, printed without a length suffix
//! - [`nlri`]: RFC 4271 length-prefixed encoding of prefix lists

pub mod nlri;
pub mod prefix;

pub use lvs_core::{LvsError, Result};
pub use prefix::{Address, AddressFamily, Prefix};
