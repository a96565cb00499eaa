//! RFC 4271 prefix list encoding (NLRI and withdrawn routes)
//!
//! Each prefix is one length octet followed by the `ceil(len / 8)` octets
//! that hold its significant bits.

use crate::prefix::{AddressFamily, Prefix};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use lvs_core::{LvsError, Result};
use std::collections::BTreeSet;

/// Bytes one prefix occupies on the wire
pub fn encoded_len(prefix: &Prefix) -> usize {
    1 + prefix.packed_min().len()
}

pub fn encode_prefix(prefix: &Prefix, buf: &mut BytesMut) {
    buf.put_u8(prefix.prefix_len());
    buf.put_slice(prefix.packed_min());
}

pub fn encode_prefixes<'a, I>(prefixes: I) -> Bytes
where
    I: IntoIterator<Item = &'a Prefix>,
{
    let mut buf = BytesMut::new();
    for prefix in prefixes {
        encode_prefix(prefix, &mut buf);
    }
    buf.freeze()
}

/// Move prefixes from `pending` into `buf` until the next one would push the
/// written size past `max_len`. Prefixes that did not fit stay in `pending`.
///
/// Returns the number of prefixes written.
pub fn encode_some_prefixes(
    pending: &mut BTreeSet<Prefix>,
    buf: &mut BytesMut,
    max_len: usize,
) -> usize {
    let mut written = 0usize;
    let mut added = 0usize;

    while let Some(prefix) = pending.pop_first() {
        let needed = encoded_len(&prefix);
        if max_len.saturating_sub(written) < needed {
            pending.insert(prefix);
            break;
        }
        encode_prefix(&prefix, buf);
        written += needed;
        added += 1;
    }
    added
}

pub fn decode_prefixes(data: &[u8], family: AddressFamily) -> Result<Vec<Prefix>> {
    let mut buf = Bytes::copy_from_slice(data);
    let mut prefixes = Vec::new();

    while buf.has_remaining() {
        let len = buf.get_u8();
        if len > family.bits() {
            return Err(LvsError::format(format!(
                "invalid network field: prefix length {} for {}",
                len, family
            )));
        }

        let octet_len = usize::from(len).div_ceil(8);
        if buf.remaining() < octet_len {
            return Err(LvsError::format(format!(
                "truncated prefix: need {} octets, {} left",
                octet_len,
                buf.remaining()
            )));
        }

        let mut octets = buf.split_to(octet_len).to_vec();
        let remainder = len % 8;
        if remainder > 0 {
            if let Some(last) = octets.last_mut() {
                *last &= 0xFFu8 << (8 - remainder);
            }
        }

        prefixes.push(Prefix::from_octets(family, &octets, len)?);
    }

    Ok(prefixes)
}
