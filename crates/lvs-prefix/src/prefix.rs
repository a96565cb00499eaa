//! IP prefixes in packed, full-width form

use lvs_core::{LvsError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Address family, numbered as the BGP AFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum AddressFamily {
    Inet = 1,
    Inet6 = 2,
}

impl AddressFamily {
    pub fn afi(self) -> u16 {
        self as u16
    }

    pub fn from_afi(afi: u16) -> Result<Self> {
        match afi {
            1 => Ok(Self::Inet),
            2 => Ok(Self::Inet6),
            other => Err(LvsError::format(format!("unknown address family {}", other))),
        }
    }

    /// Address width in octets
    pub fn octets(self) -> usize {
        match self {
            Self::Inet => 4,
            Self::Inet6 => 16,
        }
    }

    /// Address width in bits
    pub fn bits(self) -> u8 {
        match self {
            Self::Inet => 32,
            Self::Inet6 => 128,
        }
    }

    fn of_text(address: &str) -> Self {
        if address.contains(':') {
            Self::Inet6
        } else {
            Self::Inet
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet => f.write_str("IPv4"),
            Self::Inet6 => f.write_str("IPv6"),
        }
    }
}

/// An address plus the number of significant leading bits.
///
/// Octets are always stored padded to the family width; bits past
/// `prefix_len` are kept as given and are only cleared by [`Prefix::mask`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    family: AddressFamily,
    octets: [u8; 16],
    len: u8,
}

/// Number of octets holding the significant bits of a `len`-bit prefix
fn min_octets(len: u8) -> usize {
    usize::from(len).div_ceil(8)
}

fn low_bits(n: u32) -> u128 {
    if n >= 128 {
        u128::MAX
    } else {
        (1u128 << n) - 1
    }
}

impl Prefix {
    /// Build from a possibly short octet sequence, zero-padding to full width
    pub fn from_octets(family: AddressFamily, octets: &[u8], len: u8) -> Result<Self> {
        if len > family.bits() {
            return Err(LvsError::format(format!(
                "prefix length {} exceeds {} bits for {}",
                len,
                family.bits(),
                family
            )));
        }
        if octets.len() > family.octets() {
            return Err(LvsError::format(format!(
                "{} octets is too many for an {} prefix",
                octets.len(),
                family
            )));
        }
        if octets.len() < min_octets(len) {
            return Err(LvsError::format(format!(
                "prefix length {} needs {} octets, got {}",
                len,
                min_octets(len),
                octets.len()
            )));
        }

        let mut padded = [0u8; 16];
        padded[..octets.len()].copy_from_slice(octets);
        Ok(Self {
            family,
            octets: padded,
            len,
        })
    }

    pub fn from_ipv4_int(value: u32, len: u8) -> Result<Self> {
        Self::from_octets(AddressFamily::Inet, &value.to_be_bytes(), len)
    }

    pub fn from_addr(addr: IpAddr, len: u8) -> Result<Self> {
        match addr {
            IpAddr::V4(v4) => Self::from_octets(AddressFamily::Inet, &v4.octets(), len),
            IpAddr::V6(v6) => Self::from_octets(AddressFamily::Inet6, &v6.octets(), len),
        }
    }

    /// Parse `"address/length"`, inferring the family from a colon in the address
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with_family(text, None)
    }

    pub fn parse_with_family(text: &str, family: Option<AddressFamily>) -> Result<Self> {
        let (address, len) = text
            .split_once('/')
            .ok_or_else(|| LvsError::format(format!("{} has no prefix length", text)))?;
        let family = family.unwrap_or_else(|| AddressFamily::of_text(address));

        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LvsError::format(format!("invalid prefix length in {}", text)));
        }
        let len: u8 = len
            .parse()
            .map_err(|_| LvsError::format(format!("invalid prefix length in {}", text)))?;

        let octets = match family {
            AddressFamily::Inet => parse_ipv4(address)?,
            AddressFamily::Inet6 => parse_ipv6(address)?,
        };
        Self::from_octets(family, &octets, len)
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    pub fn is_single_address(&self) -> bool {
        self.len == self.family.bits()
    }

    /// Full-width padded octets
    pub fn packed(&self) -> &[u8] {
        &self.octets[..self.family.octets()]
    }

    /// Only the octets covered by the prefix length
    pub fn packed_min(&self) -> &[u8] {
        &self.octets[..min_octets(self.len)]
    }

    pub fn to_int(&self) -> u128 {
        self.packed()
            .iter()
            .fold(0u128, |acc, &octet| (acc << 8) | u128::from(octet))
    }

    fn set_int(&mut self, value: u128) {
        let width = self.family.octets();
        let bytes = value.to_be_bytes();
        self.octets = [0u8; 16];
        self.octets[..width].copy_from_slice(&bytes[16 - width..]);
    }

    /// Zero every address bit past `prefix_len`, optionally also shortening
    /// the stored length.
    pub fn mask(&mut self, prefix_len: u8, shorten: bool) -> Result<&mut Self> {
        let bits = self.family.bits();
        if prefix_len > bits {
            return Err(LvsError::format(format!(
                "cannot mask {} to {} bits",
                self, prefix_len
            )));
        }

        let host_bits = u32::from(bits - prefix_len);
        let masked = self
            .to_int()
            .checked_shr(host_bits)
            .map_or(0, |network| network << host_bits);
        self.set_int(masked);

        if shorten {
            self.len = prefix_len;
        }
        Ok(self)
    }

    /// `~((1 << host_bits) - 1)` truncated to the family width
    pub fn netmask_int(&self) -> u128 {
        let bits = u32::from(self.family.bits());
        let host_bits = u32::from(self.family.bits() - self.len);
        low_bits(bits) & !low_bits(host_bits)
    }
}

fn parse_ipv4(address: &str) -> Result<Vec<u8>> {
    let parts: Vec<&str> = address.split('.').collect();
    if parts.len() > 4 {
        return Err(LvsError::format(format!("{} has more than 4 octets", address)));
    }

    parts
        .iter()
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(LvsError::format(format!("invalid IPv4 address {}", address)));
            }
            part.parse::<u8>()
                .map_err(|_| LvsError::format(format!("octet {} out of range in {}", part, address)))
        })
        .collect()
}

/// Expand `::` the fixed way: a leading `::` gets a `0` group in front, a
/// trailing one gets a `0` group after, and each empty group left after
/// splitting stands for `8 - groups + 1` zero groups.
fn parse_ipv6(address: &str) -> Result<Vec<u8>> {
    let mut text = address.to_string();
    if text.starts_with("::") {
        text.insert(0, '0');
    }
    if text.ends_with("::") {
        text.push('0');
    }

    let groups: Vec<&str> = text.split(':').collect();
    if groups.len() > 8 {
        return Err(LvsError::format(format!("{} has more than 8 groups", address)));
    }

    let mut octets = Vec::with_capacity(16);
    for group in &groups {
        if group.is_empty() {
            let zeros = 2 * (8 - groups.len() + 1);
            octets.resize(octets.len() + zeros, 0);
            continue;
        }
        if group.len() > 4 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(LvsError::format(format!(
                "invalid group {:?} in IPv6 address {}",
                group, address
            )));
        }
        let value = u16::from_str_radix(group, 16)
            .map_err(|_| LvsError::format(format!("invalid IPv6 address {}", address)))?;
        octets.extend_from_slice(&value.to_be_bytes());
    }

    if octets.len() != 16 {
        return Err(LvsError::format(format!(
            "{} does not expand to 8 groups",
            address
        )));
    }
    Ok(octets)
}

fn write_address(f: &mut fmt::Formatter<'_>, family: AddressFamily, octets: &[u8]) -> fmt::Result {
    match family {
        AddressFamily::Inet => {
            for (i, octet) in octets.iter().enumerate() {
                if i > 0 {
                    f.write_str(".")?;
                }
                write!(f, "{}", octet)?;
            }
        }
        AddressFamily::Inet6 => {
            for (i, pair) in octets.chunks_exact(2).enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{:x}", u16::from_be_bytes([pair[0], pair[1]]))?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_address(f, self.family, self.packed())?;
        write!(f, "/{}", self.len)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({})", self)
    }
}

impl Ord for Prefix {
    fn cmp(&self, other: &Self) -> Ordering {
        self.packed()
            .cmp(other.packed())
            .then(self.len.cmp(&other.len))
    }
}

impl PartialOrd for Prefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Prefix {
    type Err = LvsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(de::Error::custom)
    }
}

/// A single address: a full-length prefix shown without its length
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Prefix);

impl Address {
    pub fn ipv4_address(text: &str) -> Result<Self> {
        Prefix::parse_with_family(&format!("{}/32", text), Some(AddressFamily::Inet)).map(Self)
    }

    pub fn ipv6_address(text: &str) -> Result<Self> {
        Prefix::parse_with_family(&format!("{}/128", text), Some(AddressFamily::Inet6)).map(Self)
    }

    pub fn from_packed(family: AddressFamily, octets: &[u8]) -> Result<Self> {
        if octets.len() != family.octets() {
            return Err(LvsError::format(format!(
                "an {} address needs {} octets, got {}",
                family,
                family.octets(),
                octets.len()
            )));
        }
        Prefix::from_octets(family, octets, family.bits()).map(Self)
    }

    pub fn family(&self) -> AddressFamily {
        self.0.family
    }

    pub fn packed(&self) -> &[u8] {
        self.0.packed()
    }

    pub fn prefix(&self) -> Prefix {
        self.0
    }

    pub fn to_ip_addr(&self) -> IpAddr {
        match self.0.family {
            AddressFamily::Inet => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(self.packed());
                IpAddr::from(octets)
            }
            AddressFamily::Inet6 => IpAddr::from(self.0.octets),
        }
    }
}

impl FromStr for Address {
    type Err = LvsError;

    fn from_str(s: &str) -> Result<Self> {
        match AddressFamily::of_text(s) {
            AddressFamily::Inet => Self::ipv4_address(s),
            AddressFamily::Inet6 => Self::ipv6_address(s),
        }
    }
}

impl From<IpAddr> for Address {
    fn from(addr: IpAddr) -> Self {
        let prefix = match addr {
            IpAddr::V4(v4) => {
                let mut octets = [0u8; 16];
                octets[..4].copy_from_slice(&v4.octets());
                Prefix {
                    family: AddressFamily::Inet,
                    octets,
                    len: 32,
                }
            }
            IpAddr::V6(v6) => Prefix {
                family: AddressFamily::Inet6,
                octets: v6.octets(),
                len: 128,
            },
        };
        Self(prefix)
    }
}

impl From<Address> for Prefix {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_address(f, self.0.family, self.0.packed())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}
