// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core value types for route-policy evaluation, shared between the engine
//! and its consumers.
//!
//! This crate provides the fundamental types for representing network
//! prefixes and address families. It has minimal dependencies and can be
//! used by clients without pulling in the policy engine itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, JsonSchema,
)]
pub struct Prefix4 {
    pub value: Ipv4Addr,
    pub length: u8,
}

impl Prefix4 {
    pub const MAX_LENGTH: u8 = 32;

    /// Create a new `Prefix4` from an address and mask length, zeroing any
    /// host bits the address carries.
    /// ```
    /// use policy_types::Prefix4;
    /// use std::net::Ipv4Addr;
    /// let p = Prefix4::new(Ipv4Addr::new(10, 1, 2, 3), 16);
    /// assert_eq!(p.value, Ipv4Addr::new(10, 1, 0, 0));
    /// ```
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    fn mask(&self) -> u32 {
        match self.length {
            0 => 0,
            _ => (!0u32) << (32 - self.length),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & self.mask() == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value = Ipv4Addr::from_bits(self.value.to_bits() & self.mask());
    }

    /// Check if this prefix is contained within another prefix. Returns
    /// true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix4) -> bool {
        if self.length < other.length {
            return false;
        }
        if other.length == 0 {
            return true;
        }
        let mask = !0u32 << (32 - other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    /// Check if an address falls inside this prefix.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        Prefix4::new(addr, Self::MAX_LENGTH).within(self)
    }
}

impl PartialOrd for Prefix4 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix4 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix4 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let length: u8 = length
            .parse()
            .map_err(|_| "malformed prefix length".to_string())?;
        if length > Self::MAX_LENGTH {
            return Err("prefix length out of range".to_string());
        }
        Ok(Self {
            value: value
                .parse()
                .map_err(|_| "malformed ip addr".to_string())?,
            length,
        })
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, JsonSchema,
)]
pub struct Prefix6 {
    pub value: Ipv6Addr,
    pub length: u8,
}

impl Prefix6 {
    pub const MAX_LENGTH: u8 = 128;

    /// Create a new `Prefix6` from an address and mask length, zeroing any
    /// host bits the address carries.
    pub fn new(ip: Ipv6Addr, length: u8) -> Self {
        let mut new = Self { value: ip, length };
        new.unset_host_bits();
        new
    }

    fn mask(&self) -> u128 {
        match self.length {
            0 => 0,
            _ => (!0u128) << (128 - self.length),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & self.mask() == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value = Ipv6Addr::from_bits(self.value.to_bits() & self.mask());
    }

    /// Check if this prefix is contained within another prefix. Returns
    /// true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix6) -> bool {
        if self.length < other.length {
            return false;
        }
        if other.length == 0 {
            return true;
        }
        let mask = !0u128 << (128 - other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    /// Check if an address falls inside this prefix.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        Prefix6::new(addr, Self::MAX_LENGTH).within(self)
    }
}

impl PartialOrd for Prefix6 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix6 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl fmt::Display for Prefix6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix6 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let length: u8 = length
            .parse()
            .map_err(|_| "malformed prefix length".to_string())?;
        if length > Self::MAX_LENGTH {
            return Err("prefix length out of range".to_string());
        }
        Ok(Self {
            value: value
                .parse()
                .map_err(|_| "malformed ip addr".to_string())?,
            length,
        })
    }
}

#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
}

impl Prefix {
    pub fn new(ip: IpAddr, length: u8) -> Self {
        match ip {
            IpAddr::V4(ip4) => Self::V4(Prefix4::new(ip4, length)),
            IpAddr::V6(ip6) => Self::V6(Prefix6::new(ip6, length)),
        }
    }

    pub fn addr(&self) -> IpAddr {
        match self {
            Self::V4(p4) => IpAddr::V4(p4.value),
            Self::V6(p6) => IpAddr::V6(p6.value),
        }
    }

    pub fn length(&self) -> u8 {
        match self {
            Self::V4(p4) => p4.length,
            Self::V6(p6) => p6.length,
        }
    }

    /// Maximum mask length for this prefix's address family.
    pub fn max_length(&self) -> u8 {
        match self {
            Self::V4(_) => Prefix4::MAX_LENGTH,
            Self::V6(_) => Prefix6::MAX_LENGTH,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Self::V4(_) => AddressFamily::Ipv4,
            Self::V6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        match self {
            Self::V4(p4) => p4.host_bits_are_unset(),
            Self::V6(p6) => p6.host_bits_are_unset(),
        }
    }

    pub fn unset_host_bits(&mut self) {
        match self {
            Self::V4(p4) => p4.unset_host_bits(),
            Self::V6(p6) => p6.unset_host_bits(),
        }
    }

    /// Check if this prefix is contained within another prefix. Returns
    /// false for cross-family comparisons.
    pub fn within(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Prefix::V4(a), Prefix::V4(b)) => a.within(b),
            (Prefix::V6(a), Prefix::V6(b)) => a.within(b),
            _ => false,
        }
    }

    /// Check if an address falls inside this prefix. Cross-family addresses
    /// are never contained.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self, addr) {
            (Prefix::V4(p4), IpAddr::V4(a)) => p4.contains(a),
            (Prefix::V6(p6), IpAddr::V6(a)) => p6.contains(a),
            _ => false,
        }
    }
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
        }
    }
}

impl From<Prefix4> for Prefix {
    fn from(value: Prefix4) -> Self {
        Self::V4(value)
    }
}

impl From<Prefix6> for Prefix {
    fn from(value: Prefix6) -> Self {
        Self::V6(value)
    }
}

impl FromStr for Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(prefix4) = s.parse::<Prefix4>() {
            Ok(Self::V4(prefix4))
        } else if let Ok(prefix6) = s.parse::<Prefix6>() {
            Ok(Self::V6(prefix6))
        } else {
            Err("malformed prefix".to_string())
        }
    }
}

/// The address family (protocol version) a prefix or defined set belongs
/// to.
#[derive(
    Clone,
    Copy,
    Eq,
    Debug,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum AddressFamily {
    /// Internet Protocol Version 4 (IPv4)
    Ipv4,
    /// Internet Protocol Version 6 (IPv6)
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// An (AFI, SAFI) pair identifying the route family a path belongs to.
///
/// The policy engine evaluates unicast routes; the enum leaves room for
/// additional families without changing the conditions that consume it.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum RouteFamily {
    Ipv4Unicast,
    Ipv6Unicast,
}

impl RouteFamily {
    pub fn afi(&self) -> AddressFamily {
        match self {
            RouteFamily::Ipv4Unicast => AddressFamily::Ipv4,
            RouteFamily::Ipv6Unicast => AddressFamily::Ipv6,
        }
    }
}

impl fmt::Display for RouteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteFamily::Ipv4Unicast => write!(f, "ipv4-unicast"),
            RouteFamily::Ipv6Unicast => write!(f, "ipv6-unicast"),
        }
    }
}

impl FromStr for RouteFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ipv4-unicast" => Ok(RouteFamily::Ipv4Unicast),
            "ipv6-unicast" => Ok(RouteFamily::Ipv6Unicast),
            _ => Err(format!("unknown route family {s}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_host_bits() {
        let p: Prefix4 = "10.1.2.3/16".parse().unwrap();
        assert!(!p.host_bits_are_unset());
        let p = Prefix4::new(p.value, p.length);
        assert_eq!(p.to_string(), "10.1.0.0/16");
        assert!(p.host_bits_are_unset());
    }

    #[test]
    fn prefix_within() {
        let outer: Prefix = "10.0.0.0/8".parse().unwrap();
        let inner: Prefix = "10.1.0.0/16".parse().unwrap();
        assert!(inner.within(&outer));
        assert!(!outer.within(&inner));
        assert!(outer.within(&outer));

        let v6: Prefix = "2001:db8::/32".parse().unwrap();
        assert!(!v6.within(&outer));

        let all: Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(outer.within(&all));
    }

    #[test]
    fn prefix_contains_addr() {
        let p: Prefix = "192.168.0.0/24".parse().unwrap();
        assert!(p.contains("192.168.0.77".parse().unwrap()));
        assert!(!p.contains("192.168.1.77".parse().unwrap()));
        assert!(!p.contains("::1".parse().unwrap()));
    }

    #[test]
    fn prefix_parse_rejects_garbage() {
        assert!("10.0.0.0".parse::<Prefix>().is_err());
        assert!("10.0.0.0/33".parse::<Prefix4>().is_err());
        assert!("fe80::/129".parse::<Prefix6>().is_err());
        assert!("bogus/8".parse::<Prefix>().is_err());
    }

    #[test]
    fn route_family_round_trip() {
        for rf in [RouteFamily::Ipv4Unicast, RouteFamily::Ipv6Unicast] {
            assert_eq!(rf.to_string().parse::<RouteFamily>().unwrap(), rf);
        }
    }
}
