// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The path-attribute model the policy engine evaluates and transforms.
//! Attributes are held decoded; wire encoding and decoding belong to the
//! session layer and are not done here.

use num_enum::TryFromPrimitive;
use policy_types::{Prefix, RouteFamily};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// BGP path attribute type codes.
///
/// Ref: RFC 4271 §5, RFC 1997, RFC 4360, RFC 4456, RFC 4760, RFC 6793,
/// RFC 8092.
#[derive(
    Debug, Eq, PartialEq, Hash, PartialOrd, Ord, TryFromPrimitive, Copy, Clone,
)]
#[repr(u8)]
pub enum PathAttrType {
    /// RFC 4271
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MultiExitDisc = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,

    /// RFC 1997
    Communities = 8,

    /// RFC 4456
    OriginatorId = 9,
    ClusterList = 10,

    /// RFC 4760
    MpReachNlri = 14,
    MpUnreachNlri = 15,

    /// RFC 4360
    ExtCommunities = 16,

    /// RFC 6793
    As4Path = 17,
    As4Aggregator = 18,

    /// RFC 8092
    LargeCommunities = 32,
}

/// Origin of the path information.
///
/// Ref: RFC 4271 §4.3
#[derive(
    Debug,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    TryFromPrimitive,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Igp => write!(f, "igp"),
            Origin::Egp => write!(f, "egp"),
            Origin::Incomplete => write!(f, "incomplete"),
        }
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "igp" => Ok(Origin::Igp),
            "egp" => Ok(Origin::Egp),
            "incomplete" => Ok(Origin::Incomplete),
            _ => Err(format!("unknown origin {s}")),
        }
    }
}

/// AS_PATH segment types.
///
/// Ref: RFC 4271 §4.3, RFC 5065 §3
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum AsSegmentType {
    Set = 1,
    Sequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

/// One segment of an AS_PATH attribute.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct AsSegment {
    pub typ: AsSegmentType,
    pub asns: Vec<u32>,
}

impl AsSegment {
    pub fn sequence(asns: Vec<u32>) -> Self {
        Self {
            typ: AsSegmentType::Sequence,
            asns,
        }
    }

    pub fn set(asns: Vec<u32>) -> Self {
        Self {
            typ: AsSegmentType::Set,
            asns,
        }
    }

    /// Number of ASes this segment contributes to the path length. A
    /// SEQUENCE counts each member, a SET counts as one, confederation
    /// segments count as zero.
    ///
    /// Ref: RFC 4271 §9.1.2.2(a), RFC 5065 §5.3
    pub fn path_len(&self) -> usize {
        match self.typ {
            AsSegmentType::Sequence => self.asns.len(),
            AsSegmentType::Set => 1,
            AsSegmentType::ConfedSequence | AsSegmentType::ConfedSet => 0,
        }
    }
}

impl fmt::Display for AsSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |sep: &str| {
            self.asns
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self.typ {
            AsSegmentType::Sequence => write!(f, "{}", join(" ")),
            AsSegmentType::Set => write!(f, "{{{}}}", join(",")),
            AsSegmentType::ConfedSequence => write!(f, "({})", join(" ")),
            AsSegmentType::ConfedSet => write!(f, "[{}]", join(",")),
        }
    }
}

/// A standard community value.
///
/// Ref: RFC 1997
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct Community(pub u32);

impl Community {
    /// RFC 8326
    pub const GRACEFUL_SHUTDOWN: Community = Community(0xffff_0000);
    /// RFC 7611
    pub const ACCEPT_OWN: Community = Community(0xffff_0001);
    /// RFC 9494
    pub const LLGR_STALE: Community = Community(0xffff_0006);
    /// RFC 9494
    pub const NO_LLGR: Community = Community(0xffff_0007);
    /// RFC 7999
    pub const BLACKHOLE: Community = Community(0xffff_029a);
    /// RFC 1997
    pub const NO_EXPORT: Community = Community(0xffff_ff01);
    /// RFC 1997
    pub const NO_ADVERTISE: Community = Community(0xffff_ff02);
    /// RFC 1997
    pub const NO_EXPORT_SUBCONFED: Community = Community(0xffff_ff03);
    /// RFC 3765
    pub const NO_PEER: Community = Community(0xffff_ff04);

    const WELL_KNOWN: [(Community, &'static str); 9] = [
        (Self::GRACEFUL_SHUTDOWN, "graceful-shutdown"),
        (Self::ACCEPT_OWN, "accept-own"),
        (Self::LLGR_STALE, "llgr-stale"),
        (Self::NO_LLGR, "no-llgr"),
        (Self::BLACKHOLE, "blackhole"),
        (Self::NO_EXPORT, "no-export"),
        (Self::NO_ADVERTISE, "no-advertise"),
        (Self::NO_EXPORT_SUBCONFED, "no-export-subconfed"),
        (Self::NO_PEER, "no-peer"),
    ];

    pub fn from_name(name: &str) -> Option<Community> {
        Self::WELL_KNOWN
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(c, _)| *c)
    }

    pub fn name(&self) -> Option<&'static str> {
        Self::WELL_KNOWN
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, n)| *n)
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0 >> 16, self.0 & 0xffff)
    }
}

impl From<u32> for Community {
    fn from(value: u32) -> Self {
        Community(value)
    }
}

/// Extended community type codes the engine constructs.
pub const EXT_TYPE_TWO_OCTET_AS: u8 = 0x00;
pub const EXT_TYPE_IPV4: u8 = 0x01;
pub const EXT_TYPE_FOUR_OCTET_AS: u8 = 0x02;
pub const EXT_TYPE_NON_TRANSITIVE_OPAQUE: u8 = 0x43;

/// Extended community subtypes.
///
/// Ref: RFC 4360 §4, RFC 6811
pub const EXT_SUBTYPE_ROUTE_TARGET: u8 = 0x02;
pub const EXT_SUBTYPE_ROUTE_ORIGIN: u8 = 0x03;
pub const EXT_SUBTYPE_ORIGIN_VALIDATION: u8 = 0x00;

/// The administrator-qualified value an extended community carries.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum ExtCommunityValue {
    TwoOctetAs { asn: u16, local: u32 },
    FourOctetAs { asn: u32, local: u16 },
    Ipv4 { addr: Ipv4Addr, local: u16 },
    Opaque(u64),
}

/// An extended community.
///
/// Ref: RFC 4360
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExtCommunity {
    pub typ: u8,
    pub subtype: u8,
    pub value: ExtCommunityValue,
}

impl ExtCommunity {
    pub fn route_target(value: ExtCommunityValue) -> Self {
        Self {
            typ: Self::type_for(&value),
            subtype: EXT_SUBTYPE_ROUTE_TARGET,
            value,
        }
    }

    pub fn route_origin(value: ExtCommunityValue) -> Self {
        Self {
            typ: Self::type_for(&value),
            subtype: EXT_SUBTYPE_ROUTE_ORIGIN,
            value,
        }
    }

    /// The origin-validation state community defined by RFC 8097.
    pub fn origin_validation(state: ValidationStatus) -> Self {
        let b = match state {
            ValidationStatus::Valid => 0,
            ValidationStatus::NotFound => 1,
            ValidationStatus::Invalid => 2,
            ValidationStatus::None => 0xff,
        };
        Self {
            typ: EXT_TYPE_NON_TRANSITIVE_OPAQUE,
            subtype: EXT_SUBTYPE_ORIGIN_VALIDATION,
            value: ExtCommunityValue::Opaque(b),
        }
    }

    fn type_for(value: &ExtCommunityValue) -> u8 {
        match value {
            ExtCommunityValue::TwoOctetAs { .. } => EXT_TYPE_TWO_OCTET_AS,
            ExtCommunityValue::FourOctetAs { .. } => EXT_TYPE_FOUR_OCTET_AS,
            ExtCommunityValue::Ipv4 { .. } => EXT_TYPE_IPV4,
            ExtCommunityValue::Opaque(_) => EXT_TYPE_NON_TRANSITIVE_OPAQUE,
        }
    }

    /// Communities with a type code of 0x3f or above do not cross AS
    /// boundaries and are skipped by match conditions.
    ///
    /// Ref: RFC 7153 §3
    pub fn is_transitive(&self) -> bool {
        self.typ < 0x3f
    }

    pub fn validation_state(&self) -> Option<ValidationStatus> {
        if self.typ != EXT_TYPE_NON_TRANSITIVE_OPAQUE
            || self.subtype != EXT_SUBTYPE_ORIGIN_VALIDATION
        {
            return None;
        }
        match self.value {
            ExtCommunityValue::Opaque(0) => Some(ValidationStatus::Valid),
            ExtCommunityValue::Opaque(1) => Some(ValidationStatus::NotFound),
            ExtCommunityValue::Opaque(2) => Some(ValidationStatus::Invalid),
            _ => Some(ValidationStatus::None),
        }
    }
}

impl fmt::Display for ExtCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(state) = self.validation_state() {
            return write!(f, "{state}");
        }
        match self.value {
            ExtCommunityValue::TwoOctetAs { asn, local } => {
                write!(f, "{asn}:{local}")
            }
            ExtCommunityValue::FourOctetAs { asn, local } => {
                write!(f, "{asn}:{local}")
            }
            ExtCommunityValue::Ipv4 { addr, local } => {
                write!(f, "{addr}:{local}")
            }
            ExtCommunityValue::Opaque(v) => write!(f, "{v}"),
        }
    }
}

/// A large community value.
///
/// Ref: RFC 8092
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct LargeCommunity {
    pub global_admin: u32,
    pub local_data1: u32,
    pub local_data2: u32,
}

impl fmt::Display for LargeCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.global_admin, self.local_data1, self.local_data2
        )
    }
}

impl FromStr for LargeCommunity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(format!("invalid large community {s}"));
        }
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| format!("invalid large community {s}"))
        };
        Ok(LargeCommunity {
            global_admin: parse(parts[0])?,
            local_data1: parse(parts[1])?,
            local_data2: parse(parts[2])?,
        })
    }
}

/// Network layer reachability information: the prefix a path advertises.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct Nlri {
    pub prefix: Prefix,
}

impl Nlri {
    pub fn new(prefix: Prefix) -> Self {
        Self { prefix }
    }

    pub fn route_family(&self) -> RouteFamily {
        match self.prefix {
            Prefix::V4(_) => RouteFamily::Ipv4Unicast,
            Prefix::V6(_) => RouteFamily::Ipv6Unicast,
        }
    }
}

impl fmt::Display for Nlri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.prefix.fmt(f)
    }
}

/// A decoded path attribute. One variant per attribute the policy layer
/// reads or writes.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum PathAttr {
    Origin(Origin),
    AsPath(Vec<AsSegment>),
    NextHop(IpAddr),
    Med(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator { asn: u32, address: Ipv4Addr },
    Communities(Vec<Community>),
    OriginatorId(Ipv4Addr),
    ClusterList(Vec<Ipv4Addr>),
    MpReachNlri { nexthop: IpAddr, nlri: Vec<Nlri> },
    MpUnreachNlri { nlri: Vec<Nlri> },
    ExtCommunities(Vec<ExtCommunity>),
    As4Path(Vec<AsSegment>),
    LargeCommunities(Vec<LargeCommunity>),
}

impl PathAttr {
    pub fn type_code(&self) -> PathAttrType {
        match self {
            PathAttr::Origin(_) => PathAttrType::Origin,
            PathAttr::AsPath(_) => PathAttrType::AsPath,
            PathAttr::NextHop(_) => PathAttrType::NextHop,
            PathAttr::Med(_) => PathAttrType::MultiExitDisc,
            PathAttr::LocalPref(_) => PathAttrType::LocalPref,
            PathAttr::AtomicAggregate => PathAttrType::AtomicAggregate,
            PathAttr::Aggregator { .. } => PathAttrType::Aggregator,
            PathAttr::Communities(_) => PathAttrType::Communities,
            PathAttr::OriginatorId(_) => PathAttrType::OriginatorId,
            PathAttr::ClusterList(_) => PathAttrType::ClusterList,
            PathAttr::MpReachNlri { .. } => PathAttrType::MpReachNlri,
            PathAttr::MpUnreachNlri { .. } => PathAttrType::MpUnreachNlri,
            PathAttr::ExtCommunities(_) => PathAttrType::ExtCommunities,
            PathAttr::As4Path(_) => PathAttrType::As4Path,
            PathAttr::LargeCommunities(_) => PathAttrType::LargeCommunities,
        }
    }
}

/// Verdict from an external origin-validation source.
///
/// Ref: RFC 6811
#[derive(
    Debug,
    Eq,
    PartialEq,
    Hash,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    None,
    NotFound,
    Valid,
    Invalid,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::None => write!(f, "none"),
            ValidationStatus::NotFound => write!(f, "not-found"),
            ValidationStatus::Valid => write!(f, "valid"),
            ValidationStatus::Invalid => write!(f, "invalid"),
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ValidationStatus::None),
            "not-found" => Ok(ValidationStatus::NotFound),
            "valid" => Ok(ValidationStatus::Valid),
            "invalid" => Ok(ValidationStatus::Invalid),
            _ => Err(format!("unknown validation status {s}")),
        }
    }
}

/// Why a validation verdict came out the way it did.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum ValidationReason {
    #[default]
    None,
    As,
    Length,
}

/// The result of invoking the host's origin-validation callback.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Validation {
    pub status: ValidationStatus,
    pub reason: ValidationReason,
}

impl Validation {
    pub fn new(status: ValidationStatus) -> Self {
        Self {
            status,
            reason: ValidationReason::None,
        }
    }
}
