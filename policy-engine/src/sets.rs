// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Defined sets: the named, typed collections conditions match against,
//! with add/remove/replace algebra and the parsers that compile their
//! textual members.

use crate::attrs::{
    Community, ExtCommunity, ExtCommunityValue, ValidationStatus,
    EXT_SUBTYPE_ORIGIN_VALIDATION, EXT_SUBTYPE_ROUTE_ORIGIN,
    EXT_SUBTYPE_ROUTE_TARGET,
};
use crate::config::{
    AsPathSetConfig, CommunitySetConfig, ExtCommunitySetConfig,
    LargeCommunitySetConfig, NeighborSetConfig, PrefixConfig, PrefixSetConfig,
    TagSetConfig,
};
use crate::error::Error;
use itertools::Itertools;
use lazy_static::lazy_static;
use patricia_tree::PatriciaMap;
use policy_types::{AddressFamily, Prefix};
use regex::Regex;
use std::fmt;
use std::net::IpAddr;

/// Inserted in place of every `_` in an AS-path pattern so it matches any
/// boundary the canonical AS-path string can produce.
pub const ASPATH_REGEXP_MAGIC: &str = "(^|[,{}() ]|$)";

lazy_static! {
    static ref MASK_RANGE_RE: Regex =
        Regex::new(r"^(\d+)\.\.(\d+)$").unwrap();
    static ref LEFT_MOST_RE: Regex = Regex::new(r"^\^([0-9]+)_$").unwrap();
    static ref ORIGIN_RE: Regex = Regex::new(r"^_([0-9]+)\$$").unwrap();
    static ref INCLUDE_RE: Regex = Regex::new("^_([0-9]+)_$").unwrap();
    static ref ONLY_RE: Regex = Regex::new(r"^\^([0-9]+)\$$").unwrap();
    static ref COMMUNITY_RE: Regex = Regex::new(r"^(\d+):(\d+)$").unwrap();
    static ref COMMUNITY_SHAPE_RE: Regex =
        Regex::new(r"^(\d+.)*\d+:\d+$").unwrap();
    static ref LARGE_COMMUNITY_SHAPE_RE: Regex =
        Regex::new(r"^\d+:\d+:\d+$").unwrap();
}

/// The variants a [`DefinedSet`] can take.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DefinedSetKind {
    Prefix,
    Neighbor,
    Tag,
    AsPath,
    Community,
    ExtCommunity,
    LargeCommunity,
    NextHop,
}

impl fmt::Display for DefinedSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinedSetKind::Prefix => write!(f, "prefix"),
            DefinedSetKind::Neighbor => write!(f, "neighbor"),
            DefinedSetKind::Tag => write!(f, "tag"),
            DefinedSetKind::AsPath => write!(f, "as-path"),
            DefinedSetKind::Community => write!(f, "community"),
            DefinedSetKind::ExtCommunity => write!(f, "ext-community"),
            DefinedSetKind::LargeCommunity => write!(f, "large-community"),
            DefinedSetKind::NextHop => write!(f, "next-hop"),
        }
    }
}

/// One prefix rule inside a prefix set: a network plus the range of mask
/// lengths it admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefix: Prefix,
    pub min_length: u8,
    pub max_length: u8,
}

impl PrefixRule {
    pub fn from_config(c: &PrefixConfig) -> Result<PrefixRule, Error> {
        let prefix: Prefix = c
            .ip_prefix
            .parse()
            .map_err(|_| Error::InvalidPrefix(c.ip_prefix.clone()))?;
        let (min_length, max_length) = if c.masklength_range.is_empty() {
            (prefix.length(), prefix.length())
        } else {
            let caps =
                MASK_RANGE_RE.captures(&c.masklength_range).ok_or_else(
                    || Error::InvalidMaskRange(c.masklength_range.clone()),
                )?;
            let parse = |m: &str| {
                m.parse::<u8>().map_err(|_| {
                    Error::InvalidMaskRange(c.masklength_range.clone())
                })
            };
            (parse(&caps[1])?, parse(&caps[2])?)
        };
        if min_length > max_length || max_length > prefix.max_length() {
            return Err(Error::InvalidMaskRange(c.masklength_range.clone()));
        }
        Ok(PrefixRule {
            prefix,
            min_length,
            max_length,
        })
    }

    pub fn matches_length(&self, masklen: u8) -> bool {
        self.min_length <= masklen && masklen <= self.max_length
    }

    pub fn to_config(&self) -> PrefixConfig {
        PrefixConfig {
            ip_prefix: self.prefix.to_string(),
            masklength_range: format!(
                "{}..{}",
                self.min_length, self.max_length
            ),
        }
    }
}

impl fmt::Display for PrefixRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}..{}", self.prefix, self.min_length, self.max_length)
    }
}

/// The bit string a prefix occupies in the radix tree, one byte per bit.
fn bit_key(prefix: &Prefix) -> Vec<u8> {
    let (bits, len) = match prefix {
        Prefix::V4(p) => ((p.value.to_bits() as u128) << 96, p.length),
        Prefix::V6(p) => (p.value.to_bits(), p.length),
    };
    (0..len as u32).map(|i| ((bits >> (127 - i)) & 1) as u8).collect()
}

/// A named set of prefix rules held in a radix tree keyed by network, so
/// conditions can longest-prefix match an NLRI against it. All members of
/// one set share a single address family.
#[derive(Clone, Default)]
pub struct PrefixSet {
    name: String,
    tree: PatriciaMap<Vec<PrefixRule>>,
    family: Option<AddressFamily>,
}

impl PrefixSet {
    pub fn new(name: String, rules: Vec<PrefixRule>) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        let mut set = PrefixSet {
            name,
            tree: PatriciaMap::new(),
            family: None,
        };
        for rule in rules {
            set.insert(rule)?;
        }
        Ok(set)
    }

    pub fn from_config(c: &PrefixSetConfig) -> Result<Self, Error> {
        let rules = c
            .prefix_list
            .iter()
            .map(PrefixRule::from_config)
            .collect::<Result<Vec<_>, Error>>()?;
        Self::new(c.prefix_set_name.clone(), rules)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.family
    }

    fn insert(&mut self, rule: PrefixRule) -> Result<(), Error> {
        match self.family {
            Some(family) if family != rule.prefix.family() => {
                return Err(Error::FamilyMismatch)
            }
            _ => self.family = Some(rule.prefix.family()),
        }
        let key = bit_key(&rule.prefix);
        match self.tree.get_mut(&key) {
            Some(rules) => rules.push(rule),
            None => {
                self.tree.insert(key, vec![rule]);
            }
        }
        Ok(())
    }

    /// The rules at the longest tree entry covering `prefix`, if any.
    pub fn longest_match(&self, prefix: &Prefix) -> Option<Vec<PrefixRule>> {
        let key = bit_key(prefix);
        self.tree
            .get_longest_common_prefix(key.as_slice())
            .map(|(_, rules)| rules.clone())
    }

    /// Merge another prefix set into this one. Rule lists concatenate per
    /// network; an empty right-hand side is a no-op; mixed families fail.
    pub fn append(&mut self, rhs: &PrefixSet) -> Result<(), Error> {
        if rhs.tree.is_empty() {
            return Ok(());
        }
        if !self.tree.is_empty() && rhs.family != self.family {
            return Err(Error::FamilyMismatch);
        }
        for (key, rules) in rhs.tree.iter() {
            match self.tree.get_mut(&key) {
                Some(mine) => mine.extend(rules.iter().copied()),
                None => {
                    self.tree.insert(key, rules.clone());
                }
            }
        }
        self.family = rhs.family;
        Ok(())
    }

    /// Drop every rule equal to a right-hand-side rule on (network, min,
    /// max); networks whose rule lists empty out leave the tree.
    pub fn remove(&mut self, rhs: &PrefixSet) {
        for (key, rules) in rhs.tree.iter() {
            let Some(mine) = self.tree.get_mut(&key) else {
                continue;
            };
            mine.retain(|rule| !rules.contains(rule));
            if mine.is_empty() {
                self.tree.remove(&key);
            }
        }
    }

    /// Swap in another set's tree and family wholesale.
    pub fn replace(&mut self, rhs: PrefixSet) {
        self.tree = rhs.tree;
        self.family = rhs.family;
    }

    pub fn rules(&self) -> Vec<PrefixRule> {
        self.tree.values().flatten().copied().collect()
    }

    pub fn list(&self) -> Vec<String> {
        self.rules().iter().map(|r| r.to_string()).collect()
    }

    pub fn to_config(&self) -> PrefixSetConfig {
        PrefixSetConfig {
            prefix_set_name: self.name.clone(),
            prefix_list: self.rules().iter().map(|r| r.to_config()).collect(),
        }
    }
}

impl fmt::Debug for PrefixSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixSet")
            .field("name", &self.name)
            .field("rules", &self.rules())
            .finish()
    }
}

impl fmt::Display for PrefixSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

fn parse_ip_or_prefix(s: &str) -> Result<Prefix, Error> {
    if let Ok(prefix) = s.parse::<Prefix>() {
        return Ok(prefix);
    }
    match s.parse::<IpAddr>() {
        Ok(addr) => {
            let len = match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            Ok(Prefix::new(addr, len))
        }
        Err(_) => Err(Error::InvalidPrefix(s.to_string())),
    }
}

fn network_difference(lhs: &mut Vec<Prefix>, rhs: &[Prefix]) {
    lhs.retain(|x| {
        !rhs.iter().any(|y| x.to_string() == y.to_string())
    });
}

/// A named list of networks matched against the peer a path came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborSet {
    name: String,
    pub list: Vec<Prefix>,
}

impl NeighborSet {
    pub fn new(name: String, list: Vec<Prefix>) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        Ok(NeighborSet { name, list })
    }

    pub fn from_config(c: &NeighborSetConfig) -> Result<Self, Error> {
        let list = c
            .neighbor_info_list
            .iter()
            .map(|s| parse_ip_or_prefix(s))
            .collect::<Result<Vec<_>, Error>>()?;
        Self::new(c.neighbor_set_name.clone(), list)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.list.iter().any(|n| n.contains(addr))
    }

    pub fn append(&mut self, rhs: &NeighborSet) {
        self.list.extend_from_slice(&rhs.list);
    }

    pub fn remove(&mut self, rhs: &NeighborSet) {
        network_difference(&mut self.list, &rhs.list);
    }

    pub fn replace(&mut self, rhs: NeighborSet) {
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        self.list.iter().map(|n| n.to_string()).collect()
    }

    pub fn to_config(&self) -> NeighborSetConfig {
        NeighborSetConfig {
            neighbor_set_name: self.name.clone(),
            neighbor_info_list: self.list(),
        }
    }
}

impl fmt::Display for NeighborSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// Networks a nexthop condition matches against. Unlike the other sets a
/// next-hop set has no name of its own; it is inlined into conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextHopSet {
    pub list: Vec<Prefix>,
}

impl NextHopSet {
    pub fn new(list: Vec<Prefix>) -> Self {
        NextHopSet { list }
    }

    pub fn from_list(items: &[String]) -> Result<Self, Error> {
        let list = items
            .iter()
            .map(|s| parse_ip_or_prefix(s))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self::new(list))
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.list.iter().any(|n| n.contains(addr))
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn append(&mut self, rhs: &NextHopSet) {
        self.list.extend_from_slice(&rhs.list);
    }

    pub fn remove(&mut self, rhs: &NextHopSet) {
        network_difference(&mut self.list, &rhs.list);
    }

    pub fn replace(&mut self, rhs: NextHopSet) {
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        self.list.iter().map(|n| n.to_string()).collect()
    }
}

impl fmt::Display for NextHopSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {} ]", self.list().iter().join(", "))
    }
}

/// A named list of opaque tags, carried for configuration fidelity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    name: String,
    pub list: Vec<String>,
}

impl TagSet {
    pub fn new(name: String, list: Vec<String>) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        Ok(TagSet { name, list })
    }

    pub fn from_config(c: &TagSetConfig) -> Result<Self, Error> {
        Self::new(
            c.tag_set_name.clone(),
            c.tag_list.iter().map(|t| t.value.clone()).collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, rhs: &TagSet) {
        self.list.extend_from_slice(&rhs.list);
    }

    pub fn remove(&mut self, rhs: &TagSet) {
        self.list.retain(|x| !rhs.list.contains(x));
    }

    pub fn replace(&mut self, rhs: TagSet) {
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        self.list.clone()
    }

    pub fn to_config(&self) -> TagSetConfig {
        TagSetConfig {
            tag_set_name: self.name.clone(),
            tag_list: self
                .list
                .iter()
                .map(|v| crate::config::TagConfig { value: v.clone() })
                .collect(),
        }
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list.iter().join("\n"))
    }
}

/// The four single-AS pattern forms, recognized from their regex
/// spellings. Matching a decoded AS sequence directly is both faster and
/// more precise than running the equivalent regex over the path string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleAsPathMatch {
    /// `_N_`
    Include(u32),
    /// `^N_`
    LeftMost(u32),
    /// `_N$`
    Origin(u32),
    /// `^N$`
    Only(u32),
}

impl SingleAsPathMatch {
    pub fn new(pattern: &str) -> Option<Self> {
        let capture = |re: &Regex| {
            re.captures(pattern)
                .and_then(|c| c[1].parse::<u32>().ok())
        };
        if let Some(asn) = capture(&LEFT_MOST_RE) {
            Some(SingleAsPathMatch::LeftMost(asn))
        } else if let Some(asn) = capture(&ORIGIN_RE) {
            Some(SingleAsPathMatch::Origin(asn))
        } else if let Some(asn) = capture(&INCLUDE_RE) {
            Some(SingleAsPathMatch::Include(asn))
        } else {
            capture(&ONLY_RE).map(SingleAsPathMatch::Only)
        }
    }

    pub fn matches(&self, aspath: &[u32]) -> bool {
        if aspath.is_empty() {
            return false;
        }
        match self {
            SingleAsPathMatch::Include(asn) => aspath.contains(asn),
            SingleAsPathMatch::LeftMost(asn) => aspath[0] == *asn,
            SingleAsPathMatch::Origin(asn) => {
                aspath[aspath.len() - 1] == *asn
            }
            SingleAsPathMatch::Only(asn) => {
                aspath.len() == 1 && aspath[0] == *asn
            }
        }
    }
}

impl fmt::Display for SingleAsPathMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SingleAsPathMatch::Include(asn) => write!(f, "_{asn}_"),
            SingleAsPathMatch::LeftMost(asn) => write!(f, "^{asn}_"),
            SingleAsPathMatch::Origin(asn) => write!(f, "_{asn}$"),
            SingleAsPathMatch::Only(asn) => write!(f, "^{asn}$"),
        }
    }
}

fn regex_union(lhs: &mut Vec<Regex>, rhs: &[Regex]) {
    lhs.extend(rhs.iter().cloned());
}

fn regex_difference(lhs: &mut Vec<Regex>, rhs: &[Regex]) {
    lhs.retain(|x| !rhs.iter().any(|y| x.as_str() == y.as_str()));
}

/// A named AS-path set: single-AS matchers evaluated against the decoded
/// AS sequence, and general regexes evaluated against the canonical
/// AS-path string.
#[derive(Debug, Clone, Default)]
pub struct AsPathSet {
    name: String,
    pub single_list: Vec<SingleAsPathMatch>,
    pub list: Vec<Regex>,
}

impl AsPathSet {
    pub fn new(name: String, patterns: &[String]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        let mut single_list = Vec::new();
        let mut list = Vec::new();
        for pattern in patterns {
            match SingleAsPathMatch::new(pattern) {
                Some(single) => single_list.push(single),
                None => {
                    let expanded =
                        pattern.replace('_', ASPATH_REGEXP_MAGIC);
                    list.push(Regex::new(&expanded).map_err(|_| {
                        Error::InvalidRegex(pattern.clone())
                    })?);
                }
            }
        }
        Ok(AsPathSet {
            name,
            single_list,
            list,
        })
    }

    pub fn from_config(c: &AsPathSetConfig) -> Result<Self, Error> {
        Self::new(c.as_path_set_name.clone(), &c.as_path_list)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, rhs: &AsPathSet) {
        self.single_list.extend_from_slice(&rhs.single_list);
        regex_union(&mut self.list, &rhs.list);
    }

    pub fn remove(&mut self, rhs: &AsPathSet) {
        self.single_list.retain(|x| !rhs.single_list.contains(x));
        regex_difference(&mut self.list, &rhs.list);
    }

    pub fn replace(&mut self, rhs: AsPathSet) {
        self.single_list = rhs.single_list;
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        let mut list: Vec<String> =
            self.single_list.iter().map(|s| s.to_string()).collect();
        list.extend(self.list.iter().map(|r| r.to_string()));
        list
    }

    pub fn to_config(&self) -> AsPathSetConfig {
        AsPathSetConfig {
            as_path_set_name: self.name.clone(),
            as_path_list: self.list(),
        }
    }
}

impl fmt::Display for AsPathSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// A named set of community patterns.
#[derive(Debug, Clone, Default)]
pub struct CommunitySet {
    name: String,
    pub list: Vec<Regex>,
}

impl CommunitySet {
    pub fn new(name: String, members: &[String]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        let list = members
            .iter()
            .map(|m| parse_community_regexp(m))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(CommunitySet { name, list })
    }

    pub fn from_config(c: &CommunitySetConfig) -> Result<Self, Error> {
        Self::new(c.community_set_name.clone(), &c.community_list)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, rhs: &CommunitySet) {
        regex_union(&mut self.list, &rhs.list);
    }

    pub fn remove(&mut self, rhs: &CommunitySet) {
        regex_difference(&mut self.list, &rhs.list);
    }

    pub fn replace(&mut self, rhs: CommunitySet) {
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        self.list.iter().map(|r| r.to_string()).collect()
    }

    pub fn to_config(&self) -> CommunitySetConfig {
        CommunitySetConfig {
            community_set_name: self.name.clone(),
            community_list: self.list(),
        }
    }
}

impl fmt::Display for CommunitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// A named set of extended-community patterns. Each pattern carries its
/// subtype so matches only occur within the same subtype.
#[derive(Debug, Clone, Default)]
pub struct ExtCommunitySet {
    name: String,
    pub list: Vec<Regex>,
    pub subtypes: Vec<u8>,
}

impl ExtCommunitySet {
    pub fn new(name: String, members: &[String]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        let mut list = Vec::new();
        let mut subtypes = Vec::new();
        for m in members {
            let (subtype, re) = parse_ext_community_regexp(m)?;
            list.push(re);
            subtypes.push(subtype);
        }
        Ok(ExtCommunitySet {
            name,
            list,
            subtypes,
        })
    }

    pub fn from_config(c: &ExtCommunitySetConfig) -> Result<Self, Error> {
        Self::new(c.ext_community_set_name.clone(), &c.ext_community_list)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, rhs: &ExtCommunitySet) {
        regex_union(&mut self.list, &rhs.list);
        self.subtypes.extend_from_slice(&rhs.subtypes);
    }

    pub fn remove(&mut self, rhs: &ExtCommunitySet) {
        let mut kept_list = Vec::with_capacity(self.list.len());
        let mut kept_subtypes = Vec::with_capacity(self.subtypes.len());
        for (re, subtype) in self.list.iter().zip(self.subtypes.iter()) {
            let found = rhs
                .list
                .iter()
                .zip(rhs.subtypes.iter())
                .any(|(r, s)| r.as_str() == re.as_str() && s == subtype);
            if !found {
                kept_list.push(re.clone());
                kept_subtypes.push(*subtype);
            }
        }
        self.list = kept_list;
        self.subtypes = kept_subtypes;
    }

    pub fn replace(&mut self, rhs: ExtCommunitySet) {
        self.list = rhs.list;
        self.subtypes = rhs.subtypes;
    }

    pub fn list(&self) -> Vec<String> {
        self.list
            .iter()
            .zip(self.subtypes.iter())
            .map(|(re, subtype)| match *subtype {
                EXT_SUBTYPE_ROUTE_TARGET => format!("rt:{re}"),
                EXT_SUBTYPE_ROUTE_ORIGIN => format!("soo:{re}"),
                EXT_SUBTYPE_ORIGIN_VALIDATION => re.to_string(),
                other => format!("{other}:{re}"),
            })
            .collect()
    }

    pub fn to_config(&self) -> ExtCommunitySetConfig {
        ExtCommunitySetConfig {
            ext_community_set_name: self.name.clone(),
            ext_community_list: self.list(),
        }
    }
}

impl fmt::Display for ExtCommunitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// A named set of large-community patterns.
#[derive(Debug, Clone, Default)]
pub struct LargeCommunitySet {
    name: String,
    pub list: Vec<Regex>,
}

impl LargeCommunitySet {
    pub fn new(name: String, members: &[String]) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::EmptySetName);
        }
        let list = members
            .iter()
            .map(|m| parse_large_community_regexp(m))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(LargeCommunitySet { name, list })
    }

    pub fn from_config(c: &LargeCommunitySetConfig) -> Result<Self, Error> {
        Self::new(
            c.large_community_set_name.clone(),
            &c.large_community_list,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, rhs: &LargeCommunitySet) {
        regex_union(&mut self.list, &rhs.list);
    }

    pub fn remove(&mut self, rhs: &LargeCommunitySet) {
        regex_difference(&mut self.list, &rhs.list);
    }

    pub fn replace(&mut self, rhs: LargeCommunitySet) {
        self.list = rhs.list;
    }

    pub fn list(&self) -> Vec<String> {
        self.list.iter().map(|r| r.to_string()).collect()
    }

    pub fn to_config(&self) -> LargeCommunitySetConfig {
        LargeCommunitySetConfig {
            large_community_set_name: self.name.clone(),
            large_community_list: self.list(),
        }
    }
}

impl fmt::Display for LargeCommunitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// The polymorphic defined-set value. Set-to-set operations require both
/// sides to be the same variant.
#[derive(Debug, Clone)]
pub enum DefinedSet {
    Prefix(PrefixSet),
    Neighbor(NeighborSet),
    Tag(TagSet),
    AsPath(AsPathSet),
    Community(CommunitySet),
    ExtCommunity(ExtCommunitySet),
    LargeCommunity(LargeCommunitySet),
    NextHop(NextHopSet),
}

impl DefinedSet {
    pub fn kind(&self) -> DefinedSetKind {
        match self {
            DefinedSet::Prefix(_) => DefinedSetKind::Prefix,
            DefinedSet::Neighbor(_) => DefinedSetKind::Neighbor,
            DefinedSet::Tag(_) => DefinedSetKind::Tag,
            DefinedSet::AsPath(_) => DefinedSetKind::AsPath,
            DefinedSet::Community(_) => DefinedSetKind::Community,
            DefinedSet::ExtCommunity(_) => DefinedSetKind::ExtCommunity,
            DefinedSet::LargeCommunity(_) => DefinedSetKind::LargeCommunity,
            DefinedSet::NextHop(_) => DefinedSetKind::NextHop,
        }
    }

    /// The set's name. Next-hop sets are anonymous and report an empty
    /// name.
    pub fn name(&self) -> &str {
        match self {
            DefinedSet::Prefix(s) => s.name(),
            DefinedSet::Neighbor(s) => s.name(),
            DefinedSet::Tag(s) => s.name(),
            DefinedSet::AsPath(s) => s.name(),
            DefinedSet::Community(s) => s.name(),
            DefinedSet::ExtCommunity(s) => s.name(),
            DefinedSet::LargeCommunity(s) => s.name(),
            DefinedSet::NextHop(_) => "",
        }
    }

    fn mismatch(&self, other: &DefinedSet) -> Error {
        Error::SetTypeMismatch {
            expected: self.kind(),
            found: other.kind(),
        }
    }

    pub fn append(&mut self, other: &DefinedSet) -> Result<(), Error> {
        match (&mut *self, other) {
            (DefinedSet::Prefix(a), DefinedSet::Prefix(b)) => a.append(b),
            (DefinedSet::Neighbor(a), DefinedSet::Neighbor(b)) => {
                a.append(b);
                Ok(())
            }
            (DefinedSet::Tag(a), DefinedSet::Tag(b)) => {
                a.append(b);
                Ok(())
            }
            (DefinedSet::AsPath(a), DefinedSet::AsPath(b)) => {
                a.append(b);
                Ok(())
            }
            (DefinedSet::Community(a), DefinedSet::Community(b)) => {
                a.append(b);
                Ok(())
            }
            (DefinedSet::ExtCommunity(a), DefinedSet::ExtCommunity(b)) => {
                a.append(b);
                Ok(())
            }
            (
                DefinedSet::LargeCommunity(a),
                DefinedSet::LargeCommunity(b),
            ) => {
                a.append(b);
                Ok(())
            }
            (DefinedSet::NextHop(a), DefinedSet::NextHop(b)) => {
                a.append(b);
                Ok(())
            }
            (a, b) => Err(a.mismatch(b)),
        }
    }

    pub fn remove(&mut self, other: &DefinedSet) -> Result<(), Error> {
        match (&mut *self, other) {
            (DefinedSet::Prefix(a), DefinedSet::Prefix(b)) => a.remove(b),
            (DefinedSet::Neighbor(a), DefinedSet::Neighbor(b)) => a.remove(b),
            (DefinedSet::Tag(a), DefinedSet::Tag(b)) => a.remove(b),
            (DefinedSet::AsPath(a), DefinedSet::AsPath(b)) => a.remove(b),
            (DefinedSet::Community(a), DefinedSet::Community(b)) => {
                a.remove(b)
            }
            (DefinedSet::ExtCommunity(a), DefinedSet::ExtCommunity(b)) => {
                a.remove(b)
            }
            (
                DefinedSet::LargeCommunity(a),
                DefinedSet::LargeCommunity(b),
            ) => a.remove(b),
            (DefinedSet::NextHop(a), DefinedSet::NextHop(b)) => a.remove(b),
            (a, b) => return Err(a.mismatch(b)),
        }
        Ok(())
    }

    pub fn replace(&mut self, other: DefinedSet) -> Result<(), Error> {
        match (&mut *self, other) {
            (DefinedSet::Prefix(a), DefinedSet::Prefix(b)) => a.replace(b),
            (DefinedSet::Neighbor(a), DefinedSet::Neighbor(b)) => {
                a.replace(b)
            }
            (DefinedSet::Tag(a), DefinedSet::Tag(b)) => a.replace(b),
            (DefinedSet::AsPath(a), DefinedSet::AsPath(b)) => a.replace(b),
            (DefinedSet::Community(a), DefinedSet::Community(b)) => {
                a.replace(b)
            }
            (DefinedSet::ExtCommunity(a), DefinedSet::ExtCommunity(b)) => {
                a.replace(b)
            }
            (
                DefinedSet::LargeCommunity(a),
                DefinedSet::LargeCommunity(b),
            ) => a.replace(b),
            (DefinedSet::NextHop(a), DefinedSet::NextHop(b)) => a.replace(b),
            (a, ref b) => return Err(a.mismatch(b)),
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        match self {
            DefinedSet::Prefix(s) => s.list(),
            DefinedSet::Neighbor(s) => s.list(),
            DefinedSet::Tag(s) => s.list(),
            DefinedSet::AsPath(s) => s.list(),
            DefinedSet::Community(s) => s.list(),
            DefinedSet::ExtCommunity(s) => s.list(),
            DefinedSet::LargeCommunity(s) => s.list(),
            DefinedSet::NextHop(s) => s.list(),
        }
    }
}

impl fmt::Display for DefinedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.list().iter().join("\n"))
    }
}

/// Parse a community: a bare u32, `N:M` with 16-bit halves, or a
/// well-known name.
pub fn parse_community(arg: &str) -> Result<Community, Error> {
    if let Ok(v) = arg.parse::<u32>() {
        return Ok(Community(v));
    }
    if let Some(caps) = COMMUNITY_RE.captures(arg) {
        let hi = caps[1]
            .parse::<u16>()
            .map_err(|_| Error::InvalidCommunity(arg.to_string()))?;
        let lo = caps[2]
            .parse::<u16>()
            .map_err(|_| Error::InvalidCommunity(arg.to_string()))?;
        return Ok(Community(((hi as u32) << 16) | lo as u32));
    }
    Community::from_name(&arg.to_lowercase())
        .ok_or_else(|| Error::InvalidCommunity(arg.to_string()))
}

/// Compile a community pattern. Plain numbers and `N:M` shapes become
/// anchored literals, well-known names become their numeric form, and
/// anything else compiles as a raw regex.
pub fn parse_community_regexp(arg: &str) -> Result<Regex, Error> {
    let compile = |s: String| {
        Regex::new(&s).map_err(|_| Error::InvalidRegex(arg.to_string()))
    };
    if let Ok(v) = arg.parse::<u32>() {
        return compile(format!("^{}:{}$", v >> 16, v & 0xffff));
    }
    if COMMUNITY_SHAPE_RE.is_match(arg) {
        return compile(format!("^{arg}$"));
    }
    if let Some(c) =
        Community::from_name(&arg.to_lowercase().replace('_', "-"))
    {
        return compile(format!("^{c}$"));
    }
    compile(arg.to_string())
}

fn is_validation_state(s: &str) -> bool {
    matches!(s, "valid" | "not-found" | "invalid")
}

/// Parse an extended community: `rt:<value>`, `soo:<value>`, or a bare
/// origin-validation state. The administrator part of a value may be a
/// two-octet ASN, a four-octet ASN, or an IPv4 address.
pub fn parse_ext_community(arg: &str) -> Result<ExtCommunity, Error> {
    let lower = arg.to_lowercase();
    if is_validation_state(&lower) {
        let status = lower
            .parse::<ValidationStatus>()
            .map_err(|_| Error::InvalidExtCommunity(arg.to_string()))?;
        return Ok(ExtCommunity::origin_validation(status));
    }
    let err = || Error::InvalidExtCommunity(arg.to_string());
    let (head, value) = arg.split_once(':').ok_or_else(err)?;
    let make = match head.to_lowercase().as_str() {
        "rt" => ExtCommunity::route_target,
        "soo" => ExtCommunity::route_origin,
        _ => return Err(err()),
    };
    let (admin, local) = value.rsplit_once(':').ok_or_else(err)?;
    if let Ok(addr) = admin.parse::<std::net::Ipv4Addr>() {
        let local = local.parse::<u16>().map_err(|_| err())?;
        return Ok(make(ExtCommunityValue::Ipv4 { addr, local }));
    }
    if let Ok(asn) = admin.parse::<u16>() {
        let local = local.parse::<u32>().map_err(|_| err())?;
        return Ok(make(ExtCommunityValue::TwoOctetAs { asn, local }));
    }
    if let Ok(asn) = admin.parse::<u32>() {
        let local = local.parse::<u16>().map_err(|_| err())?;
        return Ok(make(ExtCommunityValue::FourOctetAs { asn, local }));
    }
    Err(err())
}

/// Compile an extended-community pattern into its subtype and value
/// regex.
pub fn parse_ext_community_regexp(arg: &str) -> Result<(u8, Regex), Error> {
    let lower = arg.to_lowercase();
    if is_validation_state(&lower) {
        let re = Regex::new(&format!("^{lower}$"))
            .map_err(|_| Error::InvalidRegex(arg.to_string()))?;
        return Ok((EXT_SUBTYPE_ORIGIN_VALIDATION, re));
    }
    match arg.split_once(':') {
        Some((head, rest)) => {
            let subtype = match head.to_lowercase().as_str() {
                "rt" => EXT_SUBTYPE_ROUTE_TARGET,
                "soo" => EXT_SUBTYPE_ROUTE_ORIGIN,
                _ => return Err(Error::InvalidExtCommunity(arg.to_string())),
            };
            Ok((subtype, parse_community_regexp(rest)?))
        }
        None => Err(Error::InvalidExtCommunity(arg.to_string())),
    }
}

/// Compile a large-community pattern. `N:N:N` shapes become anchored
/// literals, anything else compiles as a raw regex.
pub fn parse_large_community_regexp(arg: &str) -> Result<Regex, Error> {
    if LARGE_COMMUNITY_SHAPE_RE.is_match(arg) {
        Regex::new(&format!("^{arg}$"))
            .map_err(|_| Error::InvalidRegex(arg.to_string()))
    } else {
        Regex::new(arg)
            .map_err(|_| Error::InvalidLargeCommunity(arg.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefix_set(name: &str, entries: &[(&str, u8, u8)]) -> PrefixSet {
        let rules = entries
            .iter()
            .map(|(p, min, max)| PrefixRule {
                prefix: p.parse().unwrap(),
                min_length: *min,
                max_length: *max,
            })
            .collect();
        PrefixSet::new(name.to_string(), rules).unwrap()
    }

    #[test]
    fn prefix_set_longest_match() {
        let s = prefix_set(
            "ps1",
            &[("10.0.0.0/8", 8, 24), ("10.1.0.0/16", 24, 32)],
        );
        let rules = s
            .longest_match(&"10.1.2.0/24".parse().unwrap())
            .expect("match under 10.1.0.0/16");
        assert_eq!(rules[0].prefix, "10.1.0.0/16".parse().unwrap());

        let rules = s
            .longest_match(&"10.2.0.0/16".parse().unwrap())
            .expect("match under 10.0.0.0/8");
        assert_eq!(rules[0].prefix, "10.0.0.0/8".parse().unwrap());

        assert!(s.longest_match(&"192.168.0.0/16".parse().unwrap()).is_none());
    }

    #[test]
    fn prefix_set_family_enforcement() {
        let rules = vec![
            PrefixRule {
                prefix: "10.0.0.0/8".parse().unwrap(),
                min_length: 8,
                max_length: 24,
            },
            PrefixRule {
                prefix: "2001:db8::/32".parse().unwrap(),
                min_length: 32,
                max_length: 64,
            },
        ];
        assert!(PrefixSet::new("mixed".to_string(), rules).is_err());

        let mut v4 = prefix_set("v4", &[("10.0.0.0/8", 8, 24)]);
        let v6 = prefix_set("v6", &[("2001:db8::/32", 32, 64)]);
        assert!(v4.append(&v6).is_err());
    }

    #[test]
    fn prefix_set_algebra() {
        let mut s = prefix_set("s", &[("10.0.0.0/8", 8, 24)]);
        let t = prefix_set(
            "t",
            &[("10.0.0.0/8", 16, 24), ("172.16.0.0/12", 12, 24)],
        );

        s.append(&t).unwrap();
        let mut list = s.list();
        list.sort();
        assert_eq!(
            list,
            vec![
                "10.0.0.0/8 16..24",
                "10.0.0.0/8 8..24",
                "172.16.0.0/12 12..24",
            ]
        );

        s.remove(&t);
        assert_eq!(s.list(), vec!["10.0.0.0/8 8..24"]);

        // empty rhs append is a no-op
        let empty = PrefixSet::new("e".to_string(), vec![]).unwrap();
        s.append(&empty).unwrap();
        assert_eq!(s.list(), vec!["10.0.0.0/8 8..24"]);

        let u = prefix_set("u", &[("192.168.0.0/16", 16, 32)]);
        s.replace(u.clone());
        assert_eq!(s.list(), u.list());
    }

    #[test]
    fn mask_range_parse() {
        let c = PrefixConfig {
            ip_prefix: "10.0.0.0/8".to_string(),
            masklength_range: "8..24".to_string(),
        };
        let r = PrefixRule::from_config(&c).unwrap();
        assert_eq!((r.min_length, r.max_length), (8, 24));

        let exact = PrefixConfig {
            ip_prefix: "10.0.0.0/8".to_string(),
            masklength_range: String::new(),
        };
        let r = PrefixRule::from_config(&exact).unwrap();
        assert_eq!((r.min_length, r.max_length), (8, 8));

        for bad in ["24..8", "8..40", "8-24", "x..y"] {
            let c = PrefixConfig {
                ip_prefix: "10.0.0.0/8".to_string(),
                masklength_range: bad.to_string(),
            };
            assert!(PrefixRule::from_config(&c).is_err(), "{bad}");
        }
    }

    #[test]
    fn neighbor_set_contains() {
        let s = NeighborSet::new(
            "ns".to_string(),
            vec![
                "192.168.0.0/24".parse().unwrap(),
                "203.0.113.1/32".parse().unwrap(),
            ],
        )
        .unwrap();
        assert!(s.contains("192.168.0.7".parse().unwrap()));
        assert!(s.contains("203.0.113.1".parse().unwrap()));
        assert!(!s.contains("203.0.113.2".parse().unwrap()));
    }

    #[test]
    fn neighbor_set_difference_by_string() {
        let mut s = NeighborSet::new(
            "s".to_string(),
            vec![
                "10.0.0.1/32".parse().unwrap(),
                "10.0.0.2/32".parse().unwrap(),
            ],
        )
        .unwrap();
        let t = NeighborSet::new(
            "t".to_string(),
            vec!["10.0.0.2/32".parse().unwrap()],
        )
        .unwrap();
        s.remove(&t);
        assert_eq!(s.list(), vec!["10.0.0.1/32"]);
    }

    #[test]
    fn single_as_path_match_parse() {
        assert_eq!(
            SingleAsPathMatch::new("^65100_"),
            Some(SingleAsPathMatch::LeftMost(65100))
        );
        assert_eq!(
            SingleAsPathMatch::new("_65100$"),
            Some(SingleAsPathMatch::Origin(65100))
        );
        assert_eq!(
            SingleAsPathMatch::new("_65100_"),
            Some(SingleAsPathMatch::Include(65100))
        );
        assert_eq!(
            SingleAsPathMatch::new("^65100$"),
            Some(SingleAsPathMatch::Only(65100))
        );
        assert_eq!(SingleAsPathMatch::new("65100"), None);
        assert_eq!(SingleAsPathMatch::new("^65100_65200_"), None);
        // round trip through display
        for p in ["^1_", "_1$", "_1_", "^1$"] {
            assert_eq!(
                SingleAsPathMatch::new(p).unwrap().to_string(),
                p
            );
        }
    }

    #[test]
    fn single_as_path_match_semantics() {
        let path = [65001, 65002, 65003];
        assert!(SingleAsPathMatch::LeftMost(65001).matches(&path));
        assert!(!SingleAsPathMatch::LeftMost(65002).matches(&path));
        assert!(SingleAsPathMatch::Origin(65003).matches(&path));
        assert!(SingleAsPathMatch::Include(65002).matches(&path));
        assert!(!SingleAsPathMatch::Only(65001).matches(&path));
        assert!(SingleAsPathMatch::Only(65001).matches(&[65001]));
        assert!(!SingleAsPathMatch::Include(65001).matches(&[]));
    }

    #[test]
    fn as_path_set_split() {
        let set = AsPathSet::new(
            "aps".to_string(),
            &[
                "^65001_".to_string(),
                "_65002$".to_string(),
                "65100_65200".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(set.single_list.len(), 2);
        assert_eq!(set.list.len(), 1);
        // the underscore expands to the boundary class
        assert!(set.list[0].as_str().contains(ASPATH_REGEXP_MAGIC));
    }

    #[test]
    fn set_algebra_regex_sets() {
        let mut s = CommunitySet::new(
            "s".to_string(),
            &["65000:1".to_string(), "65000:2".to_string()],
        )
        .unwrap();
        let t =
            CommunitySet::new("t".to_string(), &["65000:3".to_string()])
                .unwrap();

        s.append(&t);
        assert_eq!(s.list().len(), 3);

        // append(t) then remove(t) restores s when t is disjoint
        s.remove(&t);
        assert_eq!(s.list(), vec!["^65000:1$", "^65000:2$"]);

        s.replace(t.clone());
        assert_eq!(s.list(), t.list());
    }

    #[test]
    fn ext_community_set_subtypes() {
        let set = ExtCommunitySet::new(
            "es".to_string(),
            &["rt:65000:100".to_string(), "soo:65000:200".to_string()],
        )
        .unwrap();
        assert_eq!(
            set.subtypes,
            vec![EXT_SUBTYPE_ROUTE_TARGET, EXT_SUBTYPE_ROUTE_ORIGIN]
        );
        assert_eq!(set.list(), vec!["rt:^65000:100$", "soo:^65000:200$"]);
    }

    #[test]
    fn parse_community_forms() {
        assert_eq!(
            parse_community("4259840000").unwrap(),
            Community(65000 << 16)
        );
        assert_eq!(
            parse_community("65000:100").unwrap(),
            Community((65000 << 16) | 100)
        );
        assert_eq!(
            parse_community("no-export").unwrap(),
            Community::NO_EXPORT
        );
        assert!(parse_community("65536:1").is_err());
        assert!(parse_community("bogus").is_err());
    }

    #[test]
    fn parse_community_regexp_round_trip() {
        // compiling the formatted community matches exactly that community
        for c in [
            Community(0),
            Community(1),
            Community((65000 << 16) | 100,),
            Community::NO_EXPORT,
            Community(u32::MAX),
        ] {
            let re = parse_community_regexp(&c.to_string()).unwrap();
            assert!(re.is_match(&c.to_string()), "{c}");
            let other = Community(c.0.wrapping_add(1));
            assert!(!re.is_match(&other.to_string()), "{c} vs {other}");
        }
    }

    #[test]
    fn parse_community_regexp_well_known_and_raw() {
        let re = parse_community_regexp("no_export").unwrap();
        assert!(re.is_match(&Community::NO_EXPORT.to_string()));

        let re = parse_community_regexp("^65000:").unwrap();
        assert!(re.is_match("65000:77"));

        assert!(parse_community_regexp("(").is_err());
    }

    #[test]
    fn parse_ext_community_forms() {
        let rt = parse_ext_community("rt:65000:100").unwrap();
        assert_eq!(rt.subtype, EXT_SUBTYPE_ROUTE_TARGET);
        assert_eq!(rt.to_string(), "65000:100");

        let soo = parse_ext_community("soo:1.2.3.4:7").unwrap();
        assert_eq!(soo.subtype, EXT_SUBTYPE_ROUTE_ORIGIN);
        assert_eq!(soo.to_string(), "1.2.3.4:7");

        let four = parse_ext_community("rt:4200000000:5").unwrap();
        assert_eq!(
            four.value,
            ExtCommunityValue::FourOctetAs {
                asn: 4200000000,
                local: 5
            }
        );

        let valid = parse_ext_community("valid").unwrap();
        assert_eq!(
            valid.validation_state(),
            Some(ValidationStatus::Valid)
        );

        assert!(parse_ext_community("xx:1:2").is_err());
        assert!(parse_ext_community("rt:banana").is_err());
    }

    #[test]
    fn parse_large_community_regexp_forms() {
        let re = parse_large_community_regexp("65000:1:2").unwrap();
        assert!(re.is_match("65000:1:2"));
        assert!(!re.is_match("165000:1:2"));

        let re = parse_large_community_regexp("^65000:").unwrap();
        assert!(re.is_match("65000:1:2"));
    }

    #[test]
    fn defined_set_type_mismatch() {
        let mut ds = DefinedSet::Community(
            CommunitySet::new("c".to_string(), &["65000:1".to_string()])
                .unwrap(),
        );
        let other = DefinedSet::AsPath(
            AsPathSet::new("a".to_string(), &["^65001_".to_string()])
                .unwrap(),
        );
        assert!(matches!(
            ds.append(&other),
            Err(Error::SetTypeMismatch { .. })
        ));
        assert!(ds.remove(&other).is_err());
        assert!(ds.replace(other).is_err());
    }
}
