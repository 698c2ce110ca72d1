// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Condition evaluators: pure predicates over a path and the per-call
//! policy options. Everything a condition needs is compiled at install
//! time; evaluation allocates nothing beyond the community strings it
//! formats for regex matching.

use crate::attrs::{Origin, ValidationStatus};
use crate::path::Path;
use crate::policy::PolicyOptions;
use crate::sets::{
    AsPathSet, CommunitySet, ExtCommunitySet, LargeCommunitySet,
    NeighborSet, NextHopSet, PrefixSet,
};
use policy_types::RouteFamily;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a set-backed condition combines its members.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchOption {
    /// At least one member matches.
    Any,
    /// Every member matches.
    All,
    /// The negation of the natural membership test.
    Invert,
}

impl fmt::Display for MatchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOption::Any => write!(f, "any"),
            MatchOption::All => write!(f, "all"),
            MatchOption::Invert => write!(f, "invert"),
        }
    }
}

/// Comparison operator for scalar attribute conditions.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Eq,
    Ge,
    Le,
}

impl Comparison {
    pub fn compare<T: Ord>(&self, value: T, against: T) -> bool {
        match self {
            Comparison::Eq => value == against,
            Comparison::Ge => value >= against,
            Comparison::Le => value <= against,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Eq => write!(f, "="),
            Comparison::Ge => write!(f, ">="),
            Comparison::Le => write!(f, "<="),
        }
    }
}

/// The route provenance classes a route-type condition distinguishes.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RouteTypeKind {
    /// Originated by this speaker.
    Local,
    /// Learned over iBGP.
    Internal,
    /// Learned over eBGP.
    External,
}

impl fmt::Display for RouteTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTypeKind::Local => write!(f, "local"),
            RouteTypeKind::Internal => write!(f, "internal"),
            RouteTypeKind::External => write!(f, "external"),
        }
    }
}

/// A statement condition. All conditions of a statement must hold for the
/// statement to fire.
#[derive(Debug, Clone)]
pub enum Condition {
    Prefix {
        option: MatchOption,
        set: Arc<PrefixSet>,
    },
    Neighbor {
        option: MatchOption,
        set: Arc<NeighborSet>,
    },
    AsPath {
        option: MatchOption,
        set: Arc<AsPathSet>,
    },
    Community {
        option: MatchOption,
        set: Arc<CommunitySet>,
    },
    ExtCommunity {
        option: MatchOption,
        set: Arc<ExtCommunitySet>,
    },
    LargeCommunity {
        option: MatchOption,
        set: Arc<LargeCommunitySet>,
    },
    NextHop(NextHopSet),
    AsPathLength {
        operator: Comparison,
        length: u32,
    },
    RouteType(RouteTypeKind),
    AfiSafiIn(Vec<RouteFamily>),
    Rpki(ValidationStatus),
    /// Reserved in the configuration schema; matches MED equal to the
    /// value, false when MED is absent.
    MedEq(u32),
    /// Reserved in the configuration schema; matches ORIGIN equal to the
    /// value, false when ORIGIN is absent.
    OriginEq(Origin),
    /// Reserved in the configuration schema; matches LOCAL_PREF (default
    /// 100) equal to the value.
    LocalPrefEq(u32),
    /// Reserved in the configuration schema; compares the number of
    /// standard communities on the path.
    CommunityCount {
        operator: Comparison,
        count: u32,
    },
}

impl Condition {
    /// The defined-set name backing this condition, for conditions that
    /// have one.
    pub fn set_name(&self) -> Option<&str> {
        match self {
            Condition::Prefix { set, .. } => Some(set.name()),
            Condition::Neighbor { set, .. } => Some(set.name()),
            Condition::AsPath { set, .. } => Some(set.name()),
            Condition::Community { set, .. } => Some(set.name()),
            Condition::ExtCommunity { set, .. } => Some(set.name()),
            Condition::LargeCommunity { set, .. } => Some(set.name()),
            _ => None,
        }
    }

    pub fn evaluate(&self, path: &Path, options: &PolicyOptions) -> bool {
        match self {
            Condition::Prefix { option, set } => {
                Self::eval_prefix(path, *option, set)
            }
            Condition::Neighbor { option, set } => {
                Self::eval_neighbor(path, options, *option, set)
            }
            Condition::AsPath { option, set } => {
                Self::eval_as_path(path, *option, set)
            }
            Condition::Community { option, set } => {
                Self::eval_community(path, *option, set)
            }
            Condition::ExtCommunity { option, set } => {
                Self::eval_ext_community(path, *option, set)
            }
            Condition::LargeCommunity { option, set } => {
                Self::eval_large_community(path, *option, set)
            }
            Condition::NextHop(set) => {
                Self::eval_next_hop(path, options, set)
            }
            Condition::AsPathLength { operator, length } => {
                operator.compare(path.as_path_len() as u32, *length)
            }
            Condition::RouteType(kind) => match kind {
                RouteTypeKind::Local => path.is_local(),
                RouteTypeKind::Internal => {
                    !path.is_local() && path.is_ibgp()
                }
                RouteTypeKind::External => {
                    !path.is_local() && !path.is_ibgp()
                }
            },
            Condition::AfiSafiIn(families) => {
                families.iter().any(|rf| path.route_family() == *rf)
            }
            Condition::Rpki(expected) => match &options.validate {
                Some(validate) => validate(path).status == *expected,
                None => false,
            },
            Condition::MedEq(value) => {
                path.med().map(|m| m == *value).unwrap_or(false)
            }
            Condition::OriginEq(origin) => {
                path.origin().map(|o| o == *origin).unwrap_or(false)
            }
            Condition::LocalPrefEq(value) => path.local_pref() == *value,
            Condition::CommunityCount { operator, count } => {
                operator.compare(path.communities().len() as u32, *count)
            }
        }
    }

    /// The route family must equal the set's family; the NLRI must fall
    /// under a tree entry whose rule list admits its mask length. Invert
    /// negates.
    fn eval_prefix(
        path: &Path,
        option: MatchOption,
        set: &PrefixSet,
    ) -> bool {
        if Some(path.route_family().afi()) != set.family() {
            return false;
        }
        let prefix = path.nlri().prefix;
        let masklen = prefix.length();
        let mut result = false;
        if let Some(rules) = set.longest_match(&prefix) {
            result = rules.iter().any(|r| r.matches_length(masklen));
        }
        if option == MatchOption::Invert {
            result = !result;
        }
        result
    }

    /// An empty neighbor set matches everything. The candidate address is
    /// the per-call peer address when supplied, otherwise the path source.
    /// Invert negates.
    fn eval_neighbor(
        path: &Path,
        options: &PolicyOptions,
        option: MatchOption,
        set: &NeighborSet,
    ) -> bool {
        if set.list.is_empty() {
            return true;
        }
        let neighbor = match options
            .info
            .as_ref()
            .and_then(|info| info.address)
            .or(path.source().address)
        {
            // v4-mapped peer addresses match v4 networks
            Some(addr) => addr.to_canonical(),
            None => return false,
        };
        let mut result = set.contains(neighbor);
        if option == MatchOption::Invert {
            result = !result;
        }
        result
    }

    /// An empty next-hop set matches everything. When the caller recorded
    /// the pre-rewrite nexthop and it differs from the current one, filter
    /// on the original, per RFC 4271 §5.1.3.
    fn eval_next_hop(
        path: &Path,
        options: &PolicyOptions,
        set: &NextHopSet,
    ) -> bool {
        if set.is_empty() {
            return true;
        }
        let mut nexthop = path.nexthop();
        if let Some(old) = options.old_next_hop {
            if !old.is_unspecified() && Some(old) != nexthop {
                nexthop = Some(old);
            }
        }
        match nexthop {
            Some(nh) => set.contains(nh.to_canonical()),
            None => false,
        }
    }

    /// Single matchers run against the decoded AS sequence and regexes
    /// against the canonical path string. `All` fails on the first miss,
    /// `Any` succeeds on the first hit, `Invert` fails on the first hit;
    /// if every member is exhausted, `Any` is false and the others true.
    fn eval_as_path(
        path: &Path,
        option: MatchOption,
        set: &AsPathSet,
    ) -> bool {
        if !set.single_list.is_empty() {
            let aspath = path.as_seq_list();
            for matcher in &set.single_list {
                let result = matcher.matches(&aspath);
                if option == MatchOption::All && !result {
                    return false;
                }
                if option == MatchOption::Any && result {
                    return true;
                }
                if option == MatchOption::Invert && result {
                    return false;
                }
            }
        }
        if !set.list.is_empty() {
            let aspath = path.as_path_string();
            for regex in &set.list {
                let result = regex.is_match(&aspath);
                if option == MatchOption::All && !result {
                    return false;
                }
                if option == MatchOption::Any && result {
                    return true;
                }
                if option == MatchOption::Invert && result {
                    return false;
                }
            }
        }
        option != MatchOption::Any
    }

    fn eval_community(
        path: &Path,
        option: MatchOption,
        set: &CommunitySet,
    ) -> bool {
        let communities = path.communities();
        let mut result = false;
        for regex in &set.list {
            result = communities
                .iter()
                .any(|c| regex.is_match(&c.to_string()));
            if option == MatchOption::All && !result {
                break;
            }
            if (option == MatchOption::Any || option == MatchOption::Invert)
                && result
            {
                break;
            }
        }
        if option == MatchOption::Invert {
            result = !result;
        }
        result
    }

    /// Only transitive communities are considered, and a pattern only
    /// applies to communities of its own subtype. See RFC 7153.
    fn eval_ext_community(
        path: &Path,
        option: MatchOption,
        set: &ExtCommunitySet,
    ) -> bool {
        let communities = path.ext_communities();
        let mut result = false;
        for community in &communities {
            result = false;
            if !community.is_transitive() {
                continue;
            }
            for (regex, subtype) in
                set.list.iter().zip(set.subtypes.iter())
            {
                if community.subtype == *subtype
                    && regex.is_match(&community.to_string())
                {
                    result = true;
                    break;
                }
            }
            if option == MatchOption::All && !result {
                break;
            }
            if option == MatchOption::Any && result {
                break;
            }
        }
        if option == MatchOption::Invert {
            result = !result;
        }
        result
    }

    fn eval_large_community(
        path: &Path,
        option: MatchOption,
        set: &LargeCommunitySet,
    ) -> bool {
        let communities = path.large_communities();
        let mut result = false;
        for regex in &set.list {
            result = communities
                .iter()
                .any(|c| regex.is_match(&c.to_string()));
            if option == MatchOption::All && !result {
                break;
            }
            if (option == MatchOption::Any || option == MatchOption::Invert)
                && result
            {
                break;
            }
        }
        if option == MatchOption::Invert {
            result = !result;
        }
        result
    }
}
