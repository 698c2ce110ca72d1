// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The structured configuration schema the engine consumes and emits.
//!
//! The engine never reads files; the host parses TOML (or anything else
//! serde can feed) into these structures and hands them over. Keys are
//! canonical kebab-case. Some fields (`call-policy`,
//! `install-protocol-eq`, `set-tag`, `set-route-origin`) are reserved:
//! they survive round-trips but no evaluator consumes them.

use crate::attrs::{Origin, ValidationStatus};
use crate::condition::{Comparison, MatchOption, RouteTypeKind};
use crate::policy::Direction;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of the policy configuration: defined sets plus policy
/// definitions.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct RoutingPolicyConfig {
    pub defined_sets: DefinedSetsConfig,
    pub policy_definitions: Vec<PolicyDefinitionConfig>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct DefinedSetsConfig {
    pub prefix_sets: Vec<PrefixSetConfig>,
    pub neighbor_sets: Vec<NeighborSetConfig>,
    pub tag_sets: Vec<TagSetConfig>,
    pub bgp_defined_sets: BgpDefinedSetsConfig,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct BgpDefinedSetsConfig {
    pub community_sets: Vec<CommunitySetConfig>,
    pub ext_community_sets: Vec<ExtCommunitySetConfig>,
    pub as_path_sets: Vec<AsPathSetConfig>,
    pub large_community_sets: Vec<LargeCommunitySetConfig>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct PrefixSetConfig {
    pub prefix_set_name: String,
    pub prefix_list: Vec<PrefixConfig>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct PrefixConfig {
    pub ip_prefix: String,
    /// `"min..max"`; empty means exactly the prefix's own length.
    pub masklength_range: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct NeighborSetConfig {
    pub neighbor_set_name: String,
    pub neighbor_info_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct TagSetConfig {
    pub tag_set_name: String,
    pub tag_list: Vec<TagConfig>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct TagConfig {
    pub value: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommunitySetConfig {
    pub community_set_name: String,
    pub community_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExtCommunitySetConfig {
    pub ext_community_set_name: String,
    pub ext_community_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct AsPathSetConfig {
    pub as_path_set_name: String,
    pub as_path_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct LargeCommunitySetConfig {
    pub large_community_set_name: String,
    pub large_community_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct PolicyDefinitionConfig {
    pub name: String,
    pub statements: Vec<StatementConfig>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct StatementConfig {
    pub name: String,
    pub conditions: ConditionsConfig,
    pub actions: ActionsConfig,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConditionsConfig {
    /// Reserved; accepted and round-tripped but not evaluated.
    pub call_policy: String,
    pub match_prefix_set: MatchPrefixSetConfig,
    pub match_neighbor_set: MatchNeighborSetConfig,
    pub match_tag_set: MatchTagSetConfig,
    /// Reserved; accepted and round-tripped but not evaluated.
    pub install_protocol_eq: String,
    pub bgp_conditions: BgpConditionsConfig,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchPrefixSetConfig {
    pub prefix_set: String,
    pub match_set_options: MatchSetOptionsRestrictedType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchNeighborSetConfig {
    pub neighbor_set: String,
    pub match_set_options: MatchSetOptionsRestrictedType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchTagSetConfig {
    pub tag_set: String,
    pub match_set_options: MatchSetOptionsRestrictedType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct BgpConditionsConfig {
    pub match_community_set: MatchCommunitySetConfig,
    pub match_ext_community_set: MatchExtCommunitySetConfig,
    pub match_as_path_set: MatchAsPathSetConfig,
    pub match_large_community_set: MatchLargeCommunitySetConfig,
    pub med_eq: Option<u32>,
    pub origin_eq: Option<Origin>,
    pub next_hop_in_list: Vec<String>,
    pub afi_safi_in_list: Vec<String>,
    pub local_pref_eq: Option<u32>,
    pub community_count: Option<CommunityCountConfig>,
    pub as_path_length: Option<AsPathLengthConfig>,
    pub route_type: Option<RouteTypeKind>,
    pub rpki_validation_result: Option<ValidationStatus>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchCommunitySetConfig {
    pub community_set: String,
    pub match_set_options: MatchSetOptionsType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchExtCommunitySetConfig {
    pub ext_community_set: String,
    pub match_set_options: MatchSetOptionsType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchAsPathSetConfig {
    pub as_path_set: String,
    pub match_set_options: MatchSetOptionsType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatchLargeCommunitySetConfig {
    pub large_community_set: String,
    pub match_set_options: MatchSetOptionsType,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommunityCountConfig {
    pub operator: Comparison,
    pub value: u32,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct AsPathLengthConfig {
    pub operator: Comparison,
    pub value: u32,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct ActionsConfig {
    pub route_disposition: RouteDisposition,
    pub igp_actions: IgpActionsConfig,
    pub bgp_actions: BgpActionsConfig,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct IgpActionsConfig {
    /// Reserved; accepted and round-tripped but not evaluated.
    pub set_tag: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct BgpActionsConfig {
    pub set_as_path_prepend: Option<SetAsPathPrependConfig>,
    pub set_community: Option<SetCommunityConfig>,
    pub set_ext_community: Option<SetExtCommunityConfig>,
    pub set_large_community: Option<SetLargeCommunityConfig>,
    /// Reserved; accepted and round-tripped but not evaluated.
    pub set_route_origin: Option<Origin>,
    pub set_local_pref: Option<u32>,
    /// `"+N"`, `"-N"`, or `"N"`; empty means no MED action.
    pub set_med: String,
    /// `"self"` or an IP address; empty means no nexthop action.
    pub set_next_hop: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetAsPathPrependConfig {
    pub repeat_n: u8,
    /// `"last-as"` or a decimal ASN.
    #[serde(rename = "as")]
    pub asn: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetCommunityConfig {
    pub set_community_method: SetCommunityMethodConfig,
    pub options: CommunityOptionType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetCommunityMethodConfig {
    pub communities_list: Vec<String>,
    /// Reserved; accepted and round-tripped but not evaluated.
    pub community_set_ref: String,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetExtCommunityConfig {
    pub set_ext_community_method: SetExtCommunityMethodConfig,
    pub options: CommunityOptionType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetExtCommunityMethodConfig {
    pub communities_list: Vec<String>,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetLargeCommunityConfig {
    pub set_large_community_method: SetLargeCommunityMethodConfig,
    pub options: CommunityOptionType,
}

#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct SetLargeCommunityMethodConfig {
    pub communities_list: Vec<String>,
}

/// `match-set-options` for set conditions that admit all three modes.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSetOptionsType {
    #[default]
    Any,
    All,
    Invert,
}

impl From<MatchSetOptionsType> for MatchOption {
    fn from(value: MatchSetOptionsType) -> MatchOption {
        match value {
            MatchSetOptionsType::Any => MatchOption::Any,
            MatchSetOptionsType::All => MatchOption::All,
            MatchSetOptionsType::Invert => MatchOption::Invert,
        }
    }
}

impl From<MatchOption> for MatchSetOptionsType {
    fn from(value: MatchOption) -> MatchSetOptionsType {
        match value {
            MatchOption::Any => MatchSetOptionsType::Any,
            MatchOption::All => MatchSetOptionsType::All,
            MatchOption::Invert => MatchSetOptionsType::Invert,
        }
    }
}

/// The restricted `match-set-options` form prefix and neighbor matches
/// take: `all` is not expressible.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSetOptionsRestrictedType {
    #[default]
    Any,
    Invert,
}

impl From<MatchSetOptionsRestrictedType> for MatchOption {
    fn from(value: MatchSetOptionsRestrictedType) -> MatchOption {
        match value {
            MatchSetOptionsRestrictedType::Any => MatchOption::Any,
            MatchSetOptionsRestrictedType::Invert => MatchOption::Invert,
        }
    }
}

impl From<MatchOption> for MatchSetOptionsRestrictedType {
    fn from(value: MatchOption) -> MatchSetOptionsRestrictedType {
        match value {
            MatchOption::Invert => MatchSetOptionsRestrictedType::Invert,
            _ => MatchSetOptionsRestrictedType::Any,
        }
    }
}

/// What a statement decides for a route when its conditions hold.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum RouteDisposition {
    /// Fall through to the next statement.
    #[default]
    None,
    AcceptRoute,
    RejectRoute,
}

/// How a community-ish action combines its members with the path's.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum CommunityOptionType {
    #[default]
    Add,
    Remove,
    Replace,
}

impl fmt::Display for CommunityOptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityOptionType::Add => write!(f, "add"),
            CommunityOptionType::Remove => write!(f, "remove"),
            CommunityOptionType::Replace => write!(f, "replace"),
        }
    }
}

/// The fall-through verdict of an assignment.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPolicyType {
    #[default]
    AcceptRoute,
    RejectRoute,
}

/// Per-direction policy application, as the host's global configuration
/// block expresses it.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case", default)]
pub struct ApplyPolicyConfig {
    pub import_policy_list: Vec<String>,
    pub default_import_policy: DefaultPolicyType,
    pub export_policy_list: Vec<String>,
    pub default_export_policy: DefaultPolicyType,
}

/// A policy assignment exchanged through the patch API.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyAssignmentConfig {
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub default_action: RouteDisposition,
}
