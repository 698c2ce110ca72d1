// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Statements, policies, and assignments: the ordered composition layer
//! that drives conditions and actions to a terminal verdict.

use crate::action::{Action, RoutingAction};
use crate::attrs::{Origin, Validation};
use crate::condition::Condition;
use crate::config::{
    ActionsConfig, AsPathLengthConfig, CommunityCountConfig,
    ConditionsConfig, MatchAsPathSetConfig, MatchCommunitySetConfig,
    MatchExtCommunitySetConfig, MatchLargeCommunitySetConfig,
    MatchNeighborSetConfig, MatchPrefixSetConfig, MatchTagSetConfig,
    PolicyDefinitionConfig, RouteDisposition, StatementConfig,
};
use crate::path::{Path, PeerInfo};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Which direction of a RIB a policy assignment applies to.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Routes received from peers.
    Import,
    /// Routes about to be advertised to peers.
    Export,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Import => write!(f, "import"),
            Direction::Export => write!(f, "export"),
        }
    }
}

/// The outcome of evaluating a statement, policy, or assignment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    /// Fall through to the next statement, policy, or default.
    Continue,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accept => write!(f, "accept"),
            Verdict::Reject => write!(f, "reject"),
            Verdict::Continue => write!(f, "continue"),
        }
    }
}

/// The final disposition an evaluation returns to the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    Reject,
}

/// The host's origin-validation callback.
pub type ValidateFn = Box<dyn Fn(&Path) -> Validation + Send + Sync>;

/// Auxiliary per-evaluation input.
///
/// `info` supplies the neighbor the path is being exchanged with, which
/// can differ from the path's source. `old_next_hop` carries the
/// pre-rewrite nexthop so export-side nexthop conditions match the
/// original value (RFC 4271 §5.1.3). `validate` is invoked lazily by RPKI
/// conditions.
#[derive(Default)]
pub struct PolicyOptions {
    pub info: Option<PeerInfo>,
    pub old_next_hop: Option<IpAddr>,
    pub validate: Option<ValidateFn>,
}

/// Configuration fields the schema reserves but no evaluator consumes.
/// They ride along on the statement so read-back returns them intact.
#[derive(Debug, Clone, Default)]
pub struct ReservedStatementConfig {
    pub call_policy: String,
    pub install_protocol_eq: String,
    pub match_tag_set: MatchTagSetConfig,
    pub set_tag: String,
    pub set_route_origin: Option<Origin>,
}

/// A named set of AND'd conditions plus the actions applied when they
/// all hold.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub route_action: Option<RoutingAction>,
    pub mod_actions: Vec<Action>,
    pub reserved: ReservedStatementConfig,
}

impl Statement {
    /// True when every condition matches.
    pub fn evaluate(&self, path: &Path, options: &PolicyOptions) -> bool {
        self.conditions.iter().all(|c| c.evaluate(path, options))
    }

    /// Apply the statement's actions to a working path. Only call after
    /// [`Statement::evaluate`] returned true. Mod-actions run in
    /// declaration order, then the route action yields the verdict.
    pub fn apply(
        &self,
        path: &mut Path,
        options: &PolicyOptions,
        log: &Logger,
    ) -> Verdict {
        for action in &self.mod_actions {
            action.apply(path, options, log);
        }
        match self.route_action {
            Some(RoutingAction { accept: true }) => Verdict::Accept,
            Some(RoutingAction { accept: false }) => Verdict::Reject,
            None => Verdict::Continue,
        }
    }

    pub fn to_config(&self) -> StatementConfig {
        let mut conditions = ConditionsConfig {
            call_policy: self.reserved.call_policy.clone(),
            install_protocol_eq: self.reserved.install_protocol_eq.clone(),
            match_tag_set: self.reserved.match_tag_set.clone(),
            ..Default::default()
        };
        for c in &self.conditions {
            match c {
                Condition::Prefix { option, set } => {
                    conditions.match_prefix_set = MatchPrefixSetConfig {
                        prefix_set: set.name().to_string(),
                        match_set_options: (*option).into(),
                    };
                }
                Condition::Neighbor { option, set } => {
                    conditions.match_neighbor_set =
                        MatchNeighborSetConfig {
                            neighbor_set: set.name().to_string(),
                            match_set_options: (*option).into(),
                        };
                }
                Condition::AsPath { option, set } => {
                    conditions.bgp_conditions.match_as_path_set =
                        MatchAsPathSetConfig {
                            as_path_set: set.name().to_string(),
                            match_set_options: (*option).into(),
                        };
                }
                Condition::Community { option, set } => {
                    conditions.bgp_conditions.match_community_set =
                        MatchCommunitySetConfig {
                            community_set: set.name().to_string(),
                            match_set_options: (*option).into(),
                        };
                }
                Condition::ExtCommunity { option, set } => {
                    conditions.bgp_conditions.match_ext_community_set =
                        MatchExtCommunitySetConfig {
                            ext_community_set: set.name().to_string(),
                            match_set_options: (*option).into(),
                        };
                }
                Condition::LargeCommunity { option, set } => {
                    conditions.bgp_conditions.match_large_community_set =
                        MatchLargeCommunitySetConfig {
                            large_community_set: set.name().to_string(),
                            match_set_options: (*option).into(),
                        };
                }
                Condition::NextHop(set) => {
                    conditions.bgp_conditions.next_hop_in_list =
                        set.list();
                }
                Condition::AsPathLength { operator, length } => {
                    conditions.bgp_conditions.as_path_length =
                        Some(AsPathLengthConfig {
                            operator: *operator,
                            value: *length,
                        });
                }
                Condition::RouteType(kind) => {
                    conditions.bgp_conditions.route_type = Some(*kind);
                }
                Condition::AfiSafiIn(families) => {
                    conditions.bgp_conditions.afi_safi_in_list =
                        families.iter().map(|rf| rf.to_string()).collect();
                }
                Condition::Rpki(status) => {
                    conditions.bgp_conditions.rpki_validation_result =
                        Some(*status);
                }
                Condition::MedEq(value) => {
                    conditions.bgp_conditions.med_eq = Some(*value);
                }
                Condition::OriginEq(origin) => {
                    conditions.bgp_conditions.origin_eq = Some(*origin);
                }
                Condition::LocalPrefEq(value) => {
                    conditions.bgp_conditions.local_pref_eq = Some(*value);
                }
                Condition::CommunityCount { operator, count } => {
                    conditions.bgp_conditions.community_count =
                        Some(CommunityCountConfig {
                            operator: *operator,
                            value: *count,
                        });
                }
            }
        }

        let mut actions = ActionsConfig {
            route_disposition: match self.route_action {
                Some(RoutingAction { accept: true }) => {
                    RouteDisposition::AcceptRoute
                }
                Some(RoutingAction { accept: false }) => {
                    RouteDisposition::RejectRoute
                }
                None => RouteDisposition::None,
            },
            ..Default::default()
        };
        actions.igp_actions.set_tag = self.reserved.set_tag.clone();
        actions.bgp_actions.set_route_origin =
            self.reserved.set_route_origin;
        for action in &self.mod_actions {
            match action {
                Action::Community(a) => {
                    actions.bgp_actions.set_community = Some(a.to_config());
                }
                Action::ExtCommunity(a) => {
                    actions.bgp_actions.set_ext_community =
                        Some(a.to_config());
                }
                Action::LargeCommunity(a) => {
                    actions.bgp_actions.set_large_community =
                        Some(a.to_config());
                }
                Action::Med(a) => {
                    actions.bgp_actions.set_med = a.to_config();
                }
                Action::AsPathPrepend(a) => {
                    actions.bgp_actions.set_as_path_prepend =
                        Some(a.to_config());
                }
                Action::Nexthop(a) => {
                    actions.bgp_actions.set_next_hop = a.to_config();
                }
                Action::LocalPref(value) => {
                    actions.bgp_actions.set_local_pref = Some(*value);
                }
            }
        }

        StatementConfig {
            name: self.name.clone(),
            conditions,
            actions,
        }
    }
}

/// An ordered list of statements under one name.
#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    pub statements: Vec<Arc<Statement>>,
}

impl Policy {
    /// Walk the statements in order against a working path. The first
    /// statement that fires and carries a route action decides; a fired
    /// statement without one applies its mod-actions and falls through.
    pub fn evaluate(
        &self,
        path: &mut Path,
        options: &PolicyOptions,
        log: &Logger,
    ) -> Verdict {
        for statement in &self.statements {
            if statement.evaluate(path, options) {
                let verdict = statement.apply(path, options, log);
                if verdict != Verdict::Continue {
                    return verdict;
                }
            }
        }
        Verdict::Continue
    }

    /// Append another policy's statements.
    pub fn add(&mut self, rhs: &Policy) {
        self.statements.extend(rhs.statements.iter().cloned());
    }

    /// Remove statements matching the other policy's statement names.
    pub fn remove(&mut self, rhs: &Policy) {
        self.statements
            .retain(|s| !rhs.statements.iter().any(|r| r.name == s.name));
    }

    /// Swap in another policy's statement list.
    pub fn replace(&mut self, rhs: Policy) {
        self.statements = rhs.statements;
    }

    pub fn to_config(&self) -> PolicyDefinitionConfig {
        PolicyDefinitionConfig {
            name: self.name.clone(),
            statements: self
                .statements
                .iter()
                .map(|s| s.to_config())
                .collect(),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy {} ({} statements)", self.name, self.statements.len())
    }
}

/// An ordered policy list bound to a direction, with the verdict applied
/// when every policy falls through.
#[derive(Debug, Clone)]
pub struct PolicyAssignment {
    pub name: String,
    pub direction: Direction,
    pub policies: Vec<Arc<Policy>>,
    pub default: Verdict,
}

impl PolicyAssignment {
    pub fn new(direction: Direction) -> Self {
        PolicyAssignment {
            name: String::new(),
            direction,
            policies: Vec::new(),
            default: Verdict::Continue,
        }
    }

    /// Walk the policies in order; the first non-Continue verdict wins,
    /// otherwise the assignment default applies.
    pub fn evaluate(
        &self,
        path: &mut Path,
        options: &PolicyOptions,
        log: &Logger,
    ) -> Verdict {
        for policy in &self.policies {
            let verdict = policy.evaluate(path, options, log);
            if verdict != Verdict::Continue {
                return verdict;
            }
        }
        self.default
    }
}
