// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared policy registry and its evaluation entry point.
//!
//! Configuration writers serialize behind a write lock; every evaluation
//! takes exactly one read lock for its whole duration and sees a
//! consistent snapshot. `install` builds a complete new registry off to
//! the side and swaps it in, and `patch` works the same way on a clone,
//! so a failed change leaves the running policy untouched.

use crate::action::{Action, PrependAction, RoutingAction};
use crate::condition::Condition;
use crate::config::{
    ApplyPolicyConfig, AsPathSetConfig, BgpDefinedSetsConfig,
    CommunitySetConfig, DefaultPolicyType, DefinedSetsConfig,
    ExtCommunitySetConfig, LargeCommunitySetConfig, NeighborSetConfig,
    PolicyAssignmentConfig, PolicyDefinitionConfig, PrefixSetConfig,
    RouteDisposition, RoutingPolicyConfig, StatementConfig, TagSetConfig,
};
use crate::error::Error;
use crate::path::Path;
use crate::policy::{
    Direction, Disposition, Policy, PolicyAssignment, PolicyOptions,
    ReservedStatementConfig, Statement, Verdict,
};
use crate::sets::{
    AsPathSet, CommunitySet, DefinedSet, DefinedSetKind, ExtCommunitySet,
    LargeCommunitySet, NeighborSet, NextHopSet, PrefixSet, TagSet,
};
use pe_common::{read_lock, write_lock};
use policy_types::RouteFamily;
use slog::{debug, Logger};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// The name assignments are installed under when driven by the global
/// apply-policy block.
pub const GLOBAL_RIB_NAME: &str = "global";

/// How a [`PolicyEngine::patch`] call changes the registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

/// The configuration entity a patch call carries. Removing a set with an
/// empty member list removes the whole set; removing an assignment with
/// an empty policy list clears the whole assignment.
#[derive(Debug, Clone)]
pub enum PatchEntity {
    PrefixSet(PrefixSetConfig),
    NeighborSet(NeighborSetConfig),
    TagSet(TagSetConfig),
    AsPathSet(AsPathSetConfig),
    CommunitySet(CommunitySetConfig),
    ExtCommunitySet(ExtCommunitySetConfig),
    LargeCommunitySet(LargeCommunitySetConfig),
    Statement(StatementConfig),
    Policy(PolicyDefinitionConfig),
    Assignment(PolicyAssignmentConfig),
}

/// One consistent snapshot of every defined set, statement, policy, and
/// assignment. Statements are global and shared by name across policies.
#[derive(Clone)]
struct RoutingPolicy {
    prefix_sets: BTreeMap<String, Arc<PrefixSet>>,
    neighbor_sets: BTreeMap<String, Arc<NeighborSet>>,
    tag_sets: BTreeMap<String, Arc<TagSet>>,
    as_path_sets: BTreeMap<String, Arc<AsPathSet>>,
    community_sets: BTreeMap<String, Arc<CommunitySet>>,
    ext_community_sets: BTreeMap<String, Arc<ExtCommunitySet>>,
    large_community_sets: BTreeMap<String, Arc<LargeCommunitySet>>,
    statements: BTreeMap<String, Arc<Statement>>,
    policies: BTreeMap<String, Arc<Policy>>,
    import: PolicyAssignment,
    export: PolicyAssignment,
}

impl RoutingPolicy {
    fn new() -> Self {
        RoutingPolicy {
            prefix_sets: BTreeMap::new(),
            neighbor_sets: BTreeMap::new(),
            tag_sets: BTreeMap::new(),
            as_path_sets: BTreeMap::new(),
            community_sets: BTreeMap::new(),
            ext_community_sets: BTreeMap::new(),
            large_community_sets: BTreeMap::new(),
            statements: BTreeMap::new(),
            policies: BTreeMap::new(),
            import: PolicyAssignment::new(Direction::Import),
            export: PolicyAssignment::new(Direction::Export),
        }
    }

    fn build(
        config: &RoutingPolicyConfig,
        apply: &ApplyPolicyConfig,
    ) -> Result<Self, Error> {
        let mut rp = RoutingPolicy::new();
        rp.load_defined_sets(&config.defined_sets)?;
        for policy in &config.policy_definitions {
            rp.load_policy(policy)?;
        }
        rp.import = rp.assignment(
            Direction::Import,
            &apply.import_policy_list,
            default_verdict(apply.default_import_policy),
        )?;
        rp.export = rp.assignment(
            Direction::Export,
            &apply.export_policy_list,
            default_verdict(apply.default_export_policy),
        )?;
        Ok(rp)
    }

    fn load_defined_sets(
        &mut self,
        config: &DefinedSetsConfig,
    ) -> Result<(), Error> {
        for c in &config.prefix_sets {
            self.insert_new_set(DefinedSet::Prefix(PrefixSet::from_config(
                c,
            )?))?;
        }
        for c in &config.neighbor_sets {
            self.insert_new_set(DefinedSet::Neighbor(
                NeighborSet::from_config(c)?,
            ))?;
        }
        for c in &config.tag_sets {
            self.insert_new_set(DefinedSet::Tag(TagSet::from_config(c)?))?;
        }
        let bgp = &config.bgp_defined_sets;
        for c in &bgp.as_path_sets {
            self.insert_new_set(DefinedSet::AsPath(AsPathSet::from_config(
                c,
            )?))?;
        }
        for c in &bgp.community_sets {
            self.insert_new_set(DefinedSet::Community(
                CommunitySet::from_config(c)?,
            ))?;
        }
        for c in &bgp.ext_community_sets {
            self.insert_new_set(DefinedSet::ExtCommunity(
                ExtCommunitySet::from_config(c)?,
            ))?;
        }
        for c in &bgp.large_community_sets {
            self.insert_new_set(DefinedSet::LargeCommunity(
                LargeCommunitySet::from_config(c)?,
            ))?;
        }
        Ok(())
    }

    /// Register a freshly built set, rejecting duplicate names.
    fn insert_new_set(&mut self, set: DefinedSet) -> Result<(), Error> {
        let kind = set.kind();
        let name = set.name().to_string();
        if self.lookup_set(kind, &name).is_some() {
            return Err(Error::DuplicateSet(kind, name));
        }
        self.store_set(set);
        Ok(())
    }

    /// Clone the named set back out as a polymorphic value.
    fn lookup_set(
        &self,
        kind: DefinedSetKind,
        name: &str,
    ) -> Option<DefinedSet> {
        match kind {
            DefinedSetKind::Prefix => self
                .prefix_sets
                .get(name)
                .map(|s| DefinedSet::Prefix((**s).clone())),
            DefinedSetKind::Neighbor => self
                .neighbor_sets
                .get(name)
                .map(|s| DefinedSet::Neighbor((**s).clone())),
            DefinedSetKind::Tag => self
                .tag_sets
                .get(name)
                .map(|s| DefinedSet::Tag((**s).clone())),
            DefinedSetKind::AsPath => self
                .as_path_sets
                .get(name)
                .map(|s| DefinedSet::AsPath((**s).clone())),
            DefinedSetKind::Community => self
                .community_sets
                .get(name)
                .map(|s| DefinedSet::Community((**s).clone())),
            DefinedSetKind::ExtCommunity => self
                .ext_community_sets
                .get(name)
                .map(|s| DefinedSet::ExtCommunity((**s).clone())),
            DefinedSetKind::LargeCommunity => self
                .large_community_sets
                .get(name)
                .map(|s| DefinedSet::LargeCommunity((**s).clone())),
            DefinedSetKind::NextHop => None,
        }
    }

    fn store_set(&mut self, set: DefinedSet) {
        match set {
            DefinedSet::Prefix(s) => {
                self.prefix_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::Neighbor(s) => {
                self.neighbor_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::Tag(s) => {
                self.tag_sets.insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::AsPath(s) => {
                self.as_path_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::Community(s) => {
                self.community_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::ExtCommunity(s) => {
                self.ext_community_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::LargeCommunity(s) => {
                self.large_community_sets
                    .insert(s.name().to_string(), Arc::new(s));
            }
            DefinedSet::NextHop(_) => {}
        }
    }

    fn drop_set(&mut self, kind: DefinedSetKind, name: &str) -> bool {
        match kind {
            DefinedSetKind::Prefix => {
                self.prefix_sets.remove(name).is_some()
            }
            DefinedSetKind::Neighbor => {
                self.neighbor_sets.remove(name).is_some()
            }
            DefinedSetKind::Tag => self.tag_sets.remove(name).is_some(),
            DefinedSetKind::AsPath => {
                self.as_path_sets.remove(name).is_some()
            }
            DefinedSetKind::Community => {
                self.community_sets.remove(name).is_some()
            }
            DefinedSetKind::ExtCommunity => {
                self.ext_community_sets.remove(name).is_some()
            }
            DefinedSetKind::LargeCommunity => {
                self.large_community_sets.remove(name).is_some()
            }
            DefinedSetKind::NextHop => false,
        }
    }

    fn load_policy(
        &mut self,
        config: &PolicyDefinitionConfig,
    ) -> Result<(), Error> {
        if self.policies.contains_key(&config.name) {
            return Err(Error::DuplicatePolicy(config.name.clone()));
        }
        let mut statements = Vec::with_capacity(config.statements.len());
        for sc in &config.statements {
            if self.statements.contains_key(&sc.name) {
                return Err(Error::DuplicateStatement(sc.name.clone()));
            }
            let statement = Arc::new(self.compile_statement(sc)?);
            self.statements.insert(sc.name.clone(), statement.clone());
            statements.push(statement);
        }
        self.policies.insert(
            config.name.clone(),
            Arc::new(Policy {
                name: config.name.clone(),
                statements,
            }),
        );
        Ok(())
    }

    fn assignment(
        &self,
        direction: Direction,
        policy_names: &[String],
        default: Verdict,
    ) -> Result<PolicyAssignment, Error> {
        let mut policies = Vec::with_capacity(policy_names.len());
        for name in policy_names {
            policies.push(
                self.policies
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownPolicy(name.clone()))?,
            );
        }
        Ok(PolicyAssignment {
            name: GLOBAL_RIB_NAME.to_string(),
            direction,
            policies,
            default,
        })
    }

    fn compile_statement(
        &self,
        config: &StatementConfig,
    ) -> Result<Statement, Error> {
        let cc = &config.conditions;
        let mut conditions = Vec::new();

        if !cc.match_prefix_set.prefix_set.is_empty() {
            let name = &cc.match_prefix_set.prefix_set;
            let set = self.prefix_sets.get(name).cloned().ok_or_else(|| {
                Error::UnknownSet(DefinedSetKind::Prefix, name.clone())
            })?;
            conditions.push(Condition::Prefix {
                option: cc.match_prefix_set.match_set_options.into(),
                set,
            });
        }
        if !cc.match_neighbor_set.neighbor_set.is_empty() {
            let name = &cc.match_neighbor_set.neighbor_set;
            let set =
                self.neighbor_sets.get(name).cloned().ok_or_else(|| {
                    Error::UnknownSet(DefinedSetKind::Neighbor, name.clone())
                })?;
            conditions.push(Condition::Neighbor {
                option: cc.match_neighbor_set.match_set_options.into(),
                set,
            });
        }
        if !cc.match_tag_set.tag_set.is_empty()
            && !self.tag_sets.contains_key(&cc.match_tag_set.tag_set)
        {
            return Err(Error::UnknownSet(
                DefinedSetKind::Tag,
                cc.match_tag_set.tag_set.clone(),
            ));
        }

        let bc = &cc.bgp_conditions;
        if !bc.match_as_path_set.as_path_set.is_empty() {
            let name = &bc.match_as_path_set.as_path_set;
            let set =
                self.as_path_sets.get(name).cloned().ok_or_else(|| {
                    Error::UnknownSet(DefinedSetKind::AsPath, name.clone())
                })?;
            conditions.push(Condition::AsPath {
                option: bc.match_as_path_set.match_set_options.into(),
                set,
            });
        }
        if !bc.match_community_set.community_set.is_empty() {
            let name = &bc.match_community_set.community_set;
            let set =
                self.community_sets.get(name).cloned().ok_or_else(|| {
                    Error::UnknownSet(DefinedSetKind::Community, name.clone())
                })?;
            conditions.push(Condition::Community {
                option: bc.match_community_set.match_set_options.into(),
                set,
            });
        }
        if !bc.match_ext_community_set.ext_community_set.is_empty() {
            let name = &bc.match_ext_community_set.ext_community_set;
            let set = self
                .ext_community_sets
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    Error::UnknownSet(
                        DefinedSetKind::ExtCommunity,
                        name.clone(),
                    )
                })?;
            conditions.push(Condition::ExtCommunity {
                option: bc.match_ext_community_set.match_set_options.into(),
                set,
            });
        }
        if !bc.match_large_community_set.large_community_set.is_empty() {
            let name = &bc.match_large_community_set.large_community_set;
            let set = self
                .large_community_sets
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    Error::UnknownSet(
                        DefinedSetKind::LargeCommunity,
                        name.clone(),
                    )
                })?;
            conditions.push(Condition::LargeCommunity {
                option: bc
                    .match_large_community_set
                    .match_set_options
                    .into(),
                set,
            });
        }
        if !bc.next_hop_in_list.is_empty() {
            conditions.push(Condition::NextHop(NextHopSet::from_list(
                &bc.next_hop_in_list,
            )?));
        }
        if !bc.afi_safi_in_list.is_empty() {
            let families = bc
                .afi_safi_in_list
                .iter()
                .map(|s| {
                    RouteFamily::from_str(s)
                        .map_err(|_| Error::InvalidRouteFamily(s.clone()))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            conditions.push(Condition::AfiSafiIn(families));
        }
        if let Some(length) = bc.as_path_length {
            conditions.push(Condition::AsPathLength {
                operator: length.operator,
                length: length.value,
            });
        }
        if let Some(kind) = bc.route_type {
            conditions.push(Condition::RouteType(kind));
        }
        if let Some(status) = bc.rpki_validation_result {
            conditions.push(Condition::Rpki(status));
        }
        if let Some(value) = bc.med_eq {
            conditions.push(Condition::MedEq(value));
        }
        if let Some(origin) = bc.origin_eq {
            conditions.push(Condition::OriginEq(origin));
        }
        if let Some(value) = bc.local_pref_eq {
            conditions.push(Condition::LocalPrefEq(value));
        }
        if let Some(count) = bc.community_count {
            conditions.push(Condition::CommunityCount {
                operator: count.operator,
                count: count.value,
            });
        }

        let ac = &config.actions;
        let route_action = match ac.route_disposition {
            RouteDisposition::AcceptRoute => {
                Some(RoutingAction { accept: true })
            }
            RouteDisposition::RejectRoute => {
                Some(RoutingAction { accept: false })
            }
            RouteDisposition::None => None,
        };

        let mut mod_actions = Vec::new();
        if let Some(c) = &ac.bgp_actions.set_community {
            mod_actions.push(Action::Community(
                crate::action::CommunityAction::new(
                    c.options,
                    &c.set_community_method.communities_list,
                )?,
            ));
        }
        if let Some(c) = &ac.bgp_actions.set_ext_community {
            mod_actions.push(Action::ExtCommunity(
                crate::action::ExtCommunityAction::new(
                    c.options,
                    &c.set_ext_community_method.communities_list,
                )?,
            ));
        }
        if let Some(c) = &ac.bgp_actions.set_large_community {
            mod_actions.push(Action::LargeCommunity(
                crate::action::LargeCommunityAction::new(
                    c.options,
                    &c.set_large_community_method.communities_list,
                )?,
            ));
        }
        if !ac.bgp_actions.set_med.is_empty() {
            mod_actions.push(Action::Med(ac.bgp_actions.set_med.parse()?));
        }
        if let Some(p) = &ac.bgp_actions.set_as_path_prepend {
            if !p.asn.is_empty() {
                mod_actions.push(Action::AsPathPrepend(
                    PrependAction::from_config(p)?,
                ));
            }
        }
        if !ac.bgp_actions.set_next_hop.is_empty() {
            mod_actions.push(Action::Nexthop(
                ac.bgp_actions.set_next_hop.parse()?,
            ));
        }
        if let Some(value) = ac.bgp_actions.set_local_pref {
            mod_actions.push(Action::LocalPref(value));
        }

        Ok(Statement {
            name: config.name.clone(),
            conditions,
            route_action,
            mod_actions,
            reserved: ReservedStatementConfig {
                call_policy: cc.call_policy.clone(),
                install_protocol_eq: cc.install_protocol_eq.clone(),
                match_tag_set: cc.match_tag_set.clone(),
                set_tag: ac.igp_actions.set_tag.clone(),
                set_route_origin: ac.bgp_actions.set_route_origin,
            },
        })
    }

    /// Rebuild every statement against the current defined sets, then
    /// re-point policies and assignments. Run after any set mutation so
    /// compiled conditions never hold a stale set.
    fn recompile(&mut self) -> Result<(), Error> {
        let statements: Vec<Arc<Statement>> =
            self.statements.values().cloned().collect();
        for statement in statements {
            let rebuilt = self.compile_statement(&statement.to_config())?;
            self.statements
                .insert(rebuilt.name.clone(), Arc::new(rebuilt));
        }
        self.relink()
    }

    /// Re-point policies at the current statements and assignments at the
    /// current policies.
    fn relink(&mut self) -> Result<(), Error> {
        let policies: Vec<Arc<Policy>> =
            self.policies.values().cloned().collect();
        for policy in policies {
            let statements = policy
                .statements
                .iter()
                .map(|s| {
                    self.statements.get(&s.name).cloned().ok_or_else(|| {
                        Error::UnknownStatement(s.name.clone())
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            self.policies.insert(
                policy.name.clone(),
                Arc::new(Policy {
                    name: policy.name.clone(),
                    statements,
                }),
            );
        }
        for direction in [Direction::Import, Direction::Export] {
            let current = match direction {
                Direction::Import => &self.import,
                Direction::Export => &self.export,
            };
            let policies = current
                .policies
                .iter()
                .map(|p| {
                    self.policies.get(&p.name).cloned().ok_or_else(|| {
                        Error::UnknownPolicy(p.name.clone())
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            let rebuilt = PolicyAssignment {
                name: current.name.clone(),
                direction,
                policies,
                default: current.default,
            };
            match direction {
                Direction::Import => self.import = rebuilt,
                Direction::Export => self.export = rebuilt,
            }
        }
        Ok(())
    }

    fn statement_referencing_set(
        &self,
        kind: DefinedSetKind,
        name: &str,
    ) -> Option<&Arc<Statement>> {
        self.statements.values().find(|s| {
            s.conditions.iter().any(|c| {
                set_kind_of_condition(c) == Some(kind)
                    && c.set_name() == Some(name)
            })
        })
    }

    fn patch_defined_set(
        &mut self,
        op: PatchOp,
        incoming: DefinedSet,
        remove_whole_set: bool,
    ) -> Result<(), Error> {
        let kind = incoming.kind();
        let name = incoming.name().to_string();
        match op {
            PatchOp::Add => match self.lookup_set(kind, &name) {
                Some(mut current) => {
                    current.append(&incoming)?;
                    self.store_set(current);
                }
                None => self.store_set(incoming),
            },
            PatchOp::Remove if remove_whole_set => {
                if let Some(statement) =
                    self.statement_referencing_set(kind, &name)
                {
                    return Err(Error::SetInUse(
                        kind,
                        name,
                        statement.name.clone(),
                    ));
                }
                if !self.drop_set(kind, &name) {
                    return Err(Error::UnknownSet(kind, name));
                }
            }
            PatchOp::Remove => {
                let mut current = self
                    .lookup_set(kind, &name)
                    .ok_or_else(|| Error::UnknownSet(kind, name.clone()))?;
                current.remove(&incoming)?;
                self.store_set(current);
            }
            PatchOp::Replace => {
                let mut current = self
                    .lookup_set(kind, &name)
                    .ok_or_else(|| Error::UnknownSet(kind, name.clone()))?;
                current.replace(incoming)?;
                self.store_set(current);
            }
        }
        self.recompile()
    }

    fn patch_statement(
        &mut self,
        op: PatchOp,
        config: &StatementConfig,
    ) -> Result<(), Error> {
        match op {
            PatchOp::Add => {
                if self.statements.contains_key(&config.name) {
                    return Err(Error::DuplicateStatement(
                        config.name.clone(),
                    ));
                }
                let statement = self.compile_statement(config)?;
                self.statements
                    .insert(config.name.clone(), Arc::new(statement));
                Ok(())
            }
            PatchOp::Remove => {
                if let Some(policy) = self.policies.values().find(|p| {
                    p.statements.iter().any(|s| s.name == config.name)
                }) {
                    return Err(Error::StatementInUse(
                        config.name.clone(),
                        policy.name.clone(),
                    ));
                }
                self.statements.remove(&config.name).ok_or_else(|| {
                    Error::UnknownStatement(config.name.clone())
                })?;
                Ok(())
            }
            PatchOp::Replace => {
                if !self.statements.contains_key(&config.name) {
                    return Err(Error::UnknownStatement(
                        config.name.clone(),
                    ));
                }
                let statement = self.compile_statement(config)?;
                self.statements
                    .insert(config.name.clone(), Arc::new(statement));
                self.relink()
            }
        }
    }

    fn patch_policy(
        &mut self,
        op: PatchOp,
        config: &PolicyDefinitionConfig,
    ) -> Result<(), Error> {
        match op {
            PatchOp::Add => self.load_policy(config),
            PatchOp::Remove => {
                for assignment in [&self.import, &self.export] {
                    if assignment
                        .policies
                        .iter()
                        .any(|p| p.name == config.name)
                    {
                        return Err(Error::PolicyInUse(
                            config.name.clone(),
                            assignment.direction,
                        ));
                    }
                }
                self.policies.remove(&config.name).ok_or_else(|| {
                    Error::UnknownPolicy(config.name.clone())
                })?;
                Ok(())
            }
            PatchOp::Replace => {
                if !self.policies.contains_key(&config.name) {
                    return Err(Error::UnknownPolicy(config.name.clone()));
                }
                let mut statements =
                    Vec::with_capacity(config.statements.len());
                for sc in &config.statements {
                    let statement = Arc::new(self.compile_statement(sc)?);
                    self.statements
                        .insert(sc.name.clone(), statement.clone());
                    statements.push(statement);
                }
                self.policies.insert(
                    config.name.clone(),
                    Arc::new(Policy {
                        name: config.name.clone(),
                        statements,
                    }),
                );
                self.relink()
            }
        }
    }

    fn patch_assignment(
        &mut self,
        op: PatchOp,
        config: &PolicyAssignmentConfig,
    ) -> Result<(), Error> {
        let mut resolved = Vec::with_capacity(config.policies.len());
        for name in &config.policies {
            resolved.push(
                self.policies
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownPolicy(name.clone()))?,
            );
        }
        let current = match config.direction {
            Direction::Import => &mut self.import,
            Direction::Export => &mut self.export,
        };
        match op {
            PatchOp::Add => {
                for policy in &resolved {
                    if current
                        .policies
                        .iter()
                        .any(|p| p.name == policy.name)
                    {
                        return Err(Error::DuplicatePolicy(
                            policy.name.clone(),
                        ));
                    }
                }
                current.policies.extend(resolved);
                if config.default_action != RouteDisposition::None {
                    current.default =
                        disposition_verdict(config.default_action);
                }
            }
            PatchOp::Remove => {
                if config.policies.is_empty() {
                    current.policies.clear();
                    current.default = Verdict::Continue;
                } else {
                    current.policies.retain(|p| {
                        !config.policies.contains(&p.name)
                    });
                }
            }
            PatchOp::Replace => {
                current.policies = resolved;
                current.default =
                    disposition_verdict(config.default_action);
            }
        }
        if !config.name.is_empty() {
            current.name = config.name.clone();
        }
        Ok(())
    }

    fn patch(
        &mut self,
        op: PatchOp,
        entity: PatchEntity,
    ) -> Result<(), Error> {
        match entity {
            PatchEntity::PrefixSet(c) => {
                let whole = c.prefix_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::Prefix(PrefixSet::from_config(&c)?),
                    whole,
                )
            }
            PatchEntity::NeighborSet(c) => {
                let whole = c.neighbor_info_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::Neighbor(NeighborSet::from_config(&c)?),
                    whole,
                )
            }
            PatchEntity::TagSet(c) => {
                let whole = c.tag_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::Tag(TagSet::from_config(&c)?),
                    whole,
                )
            }
            PatchEntity::AsPathSet(c) => {
                let whole = c.as_path_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::AsPath(AsPathSet::from_config(&c)?),
                    whole,
                )
            }
            PatchEntity::CommunitySet(c) => {
                let whole = c.community_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::Community(CommunitySet::from_config(&c)?),
                    whole,
                )
            }
            PatchEntity::ExtCommunitySet(c) => {
                let whole = c.ext_community_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::ExtCommunity(ExtCommunitySet::from_config(
                        &c,
                    )?),
                    whole,
                )
            }
            PatchEntity::LargeCommunitySet(c) => {
                let whole = c.large_community_list.is_empty();
                self.patch_defined_set(
                    op,
                    DefinedSet::LargeCommunity(
                        LargeCommunitySet::from_config(&c)?,
                    ),
                    whole,
                )
            }
            PatchEntity::Statement(c) => self.patch_statement(op, &c),
            PatchEntity::Policy(c) => self.patch_policy(op, &c),
            PatchEntity::Assignment(c) => self.patch_assignment(op, &c),
        }
    }

    fn export(&self) -> (RoutingPolicyConfig, ApplyPolicyConfig) {
        let config = RoutingPolicyConfig {
            defined_sets: DefinedSetsConfig {
                prefix_sets: self
                    .prefix_sets
                    .values()
                    .map(|s| s.to_config())
                    .collect(),
                neighbor_sets: self
                    .neighbor_sets
                    .values()
                    .map(|s| s.to_config())
                    .collect(),
                tag_sets: self
                    .tag_sets
                    .values()
                    .map(|s| s.to_config())
                    .collect(),
                bgp_defined_sets: BgpDefinedSetsConfig {
                    community_sets: self
                        .community_sets
                        .values()
                        .map(|s| s.to_config())
                        .collect(),
                    ext_community_sets: self
                        .ext_community_sets
                        .values()
                        .map(|s| s.to_config())
                        .collect(),
                    as_path_sets: self
                        .as_path_sets
                        .values()
                        .map(|s| s.to_config())
                        .collect(),
                    large_community_sets: self
                        .large_community_sets
                        .values()
                        .map(|s| s.to_config())
                        .collect(),
                },
            },
            policy_definitions: self
                .policies
                .values()
                .map(|p| p.to_config())
                .collect(),
        };
        let apply = ApplyPolicyConfig {
            import_policy_list: self
                .import
                .policies
                .iter()
                .map(|p| p.name.clone())
                .collect(),
            default_import_policy: export_default(self.import.default),
            export_policy_list: self
                .export
                .policies
                .iter()
                .map(|p| p.name.clone())
                .collect(),
            default_export_policy: export_default(self.export.default),
        };
        (config, apply)
    }
}

fn default_verdict(value: DefaultPolicyType) -> Verdict {
    match value {
        DefaultPolicyType::AcceptRoute => Verdict::Accept,
        DefaultPolicyType::RejectRoute => Verdict::Reject,
    }
}

fn export_default(value: Verdict) -> DefaultPolicyType {
    match value {
        Verdict::Reject => DefaultPolicyType::RejectRoute,
        // Continue defers to the outer default, which accepts.
        Verdict::Accept | Verdict::Continue => {
            DefaultPolicyType::AcceptRoute
        }
    }
}

fn disposition_verdict(value: RouteDisposition) -> Verdict {
    match value {
        RouteDisposition::AcceptRoute => Verdict::Accept,
        RouteDisposition::RejectRoute => Verdict::Reject,
        RouteDisposition::None => Verdict::Continue,
    }
}

fn set_kind_of_condition(c: &Condition) -> Option<DefinedSetKind> {
    match c {
        Condition::Prefix { .. } => Some(DefinedSetKind::Prefix),
        Condition::Neighbor { .. } => Some(DefinedSetKind::Neighbor),
        Condition::AsPath { .. } => Some(DefinedSetKind::AsPath),
        Condition::Community { .. } => Some(DefinedSetKind::Community),
        Condition::ExtCommunity { .. } => Some(DefinedSetKind::ExtCommunity),
        Condition::LargeCommunity { .. } => {
            Some(DefinedSetKind::LargeCommunity)
        }
        _ => None,
    }
}

/// The policy evaluation engine: a shared registry plus the evaluation
/// entry point. Cloning the engine shares the registry.
#[derive(Clone)]
pub struct PolicyEngine {
    inner: Arc<RwLock<RoutingPolicy>>,
    log: Logger,
}

impl PolicyEngine {
    pub fn new(log: Logger) -> Self {
        PolicyEngine {
            inner: Arc::new(RwLock::new(RoutingPolicy::new())),
            log,
        }
    }

    /// Atomically replace the whole registry with one built from the
    /// given configuration. On error the running policy is untouched.
    pub fn install(
        &self,
        config: &RoutingPolicyConfig,
        apply: &ApplyPolicyConfig,
    ) -> Result<(), Error> {
        let next = RoutingPolicy::build(config, apply)?;
        let mut inner = write_lock!(self.inner);
        *inner = next;
        debug!(
            self.log,
            "installed routing policy";
            "policies" => inner.policies.len(),
            "statements" => inner.statements.len()
        );
        Ok(())
    }

    /// Incrementally change one entity. The change is applied to a clone
    /// of the registry and swapped in only on success.
    pub fn patch(
        &self,
        op: PatchOp,
        entity: PatchEntity,
    ) -> Result<(), Error> {
        let mut inner = write_lock!(self.inner);
        let mut next = inner.clone();
        next.patch(op, entity)?;
        *inner = next;
        Ok(())
    }

    /// Run a path through the assignment for `direction`. The input is
    /// never mutated; the returned path shares structure with it and must
    /// be treated as immutable. All policies falling through applies the
    /// assignment default, and an unset default accepts.
    pub fn evaluate(
        &self,
        direction: Direction,
        path: &Arc<Path>,
        options: &PolicyOptions,
    ) -> (Arc<Path>, Disposition) {
        let inner = read_lock!(self.inner);
        let assignment = match direction {
            Direction::Import => &inner.import,
            Direction::Export => &inner.export,
        };
        let mut working = path.branch(path.is_withdraw);
        let verdict = assignment.evaluate(&mut working, options, &self.log);
        let disposition = match verdict {
            Verdict::Reject => Disposition::Reject,
            Verdict::Accept | Verdict::Continue => Disposition::Accept,
        };
        (Arc::new(working), disposition)
    }

    /// Round-trip the live registry back into configuration structures.
    pub fn export_config(
        &self,
    ) -> (RoutingPolicyConfig, ApplyPolicyConfig) {
        read_lock!(self.inner).export()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attrs::{
        AsSegment, Community, Nlri, Origin, PathAttr, PathAttrType,
    };
    use crate::config::{
        ActionsConfig, BgpActionsConfig, BgpConditionsConfig,
        ConditionsConfig, MatchPrefixSetConfig,
        MatchSetOptionsRestrictedType, PrefixConfig,
        SetAsPathPrependConfig, SetCommunityConfig,
        SetCommunityMethodConfig,
    };
    use crate::path::PeerInfo;
    use chrono::Utc;
    use pe_common::log::init_logger;
    use pretty_assertions::assert_eq;

    fn test_path(nlri: &str, attrs: Vec<PathAttr>) -> Arc<Path> {
        Arc::new(
            Path::new(
                PeerInfo {
                    asn: 65002,
                    local_asn: 65001,
                    address: Some("198.51.100.2".parse().unwrap()),
                    ..Default::default()
                },
                Nlri::new(nlri.parse().unwrap()),
                false,
                attrs,
                Utc::now(),
                false,
            )
            .unwrap(),
        )
    }

    fn prefix_set_config(
        name: &str,
        prefix: &str,
        range: &str,
    ) -> PrefixSetConfig {
        PrefixSetConfig {
            prefix_set_name: name.to_string(),
            prefix_list: vec![PrefixConfig {
                ip_prefix: prefix.to_string(),
                masklength_range: range.to_string(),
            }],
        }
    }

    fn match_prefix_statement(
        name: &str,
        set: &str,
        options: MatchSetOptionsRestrictedType,
        disposition: RouteDisposition,
    ) -> StatementConfig {
        StatementConfig {
            name: name.to_string(),
            conditions: ConditionsConfig {
                match_prefix_set: MatchPrefixSetConfig {
                    prefix_set: set.to_string(),
                    match_set_options: options,
                },
                ..Default::default()
            },
            actions: ActionsConfig {
                route_disposition: disposition,
                ..Default::default()
            },
        }
    }

    fn single_policy_config(
        sets: DefinedSetsConfig,
        statement: StatementConfig,
    ) -> RoutingPolicyConfig {
        RoutingPolicyConfig {
            defined_sets: sets,
            policy_definitions: vec![PolicyDefinitionConfig {
                name: "p1".to_string(),
                statements: vec![statement],
            }],
        }
    }

    fn import_apply(default: DefaultPolicyType) -> ApplyPolicyConfig {
        ApplyPolicyConfig {
            import_policy_list: vec!["p1".to_string()],
            default_import_policy: default,
            ..Default::default()
        }
    }

    fn engine_with(
        config: &RoutingPolicyConfig,
        apply: &ApplyPolicyConfig,
    ) -> PolicyEngine {
        let engine = PolicyEngine::new(init_logger());
        engine.install(config, apply).unwrap();
        engine
    }

    #[test]
    fn accept_by_prefix_match() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            ..Default::default()
        };
        let config = single_policy_config(
            sets,
            match_prefix_statement(
                "st1",
                "s1",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
    }

    #[test]
    fn invert_prefix_match() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            ..Default::default()
        };
        let config = single_policy_config(
            sets,
            match_prefix_statement(
                "st1",
                "s1",
                MatchSetOptionsRestrictedType::Invert,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "192.168.1.0/24",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
    }

    #[test]
    fn as_path_length_falls_through() {
        let statement = StatementConfig {
            name: "st1".to_string(),
            conditions: ConditionsConfig {
                bgp_conditions: BgpConditionsConfig {
                    as_path_length: Some(
                        crate::config::AsPathLengthConfig {
                            operator: crate::condition::Comparison::Ge,
                            value: 4,
                        },
                    ),
                    ..Default::default()
                },
                ..Default::default()
            },
            actions: ActionsConfig {
                route_disposition: RouteDisposition::RejectRoute,
                ..Default::default()
            },
        };
        let config =
            single_policy_config(DefinedSetsConfig::default(), statement);
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::AcceptRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![
                PathAttr::Origin(Origin::Igp),
                PathAttr::AsPath(vec![AsSegment::sequence(vec![
                    65001, 65002, 65003,
                ])]),
            ],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        // length 3 does not satisfy ge 4, so the statement does not fire
        assert_eq!(disposition, Disposition::Accept);
    }

    #[test]
    fn community_add_then_accept() {
        let statement = StatementConfig {
            name: "st1".to_string(),
            conditions: ConditionsConfig::default(),
            actions: ActionsConfig {
                route_disposition: RouteDisposition::AcceptRoute,
                bgp_actions: BgpActionsConfig {
                    set_community: Some(SetCommunityConfig {
                        options:
                            crate::config::CommunityOptionType::Add,
                        set_community_method: SetCommunityMethodConfig {
                            communities_list: vec!["65000:1".to_string()],
                            community_set_ref: String::new(),
                        },
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        };
        let config =
            single_policy_config(DefinedSetsConfig::default(), statement);
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![
                PathAttr::Origin(Origin::Igp),
                PathAttr::Communities(vec![Community((65000 << 16) | 2)]),
            ],
        );
        let (out, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
        assert_eq!(
            out.communities(),
            vec![Community((65000 << 16) | 2), Community((65000 << 16) | 1)]
        );
        // copy-on-write: the input path is untouched
        assert_eq!(
            path.communities(),
            vec![Community((65000 << 16) | 2)]
        );
    }

    #[test]
    fn prepend_last_as_three_times() {
        let statement = StatementConfig {
            name: "st1".to_string(),
            conditions: ConditionsConfig::default(),
            actions: ActionsConfig {
                route_disposition: RouteDisposition::AcceptRoute,
                bgp_actions: BgpActionsConfig {
                    set_as_path_prepend: Some(SetAsPathPrependConfig {
                        repeat_n: 3,
                        asn: "last-as".to_string(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        };
        let config =
            single_policy_config(DefinedSetsConfig::default(), statement);
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![
                PathAttr::Origin(Origin::Igp),
                PathAttr::AsPath(vec![AsSegment::sequence(vec![100, 200])]),
            ],
        );
        let (out, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
        assert_eq!(out.as_seq_list(), vec![100, 100, 100, 100, 200]);
    }

    #[test]
    fn fall_through_to_default_reject() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config(
                "s1",
                "172.16.0.0/12",
                "12..24",
            )],
            ..Default::default()
        };
        let config = single_policy_config(
            sets,
            match_prefix_statement(
                "st1",
                "s1",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (out, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Reject);
        // the path comes back unchanged
        assert!(out.equal(&path));
    }

    #[test]
    fn unset_direction_defaults_accept() {
        let engine = PolicyEngine::new(init_logger());
        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Export,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
    }

    #[test]
    fn install_rejects_unknown_references() {
        let engine = PolicyEngine::new(init_logger());

        // statement referencing a set that is not defined
        let config = single_policy_config(
            DefinedSetsConfig::default(),
            match_prefix_statement(
                "st1",
                "nope",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        assert!(matches!(
            engine.install(&config, &ApplyPolicyConfig::default()),
            Err(Error::UnknownSet(DefinedSetKind::Prefix, _))
        ));

        // assignment referencing a policy that is not defined
        let apply = ApplyPolicyConfig {
            import_policy_list: vec!["ghost".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            engine.install(&RoutingPolicyConfig::default(), &apply),
            Err(Error::UnknownPolicy(_))
        ));

        // a failed install leaves the previous (empty) registry running
        let (config, _) = engine.export_config();
        assert!(config.policy_definitions.is_empty());
    }

    #[test]
    fn patch_set_append_is_seen_by_compiled_statements() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            ..Default::default()
        };
        let config = single_policy_config(
            sets,
            match_prefix_statement(
                "st1",
                "s1",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "172.16.1.0/24",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, before) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(before, Disposition::Reject);

        engine
            .patch(
                PatchOp::Add,
                PatchEntity::PrefixSet(prefix_set_config(
                    "s1",
                    "172.16.0.0/12",
                    "12..24",
                )),
            )
            .unwrap();

        let (_, after) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(after, Disposition::Accept);
    }

    #[test]
    fn patch_remove_set_in_use_fails() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            ..Default::default()
        };
        let config = single_policy_config(
            sets,
            match_prefix_statement(
                "st1",
                "s1",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let whole_set = PrefixSetConfig {
            prefix_set_name: "s1".to_string(),
            prefix_list: vec![],
        };
        assert!(matches!(
            engine.patch(
                PatchOp::Remove,
                PatchEntity::PrefixSet(whole_set)
            ),
            Err(Error::SetInUse(DefinedSetKind::Prefix, _, _))
        ));
    }

    #[test]
    fn patch_assignment_append_and_clear() {
        let config = RoutingPolicyConfig {
            defined_sets: DefinedSetsConfig::default(),
            policy_definitions: vec![
                PolicyDefinitionConfig {
                    name: "p1".to_string(),
                    statements: vec![match_prefix_statement(
                        "st1",
                        "",
                        MatchSetOptionsRestrictedType::Any,
                        RouteDisposition::RejectRoute,
                    )],
                },
                PolicyDefinitionConfig {
                    name: "p2".to_string(),
                    statements: vec![],
                },
            ],
        };
        let engine = engine_with(&config, &ApplyPolicyConfig::default());

        engine
            .patch(
                PatchOp::Add,
                PatchEntity::Assignment(PolicyAssignmentConfig {
                    name: GLOBAL_RIB_NAME.to_string(),
                    direction: Direction::Import,
                    policies: vec!["p1".to_string()],
                    default_action: RouteDisposition::AcceptRoute,
                }),
            )
            .unwrap();

        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        // st1 has no conditions: it always fires and rejects
        assert_eq!(disposition, Disposition::Reject);

        // appending the same policy again is refused
        assert!(matches!(
            engine.patch(
                PatchOp::Add,
                PatchEntity::Assignment(PolicyAssignmentConfig {
                    name: GLOBAL_RIB_NAME.to_string(),
                    direction: Direction::Import,
                    policies: vec!["p1".to_string()],
                    default_action: RouteDisposition::None,
                }),
            ),
            Err(Error::DuplicatePolicy(_))
        ));

        // clearing the assignment restores the outer accept
        engine
            .patch(
                PatchOp::Remove,
                PatchEntity::Assignment(PolicyAssignmentConfig {
                    name: GLOBAL_RIB_NAME.to_string(),
                    direction: Direction::Import,
                    policies: vec![],
                    default_action: RouteDisposition::None,
                }),
            )
            .unwrap();
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Accept);
    }

    #[test]
    fn export_round_trip_is_stable() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            neighbor_sets: vec![NeighborSetConfig {
                neighbor_set_name: "ns1".to_string(),
                neighbor_info_list: vec!["198.51.100.0/24".to_string()],
            }],
            bgp_defined_sets: BgpDefinedSetsConfig {
                community_sets: vec![CommunitySetConfig {
                    community_set_name: "cs1".to_string(),
                    community_list: vec!["65000:1".to_string()],
                }],
                as_path_sets: vec![AsPathSetConfig {
                    as_path_set_name: "aps1".to_string(),
                    as_path_list: vec![
                        "^65001_".to_string(),
                        "_65002$".to_string(),
                    ],
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let mut statement = match_prefix_statement(
            "st1",
            "s1",
            MatchSetOptionsRestrictedType::Any,
            RouteDisposition::AcceptRoute,
        );
        statement.actions.bgp_actions.set_med = "+10".to_string();
        statement.actions.bgp_actions.set_local_pref = Some(200);
        let config = single_policy_config(sets, statement);
        let apply = import_apply(DefaultPolicyType::RejectRoute);

        let engine = engine_with(&config, &apply);
        let (exported, exported_apply) = engine.export_config();

        // reinstalling the exported configuration must reproduce it
        let second = PolicyEngine::new(init_logger());
        second.install(&exported, &exported_apply).unwrap();
        let (reexported, reexported_apply) = second.export_config();
        assert_eq!(exported, reexported);
        assert_eq!(exported_apply, reexported_apply);

        // spot checks against the original input
        assert_eq!(exported.defined_sets.prefix_sets.len(), 1);
        assert_eq!(
            exported.defined_sets.prefix_sets[0].prefix_list[0]
                .masklength_range,
            "8..24"
        );
        assert_eq!(
            exported_apply.default_import_policy,
            DefaultPolicyType::RejectRoute
        );
        assert_eq!(
            exported.policy_definitions[0].statements[0]
                .actions
                .bgp_actions
                .set_med,
            "+10"
        );
    }

    #[test]
    fn evaluation_is_deterministic_across_threads() {
        let sets = DefinedSetsConfig {
            prefix_sets: vec![prefix_set_config("s1", "10.0.0.0/8", "8..24")],
            ..Default::default()
        };
        let mut statement = match_prefix_statement(
            "st1",
            "s1",
            MatchSetOptionsRestrictedType::Any,
            RouteDisposition::AcceptRoute,
        );
        statement.actions.bgp_actions.set_community =
            Some(SetCommunityConfig {
                options: crate::config::CommunityOptionType::Add,
                set_community_method: SetCommunityMethodConfig {
                    communities_list: vec!["65000:1".to_string()],
                    community_set_ref: String::new(),
                },
            });
        let config = single_policy_config(sets, statement);
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (reference, reference_disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        let reference_attrs: Vec<PathAttr> = reference
            .path_attrs()
            .into_iter()
            .cloned()
            .collect();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let mut results = Vec::new();
                for _ in 0..50 {
                    let (out, disposition) = engine.evaluate(
                        Direction::Import,
                        &path,
                        &PolicyOptions::default(),
                    );
                    let attrs: Vec<PathAttr> = out
                        .path_attrs()
                        .into_iter()
                        .cloned()
                        .collect();
                    results.push((attrs, disposition));
                }
                results
            }));
        }
        for handle in handles {
            for (attrs, disposition) in handle.join().unwrap() {
                assert_eq!(disposition, reference_disposition);
                assert_eq!(attrs, reference_attrs);
            }
        }

        // the shared input was never mutated
        assert!(path.attr(PathAttrType::Communities).is_none());
    }

    #[test]
    fn statement_patch_lifecycle() {
        let config = single_policy_config(
            DefinedSetsConfig::default(),
            match_prefix_statement(
                "st1",
                "",
                MatchSetOptionsRestrictedType::Any,
                RouteDisposition::AcceptRoute,
            ),
        );
        let engine = engine_with(
            &config,
            &import_apply(DefaultPolicyType::RejectRoute),
        );

        // st1 is referenced by p1
        assert!(matches!(
            engine.patch(
                PatchOp::Remove,
                PatchEntity::Statement(StatementConfig {
                    name: "st1".to_string(),
                    ..Default::default()
                }),
            ),
            Err(Error::StatementInUse(_, _))
        ));

        // a replacement flips the disposition and policies re-link to it
        let replacement = match_prefix_statement(
            "st1",
            "",
            MatchSetOptionsRestrictedType::Any,
            RouteDisposition::RejectRoute,
        );
        engine
            .patch(PatchOp::Replace, PatchEntity::Statement(replacement))
            .unwrap();
        let path = test_path(
            "10.1.0.0/16",
            vec![PathAttr::Origin(Origin::Igp)],
        );
        let (_, disposition) = engine.evaluate(
            Direction::Import,
            &path,
            &PolicyOptions::default(),
        );
        assert_eq!(disposition, Disposition::Reject);

        // adding a statement with a taken name is refused
        assert!(matches!(
            engine.patch(
                PatchOp::Add,
                PatchEntity::Statement(StatementConfig {
                    name: "st1".to_string(),
                    ..Default::default()
                }),
            ),
            Err(Error::DuplicateStatement(_))
        ));
    }
}
