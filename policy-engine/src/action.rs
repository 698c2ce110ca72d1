// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mod-actions: the attribute transformations a fired statement applies.
//! Action soft-failures (MED out of range, prepending last-as onto an
//! empty AS_PATH, nexthop-self without a local address) are logged and
//! leave the path unchanged.

use crate::attrs::{Community, ExtCommunity, LargeCommunity, PathAttr};
use crate::config::{
    CommunityOptionType, SetAsPathPrependConfig, SetCommunityConfig,
    SetCommunityMethodConfig, SetExtCommunityConfig,
    SetExtCommunityMethodConfig, SetLargeCommunityConfig,
    SetLargeCommunityMethodConfig,
};
use crate::error::Error;
use crate::path::Path;
use crate::policy::PolicyOptions;
use crate::sets::{
    parse_community, parse_community_regexp, parse_ext_community,
    parse_ext_community_regexp, parse_large_community_regexp,
};
use lazy_static::lazy_static;
use regex::Regex;
use slog::{warn, Logger};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

lazy_static! {
    static ref MED_ACTION_RE: Regex =
        Regex::new(r"^([+-]?)(\d+)$").unwrap();
}

/// The terminal decision a statement can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingAction {
    pub accept: bool,
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accept {
            write!(f, "accept")
        } else {
            write!(f, "reject")
        }
    }
}

/// Community action: add a list, remove by pattern, or replace wholesale.
#[derive(Debug, Clone)]
pub struct CommunityAction {
    pub op: CommunityOptionType,
    pub list: Vec<Community>,
    pub remove_list: Vec<Regex>,
}

impl CommunityAction {
    pub fn new(
        op: CommunityOptionType,
        members: &[String],
    ) -> Result<Self, Error> {
        let mut list = Vec::new();
        let mut remove_list = Vec::new();
        match op {
            CommunityOptionType::Add | CommunityOptionType::Replace => {
                for m in members {
                    list.push(parse_community(m)?);
                }
            }
            CommunityOptionType::Remove => {
                for m in members {
                    remove_list.push(parse_community_regexp(m)?);
                }
            }
        }
        Ok(CommunityAction {
            op,
            list,
            remove_list,
        })
    }

    fn apply(&self, path: &mut Path) {
        match self.op {
            CommunityOptionType::Add => {
                path.set_communities(&self.list, false)
            }
            CommunityOptionType::Replace => {
                path.set_communities(&self.list, true)
            }
            CommunityOptionType::Remove => {
                let kept: Vec<Community> = path
                    .communities()
                    .into_iter()
                    .filter(|c| {
                        let formatted = c.to_string();
                        !self
                            .remove_list
                            .iter()
                            .any(|re| re.is_match(&formatted))
                    })
                    .collect();
                path.set_communities(&kept, true);
            }
        }
    }

    pub fn to_config(&self) -> SetCommunityConfig {
        let mut communities_list: Vec<String> =
            self.list.iter().map(|c| c.to_string()).collect();
        communities_list
            .extend(self.remove_list.iter().map(|re| re.to_string()));
        SetCommunityConfig {
            options: self.op,
            set_community_method: SetCommunityMethodConfig {
                communities_list,
                community_set_ref: String::new(),
            },
        }
    }
}

/// Extended-community action. Removal patterns apply within their subtype
/// and only to transitive communities.
#[derive(Debug, Clone)]
pub struct ExtCommunityAction {
    pub op: CommunityOptionType,
    pub list: Vec<ExtCommunity>,
    pub remove_list: Vec<Regex>,
    pub subtypes: Vec<u8>,
}

impl ExtCommunityAction {
    pub fn new(
        op: CommunityOptionType,
        members: &[String],
    ) -> Result<Self, Error> {
        let mut list = Vec::new();
        let mut remove_list = Vec::new();
        let mut subtypes = Vec::new();
        match op {
            CommunityOptionType::Add | CommunityOptionType::Replace => {
                for m in members {
                    list.push(parse_ext_community(m)?);
                }
            }
            CommunityOptionType::Remove => {
                for m in members {
                    let (subtype, re) = parse_ext_community_regexp(m)?;
                    remove_list.push(re);
                    subtypes.push(subtype);
                }
            }
        }
        Ok(ExtCommunityAction {
            op,
            list,
            remove_list,
            subtypes,
        })
    }

    fn apply(&self, path: &mut Path) {
        match self.op {
            CommunityOptionType::Add => {
                path.set_ext_communities(&self.list, false)
            }
            CommunityOptionType::Replace => {
                path.set_ext_communities(&self.list, true)
            }
            CommunityOptionType::Remove => {
                let kept: Vec<ExtCommunity> = path
                    .ext_communities()
                    .into_iter()
                    .filter(|c| {
                        if !c.is_transitive() {
                            return true;
                        }
                        let formatted = c.to_string();
                        !self
                            .remove_list
                            .iter()
                            .zip(self.subtypes.iter())
                            .any(|(re, subtype)| {
                                c.subtype == *subtype
                                    && re.is_match(&formatted)
                            })
                    })
                    .collect();
                path.set_ext_communities(&kept, true);
            }
        }
    }

    pub fn to_config(&self) -> SetExtCommunityConfig {
        let tag = |subtype: u8, body: String| match subtype {
            crate::attrs::EXT_SUBTYPE_ROUTE_TARGET => format!("rt:{body}"),
            crate::attrs::EXT_SUBTYPE_ROUTE_ORIGIN => format!("soo:{body}"),
            crate::attrs::EXT_SUBTYPE_ORIGIN_VALIDATION => body,
            other => format!("{other}:{body}"),
        };
        let mut communities_list: Vec<String> = self
            .list
            .iter()
            .map(|c| tag(c.subtype, c.to_string()))
            .collect();
        communities_list.extend(
            self.remove_list
                .iter()
                .zip(self.subtypes.iter())
                .map(|(re, subtype)| tag(*subtype, re.to_string())),
        );
        SetExtCommunityConfig {
            options: self.op,
            set_ext_community_method: SetExtCommunityMethodConfig {
                communities_list,
            },
        }
    }
}

/// Large-community action.
#[derive(Debug, Clone)]
pub struct LargeCommunityAction {
    pub op: CommunityOptionType,
    pub list: Vec<LargeCommunity>,
    pub remove_list: Vec<Regex>,
}

impl LargeCommunityAction {
    pub fn new(
        op: CommunityOptionType,
        members: &[String],
    ) -> Result<Self, Error> {
        let mut list = Vec::new();
        let mut remove_list = Vec::new();
        match op {
            CommunityOptionType::Add | CommunityOptionType::Replace => {
                for m in members {
                    list.push(m.parse::<LargeCommunity>().map_err(|_| {
                        Error::InvalidLargeCommunity(m.clone())
                    })?);
                }
            }
            CommunityOptionType::Remove => {
                for m in members {
                    remove_list.push(parse_large_community_regexp(m)?);
                }
            }
        }
        Ok(LargeCommunityAction {
            op,
            list,
            remove_list,
        })
    }

    fn apply(&self, path: &mut Path) {
        match self.op {
            CommunityOptionType::Add => {
                path.set_large_communities(&self.list, false)
            }
            CommunityOptionType::Replace => {
                path.set_large_communities(&self.list, true)
            }
            CommunityOptionType::Remove => {
                let kept: Vec<LargeCommunity> = path
                    .large_communities()
                    .into_iter()
                    .filter(|c| {
                        let formatted = c.to_string();
                        !self
                            .remove_list
                            .iter()
                            .any(|re| re.is_match(&formatted))
                    })
                    .collect();
                path.set_large_communities(&kept, true);
            }
        }
    }

    pub fn to_config(&self) -> SetLargeCommunityConfig {
        let mut communities_list: Vec<String> =
            self.list.iter().map(|c| c.to_string()).collect();
        communities_list
            .extend(self.remove_list.iter().map(|re| re.to_string()));
        SetLargeCommunityConfig {
            options: self.op,
            set_large_community_method: SetLargeCommunityMethodConfig {
                communities_list,
            },
        }
    }
}

/// MED action: replace outright or shift by a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedAction {
    Replace(i64),
    Mod(i64),
}

impl MedAction {
    fn apply(&self, path: &mut Path, log: &Logger) {
        let result = match self {
            MedAction::Replace(value) => path.set_med(*value, true),
            MedAction::Mod(value) => path.set_med(*value, false),
        };
        if let Err(e) = result {
            warn!(log, "could not set med on path: {e}");
        }
    }

    pub fn to_config(&self) -> String {
        match self {
            MedAction::Mod(value) if *value > 0 => format!("+{value}"),
            MedAction::Mod(value) => format!("{value}"),
            MedAction::Replace(value) => format!("{value}"),
        }
    }
}

impl FromStr for MedAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = MED_ACTION_RE
            .captures(s)
            .ok_or_else(|| Error::InvalidMedFormat(s.to_string()))?;
        let value: i64 = format!("{}{}", &caps[1], &caps[2])
            .parse()
            .map_err(|_| Error::InvalidMedFormat(s.to_string()))?;
        match &caps[1] {
            "+" | "-" => Ok(MedAction::Mod(value)),
            _ => Ok(MedAction::Replace(value)),
        }
    }
}

/// The ASN an AS-path prepend action inserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrependAs {
    Asn(u32),
    /// Repeat the leftmost ASN already on the path.
    LastAs,
}

/// AS-path prepend action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrependAction {
    pub asn: PrependAs,
    pub repeat: u8,
}

impl PrependAction {
    pub fn from_config(
        c: &SetAsPathPrependConfig,
    ) -> Result<Self, Error> {
        let asn = if c.asn == "last-as" {
            PrependAs::LastAs
        } else {
            PrependAs::Asn(
                c.asn
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidAsn(c.asn.clone()))?,
            )
        };
        Ok(PrependAction {
            asn,
            repeat: c.repeat_n,
        })
    }

    fn apply(&self, path: &mut Path, options: &PolicyOptions, log: &Logger) {
        let asn = match self.asn {
            PrependAs::Asn(asn) => asn,
            PrependAs::LastAs => {
                let aspath = path.as_seq_list();
                match aspath.first() {
                    None => {
                        warn!(log, "as-path prepend last-as: as path length is zero");
                        return;
                    }
                    Some(0) => {
                        warn!(log, "as-path prepend last-as: left-most segment is not a sequence");
                        return;
                    }
                    Some(asn) => *asn,
                }
            }
        };
        let confed = options
            .info
            .as_ref()
            .map(|info| info.confederation)
            .unwrap_or(false);
        path.prepend_asn(asn, self.repeat, confed);
    }

    pub fn to_config(&self) -> SetAsPathPrependConfig {
        SetAsPathPrependConfig {
            repeat_n: self.repeat,
            asn: match self.asn {
                PrependAs::LastAs => "last-as".to_string(),
                PrependAs::Asn(asn) => asn.to_string(),
            },
        }
    }
}

/// Nexthop action: a fixed address, or the local address of the session
/// being advertised over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NexthopAction {
    Address(IpAddr),
    SelfAddr,
}

impl NexthopAction {
    fn apply(&self, path: &mut Path, options: &PolicyOptions, log: &Logger) {
        match self {
            NexthopAction::Address(addr) => path.set_nexthop(*addr),
            NexthopAction::SelfAddr => {
                match options
                    .info
                    .as_ref()
                    .and_then(|info| info.local_address)
                {
                    Some(addr) => path.set_nexthop(addr),
                    None => {
                        warn!(log, "nexthop self: no local address available");
                    }
                }
            }
        }
    }

    pub fn to_config(&self) -> String {
        match self {
            NexthopAction::SelfAddr => "self".to_string(),
            NexthopAction::Address(addr) => addr.to_string(),
        }
    }
}

impl FromStr for NexthopAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "self" {
            return Ok(NexthopAction::SelfAddr);
        }
        s.parse::<IpAddr>()
            .map(NexthopAction::Address)
            .map_err(|_| Error::InvalidNexthop(s.to_string()))
    }
}

/// A mod-action: transforms the working path, never decides routing.
#[derive(Debug, Clone)]
pub enum Action {
    Community(CommunityAction),
    ExtCommunity(ExtCommunityAction),
    LargeCommunity(LargeCommunityAction),
    Med(MedAction),
    AsPathPrepend(PrependAction),
    Nexthop(NexthopAction),
    LocalPref(u32),
}

impl Action {
    pub fn apply(
        &self,
        path: &mut Path,
        options: &PolicyOptions,
        log: &Logger,
    ) {
        match self {
            Action::Community(a) => a.apply(path),
            Action::ExtCommunity(a) => a.apply(path),
            Action::LargeCommunity(a) => a.apply(path),
            Action::Med(a) => a.apply(path, log),
            Action::AsPathPrepend(a) => a.apply(path, options, log),
            Action::Nexthop(a) => a.apply(path, options, log),
            Action::LocalPref(value) => {
                path.set_attr(PathAttr::LocalPref(*value))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attrs::{AsSegment, Nlri, Origin, PathAttr};
    use crate::path::PeerInfo;
    use chrono::Utc;
    use pe_common::log::init_logger;
    use std::sync::Arc;

    fn test_path(attrs: Vec<PathAttr>) -> Path {
        let root = Arc::new(
            Path::new(
                PeerInfo {
                    asn: 65002,
                    local_asn: 65001,
                    address: Some("198.51.100.2".parse().unwrap()),
                    local_address: Some("198.51.100.1".parse().unwrap()),
                    ..Default::default()
                },
                Nlri::new("10.1.0.0/16".parse().unwrap()),
                false,
                attrs,
                Utc::now(),
                false,
            )
            .unwrap(),
        );
        root.branch(false)
    }

    fn comms(path: &Path) -> Vec<String> {
        path.communities().iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn community_add_remove_replace() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::Communities(vec![Community((65000 << 16) | 2)]),
        ]);

        let add = Action::Community(
            CommunityAction::new(
                CommunityOptionType::Add,
                &["65000:1".to_string()],
            )
            .unwrap(),
        );
        add.apply(&mut path, &opts, &log);
        assert_eq!(comms(&path), vec!["65000:2", "65000:1"]);

        let remove = Action::Community(
            CommunityAction::new(
                CommunityOptionType::Remove,
                &["65000:2".to_string()],
            )
            .unwrap(),
        );
        remove.apply(&mut path, &opts, &log);
        assert_eq!(comms(&path), vec!["65000:1"]);

        let replace = Action::Community(
            CommunityAction::new(
                CommunityOptionType::Replace,
                &["65000:9".to_string()],
            )
            .unwrap(),
        );
        replace.apply(&mut path, &opts, &log);
        assert_eq!(comms(&path), vec!["65000:9"]);

        // empty replace clears the attribute
        let clear = Action::Community(
            CommunityAction::new(CommunityOptionType::Replace, &[])
                .unwrap(),
        );
        clear.apply(&mut path, &opts, &log);
        assert!(path
            .attr(crate::attrs::PathAttrType::Communities)
            .is_none());
    }

    #[test]
    fn community_remove_by_pattern() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::Communities(vec![
                Community((65000 << 16) | 1),
                Community((65000 << 16) | 2),
                Community((65100 << 16) | 1),
            ]),
        ]);
        let remove = Action::Community(
            CommunityAction::new(
                CommunityOptionType::Remove,
                &["^65000:".to_string()],
            )
            .unwrap(),
        );
        remove.apply(&mut path, &opts, &log);
        assert_eq!(comms(&path), vec!["65100:1"]);
    }

    #[test]
    fn med_action_soft_failure() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::Med(10),
        ]);

        Action::Med(MedAction::Mod(-4)).apply(&mut path, &opts, &log);
        assert_eq!(path.med().unwrap(), 6);

        // underflow is logged and the path passes through unchanged
        Action::Med(MedAction::Mod(-100)).apply(&mut path, &opts, &log);
        assert_eq!(path.med().unwrap(), 6);

        Action::Med(MedAction::Replace(77)).apply(&mut path, &opts, &log);
        assert_eq!(path.med().unwrap(), 77);
    }

    #[test]
    fn med_action_parse() {
        assert_eq!("+5".parse::<MedAction>().unwrap(), MedAction::Mod(5));
        assert_eq!("-5".parse::<MedAction>().unwrap(), MedAction::Mod(-5));
        assert_eq!(
            "5".parse::<MedAction>().unwrap(),
            MedAction::Replace(5)
        );
        assert!("5x".parse::<MedAction>().is_err());
        assert!("".parse::<MedAction>().is_err());

        assert_eq!(MedAction::Mod(5).to_config(), "+5");
        assert_eq!(MedAction::Mod(-5).to_config(), "-5");
        assert_eq!(MedAction::Replace(5).to_config(), "5");
    }

    #[test]
    fn prepend_fixed_and_last_as() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::AsPath(vec![AsSegment::sequence(vec![100, 200])]),
        ]);

        let last_as = Action::AsPathPrepend(PrependAction {
            asn: PrependAs::LastAs,
            repeat: 3,
        });
        last_as.apply(&mut path, &opts, &log);
        assert_eq!(path.as_seq_list(), vec![100, 100, 100, 100, 200]);

        let fixed = Action::AsPathPrepend(PrependAction {
            asn: PrependAs::Asn(65001),
            repeat: 1,
        });
        fixed.apply(&mut path, &opts, &log);
        assert_eq!(
            path.as_seq_list(),
            vec![65001, 100, 100, 100, 100, 200]
        );
    }

    #[test]
    fn prepend_last_as_no_op_cases() {
        let log = init_logger();
        let opts = PolicyOptions::default();

        // no as-path at all
        let mut empty = test_path(vec![PathAttr::Origin(Origin::Igp)]);
        Action::AsPathPrepend(PrependAction {
            asn: PrependAs::LastAs,
            repeat: 2,
        })
        .apply(&mut empty, &opts, &log);
        assert!(empty.as_path().is_none());

        // leftmost segment is a set, decoded as the 0 sentinel
        let mut set_first = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::AsPath(vec![
                AsSegment::set(vec![100, 200]),
                AsSegment::sequence(vec![300]),
            ]),
        ]);
        Action::AsPathPrepend(PrependAction {
            asn: PrependAs::LastAs,
            repeat: 2,
        })
        .apply(&mut set_first, &opts, &log);
        assert_eq!(set_first.as_seq_list(), vec![0, 300]);
    }

    #[test]
    fn nexthop_action_self_and_fixed() {
        let log = init_logger();
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::NextHop("198.51.100.2".parse().unwrap()),
        ]);

        let opts = PolicyOptions {
            info: Some(PeerInfo {
                local_address: Some("198.51.100.1".parse().unwrap()),
                ..Default::default()
            }),
            ..Default::default()
        };
        Action::Nexthop(NexthopAction::SelfAddr)
            .apply(&mut path, &opts, &log);
        assert_eq!(
            path.nexthop(),
            Some("198.51.100.1".parse::<IpAddr>().unwrap())
        );

        // no local address: warn and pass through
        Action::Nexthop(NexthopAction::SelfAddr).apply(
            &mut path,
            &PolicyOptions::default(),
            &log,
        );
        assert_eq!(
            path.nexthop(),
            Some("198.51.100.1".parse::<IpAddr>().unwrap())
        );

        Action::Nexthop(NexthopAction::Address(
            "203.0.113.1".parse().unwrap(),
        ))
        .apply(&mut path, &opts, &log);
        assert_eq!(
            path.nexthop(),
            Some("203.0.113.1".parse::<IpAddr>().unwrap())
        );
    }

    #[test]
    fn local_pref_action() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let mut path = test_path(vec![PathAttr::Origin(Origin::Igp)]);
        Action::LocalPref(250).apply(&mut path, &opts, &log);
        assert_eq!(path.local_pref(), 250);
    }

    #[test]
    fn ext_community_action_remove_keeps_non_transitive() {
        let log = init_logger();
        let opts = PolicyOptions::default();
        let rt = ExtCommunity::route_target(
            crate::attrs::ExtCommunityValue::TwoOctetAs {
                asn: 65000,
                local: 100,
            },
        );
        let ov = ExtCommunity::origin_validation(
            crate::attrs::ValidationStatus::Valid,
        );
        // same subtype and value as rt, but type 0x3f is non-transitive
        let boundary = ExtCommunity { typ: 0x3f, ..rt };
        let mut path = test_path(vec![
            PathAttr::Origin(Origin::Igp),
            PathAttr::ExtCommunities(vec![rt, ov, boundary]),
        ]);

        let remove = Action::ExtCommunity(
            ExtCommunityAction::new(
                CommunityOptionType::Remove,
                &["rt:65000:100".to_string()],
            )
            .unwrap(),
        );
        remove.apply(&mut path, &opts, &log);
        assert_eq!(path.ext_communities(), vec![ov, boundary]);
    }

    #[test]
    fn large_community_action_round_trip_config() {
        let add = LargeCommunityAction::new(
            CommunityOptionType::Add,
            &["65000:1:1".to_string()],
        )
        .unwrap();
        let config = add.to_config();
        assert_eq!(
            config.set_large_community_method.communities_list,
            vec!["65000:1:1"]
        );
        assert_eq!(config.options, CommunityOptionType::Add);
    }
}
