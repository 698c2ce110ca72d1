// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The layered path model.
//!
//! A [`Path`] wraps an immutable, reference-counted origin (the NLRI, the
//! peer the route came from, arrival metadata) together with a layered
//! attribute view. Mutation is copy-on-write: [`Path::branch`] produces a
//! child holding a parent pointer plus local attribute overrides and
//! deletions, and reads walk child to root. The chain is a tree, so no
//! reference cycles can form.

use crate::attrs::{
    AsSegment, AsSegmentType, Community, ExtCommunity, LargeCommunity, Nlri,
    Origin, PathAttr, PathAttrType,
};
use crate::error::Error;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use policy_types::{Prefix, Prefix4, Prefix6, RouteFamily};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// Session-level information about the peer a path was learned from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    pub asn: u32,
    pub local_asn: u32,
    pub id: Option<Ipv4Addr>,
    pub local_id: Option<Ipv4Addr>,
    pub address: Option<IpAddr>,
    pub local_address: Option<IpAddr>,
    pub route_reflector_client: bool,
    pub confederation: bool,
}

/// The immutable root a path chain shares.
#[derive(Debug)]
pub struct OriginInfo {
    pub nlri: Nlri,
    pub source: PeerInfo,
    pub timestamp: DateTime<Utc>,
    pub no_implicit_withdraw: bool,
    pub eor: bool,
    stale: AtomicBool,
    from_external: AtomicBool,
}

/// An NLRI with its attribute view. See the module docs for the layering
/// scheme.
#[derive(Debug)]
pub struct Path {
    origin: Arc<OriginInfo>,
    parent: Option<Arc<Path>>,
    attrs: Vec<PathAttr>,
    dels: Vec<PathAttrType>,
    pub is_withdraw: bool,
    pub nexthop_invalid: bool,
}

/// How [`Path::remove_private_as`] treats a private ASN it finds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RemovePrivateAsMode {
    /// Drop the ASN from the segment.
    All,
    /// Substitute the local ASN.
    Replace,
}

fn is_private_as(asn: u32) -> bool {
    (64512..=65534).contains(&asn) || (4200000000..=4294967294).contains(&asn)
}

impl Path {
    /// Create a root path. Non-withdraw paths must carry attributes.
    pub fn new(
        source: PeerInfo,
        nlri: Nlri,
        is_withdraw: bool,
        attrs: Vec<PathAttr>,
        timestamp: DateTime<Utc>,
        no_implicit_withdraw: bool,
    ) -> Result<Path, Error> {
        if !is_withdraw && attrs.is_empty() {
            return Err(Error::EmptyPathAttrs);
        }
        Ok(Path {
            origin: Arc::new(OriginInfo {
                nlri,
                source,
                timestamp,
                no_implicit_withdraw,
                eor: false,
                stale: AtomicBool::new(false),
                from_external: AtomicBool::new(false),
            }),
            parent: None,
            attrs,
            dels: Vec::new(),
            is_withdraw,
            nexthop_invalid: false,
        })
    }

    /// An end-of-RIB marker for the given family.
    pub fn new_eor(family: RouteFamily) -> Path {
        let prefix = match family {
            RouteFamily::Ipv4Unicast => {
                Prefix::V4(Prefix4::new(Ipv4Addr::UNSPECIFIED, 0))
            }
            RouteFamily::Ipv6Unicast => Prefix::V6(Prefix6::new(
                std::net::Ipv6Addr::UNSPECIFIED,
                0,
            )),
        };
        Path {
            origin: Arc::new(OriginInfo {
                nlri: Nlri::new(prefix),
                source: PeerInfo::default(),
                timestamp: Utc::now(),
                no_implicit_withdraw: false,
                eor: true,
                stale: AtomicBool::new(false),
                from_external: AtomicBool::new(false),
            }),
            parent: None,
            attrs: Vec::new(),
            dels: Vec::new(),
            is_withdraw: false,
            nexthop_invalid: false,
        }
    }

    /// Copy-on-write clone: the child shares the origin and sees the
    /// parent's attributes until it overrides or deletes them.
    pub fn branch(self: &Arc<Self>, is_withdraw: bool) -> Path {
        Path {
            origin: self.origin.clone(),
            parent: Some(self.clone()),
            attrs: Vec::new(),
            dels: Vec::new(),
            is_withdraw,
            nexthop_invalid: self.nexthop_invalid,
        }
    }

    fn root(&self) -> &Path {
        let mut p = self;
        while let Some(parent) = &p.parent {
            p = parent;
        }
        p
    }

    pub fn origin_info(&self) -> &OriginInfo {
        &self.root().origin
    }

    pub fn nlri(&self) -> &Nlri {
        &self.origin_info().nlri
    }

    pub fn source(&self) -> &PeerInfo {
        &self.origin_info().source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.origin_info().timestamp
    }

    pub fn no_implicit_withdraw(&self) -> bool {
        self.origin_info().no_implicit_withdraw
    }

    pub fn is_eor(&self) -> bool {
        self.origin_info().eor
    }

    pub fn is_stale(&self) -> bool {
        self.origin_info().stale.load(Ordering::Relaxed)
    }

    pub fn mark_stale(&self, stale: bool) {
        self.origin_info().stale.store(stale, Ordering::Relaxed);
    }

    pub fn is_from_external(&self) -> bool {
        self.origin_info().from_external.load(Ordering::Relaxed)
    }

    pub fn set_from_external(&self, yes: bool) {
        self.origin_info()
            .from_external
            .store(yes, Ordering::Relaxed);
    }

    /// A path is local when it has no source address, i.e. it was
    /// originated by this speaker rather than learned from a peer.
    pub fn is_local(&self) -> bool {
        self.source().address.is_none()
    }

    /// A path is iBGP when the source AS equals the local AS and is
    /// non-zero.
    pub fn is_ibgp(&self) -> bool {
        let asn = self.source().asn;
        asn == self.source().local_asn && asn != 0
    }

    pub fn route_family(&self) -> RouteFamily {
        self.nlri().route_family()
    }

    /// Look up the effective attribute of the given type, honoring
    /// overrides and deletions down the chain.
    pub fn attr(&self, typ: PathAttrType) -> Option<&PathAttr> {
        let mut p = self;
        loop {
            if p.dels.contains(&typ) {
                return None;
            }
            if let Some(a) = p.attrs.iter().find(|a| a.type_code() == typ) {
                return Some(a);
            }
            match &p.parent {
                Some(parent) => p = parent,
                None => return None,
            }
        }
    }

    /// The effective attribute list. Walks from this path up to the root,
    /// remembering the shallowest-seen override for each type and the
    /// union of deletions. Root attributes keep their arrival order;
    /// attributes that exist only in children are appended and the final
    /// list is sorted by type code.
    pub fn path_attrs(&self) -> Vec<&PathAttr> {
        let mut deleted: HashSet<PathAttrType> = HashSet::new();
        let mut modified: Vec<(PathAttrType, &PathAttr)> = Vec::new();
        let mut p = self;
        loop {
            for t in &p.dels {
                deleted.insert(*t);
            }
            match &p.parent {
                None => {
                    let mut list: Vec<&PathAttr> =
                        Vec::with_capacity(p.attrs.len());
                    for a in &p.attrs {
                        let typ = a.type_code();
                        if let Some(i) =
                            modified.iter().position(|(t, _)| *t == typ)
                        {
                            list.push(modified.remove(i).1);
                        } else if !deleted.contains(&typ) {
                            list.push(a);
                        }
                    }
                    if !modified.is_empty() {
                        // Some attributes exist only in children, so the
                        // arrival order no longer holds.
                        for (_, m) in modified {
                            list.push(m);
                        }
                        list.sort_by_key(|a| a.type_code());
                    }
                    return list;
                }
                Some(parent) => {
                    for a in &p.attrs {
                        let typ = a.type_code();
                        if !deleted.contains(&typ)
                            && !modified.iter().any(|(t, _)| *t == typ)
                        {
                            modified.push((typ, a));
                        }
                    }
                    p = parent;
                }
            }
        }
    }

    /// Install an attribute locally, replacing an existing local override
    /// of the same type.
    pub fn set_attr(&mut self, attr: PathAttr) {
        let typ = attr.type_code();
        match self.attrs.iter_mut().find(|a| a.type_code() == typ) {
            Some(slot) => *slot = attr,
            None => self.attrs.push(attr),
        }
    }

    /// Record a local deletion of the given attribute type.
    pub fn del_attr(&mut self, typ: PathAttrType) {
        self.dels.push(typ);
    }

    pub fn nexthop(&self) -> Option<IpAddr> {
        if let Some(PathAttr::NextHop(nh)) = self.attr(PathAttrType::NextHop)
        {
            return Some(*nh);
        }
        if let Some(PathAttr::MpReachNlri { nexthop, .. }) =
            self.attr(PathAttrType::MpReachNlri)
        {
            return Some(*nexthop);
        }
        None
    }

    /// Set the nexthop. An IPv4-unicast path given a non-IPv4 nexthop is
    /// re-expressed as MP_REACH_NLRI carrying the existing NLRI, per RFC
    /// 8950; otherwise whichever of NEXT_HOP and MP_REACH_NLRI is present
    /// is updated.
    pub fn set_nexthop(&mut self, nexthop: IpAddr) {
        if self.route_family() == RouteFamily::Ipv4Unicast
            && nexthop.is_ipv6()
        {
            let nlri = *self.nlri();
            self.del_attr(PathAttrType::NextHop);
            self.set_attr(PathAttr::MpReachNlri {
                nexthop,
                nlri: vec![nlri],
            });
            return;
        }
        if matches!(self.attr(PathAttrType::NextHop), Some(PathAttr::NextHop(_)))
        {
            self.set_attr(PathAttr::NextHop(nexthop));
        }
        if let Some(PathAttr::MpReachNlri { nlri, .. }) =
            self.attr(PathAttrType::MpReachNlri)
        {
            let nlri = nlri.clone();
            self.set_attr(PathAttr::MpReachNlri { nexthop, nlri });
        }
    }

    pub fn as_path(&self) -> Option<&Vec<AsSegment>> {
        match self.attr(PathAttrType::AsPath) {
            Some(PathAttr::AsPath(segments)) => Some(segments),
            _ => None,
        }
    }

    /// Number of ASes in the path, counted per RFC 4271 §9.1.2.2(a).
    /// A missing AS_PATH gives zero.
    pub fn as_path_len(&self) -> usize {
        self.as_path()
            .map(|segs| segs.iter().map(|s| s.path_len()).sum())
            .unwrap_or(0)
    }

    /// The canonical AS-path string regex conditions match against.
    pub fn as_path_string(&self) -> String {
        match self.as_path() {
            Some(segments) => {
                segments.iter().map(|s| s.to_string()).join(" ")
            }
            None => String::new(),
        }
    }

    fn as_list_of(&self, want_seq: bool, want_set: bool) -> Vec<u32> {
        let mut list = Vec::new();
        if let Some(segments) = self.as_path() {
            for segment in segments {
                if want_seq && segment.typ == AsSegmentType::Sequence {
                    list.extend_from_slice(&segment.asns);
                    continue;
                }
                if want_set && segment.typ == AsSegmentType::Set {
                    list.extend_from_slice(&segment.asns);
                } else {
                    // Keep a sentinel so matches anchored at segment
                    // boundaries cannot see across the skipped segment.
                    list.push(0);
                }
            }
        }
        list
    }

    /// All ASes, from SEQUENCE and SET segments alike; confederation
    /// segments contribute a `0` sentinel.
    pub fn as_list(&self) -> Vec<u32> {
        self.as_list_of(true, true)
    }

    /// ASes from SEQUENCE segments; any other segment contributes a `0`
    /// sentinel.
    pub fn as_seq_list(&self) -> Vec<u32> {
        self.as_list_of(true, false)
    }

    /// The AS the path originated from: the last ASN of the last AS_PATH
    /// segment, or zero.
    pub fn source_as(&self) -> u32 {
        match self.as_path() {
            Some(segments) => match segments.last() {
                Some(segment) => segment.asns.last().copied().unwrap_or(0),
                None => 0,
            },
            None => 0,
        }
    }

    /// Prepend `asn` to AS_PATH `repeat` times.
    ///
    /// When the leftmost segment already has the requested type
    /// (SEQUENCE, or CONFED_SEQUENCE when `confed` is set), copies merge
    /// into it up to the 255-member segment limit and any overflow spills
    /// into a new leading segment. Otherwise a new leading segment is
    /// created.
    ///
    /// Ref: RFC 4271 §5.1.2
    pub fn prepend_asn(&mut self, asn: u32, repeat: u8, confed: bool) {
        let seg_type = if confed {
            AsSegmentType::ConfedSequence
        } else {
            AsSegmentType::Sequence
        };

        let mut segments: Vec<AsSegment> =
            self.as_path().cloned().unwrap_or_default();

        let mut remaining = repeat as usize;
        if let Some(first) = segments.first_mut() {
            if first.typ == seg_type {
                let room = 255usize.saturating_sub(first.asns.len());
                let take = remaining.min(room);
                first.asns.splice(0..0, std::iter::repeat(asn).take(take));
                remaining -= take;
            }
        }
        if remaining > 0 {
            segments.insert(
                0,
                AsSegment {
                    typ: seg_type,
                    asns: vec![asn; remaining],
                },
            );
        }
        self.set_attr(PathAttr::AsPath(segments));
    }

    /// Strip or substitute private ASNs (64512..=65534 and
    /// 4200000000..=4294967294) throughout AS_PATH. Segments emptied by
    /// the removal are dropped.
    pub fn remove_private_as(
        &mut self,
        local_as: u32,
        mode: RemovePrivateAsMode,
    ) {
        let Some(original) = self.as_path() else {
            return;
        };
        let mut segments = Vec::with_capacity(original.len());
        for segment in original {
            let mut asns = Vec::with_capacity(segment.asns.len());
            for &asn in &segment.asns {
                if is_private_as(asn) {
                    if mode == RemovePrivateAsMode::Replace {
                        asns.push(local_as);
                    }
                } else {
                    asns.push(asn);
                }
            }
            if !asns.is_empty() {
                segments.push(AsSegment {
                    typ: segment.typ,
                    asns,
                });
            }
        }
        self.set_attr(PathAttr::AsPath(segments));
    }

    /// Replace every occurrence of `peer_as` in AS_PATH with `local_as`.
    /// Returns a new path sharing this one when anything changed,
    /// otherwise this path unchanged.
    pub fn replace_as(
        self: &Arc<Self>,
        local_as: u32,
        peer_as: u32,
    ) -> Arc<Path> {
        let Some(original) = self.as_path() else {
            return self.clone();
        };
        let mut changed = false;
        let segments: Vec<AsSegment> = original
            .iter()
            .map(|segment| AsSegment {
                typ: segment.typ,
                asns: segment
                    .asns
                    .iter()
                    .map(|&asn| {
                        if asn == peer_as {
                            changed = true;
                            local_as
                        } else {
                            asn
                        }
                    })
                    .collect(),
            })
            .collect();
        if !changed {
            return self.clone();
        }
        let mut path = self.branch(self.is_withdraw);
        path.set_attr(PathAttr::AsPath(segments));
        Arc::new(path)
    }

    pub fn communities(&self) -> Vec<Community> {
        match self.attr(PathAttrType::Communities) {
            Some(PathAttr::Communities(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    /// Add or replace communities. An empty list with `replace` set
    /// clears the attribute.
    pub fn set_communities(
        &mut self,
        communities: &[Community],
        replace: bool,
    ) {
        if communities.is_empty() && replace {
            self.del_attr(PathAttrType::Communities);
            return;
        }
        let list = if replace {
            communities.to_vec()
        } else {
            let mut list = self.communities();
            list.extend_from_slice(communities);
            list
        };
        self.set_attr(PathAttr::Communities(list));
    }

    /// Remove specific communities, returning how many were dropped.
    /// Removing the last community deletes the attribute.
    pub fn remove_communities(&mut self, communities: &[Community]) -> usize {
        if communities.is_empty() {
            return 0;
        }
        let current = self.communities();
        if current.is_empty() {
            return 0;
        }
        let (kept, dropped): (Vec<Community>, Vec<Community>) = current
            .into_iter()
            .partition(|c| !communities.contains(c));
        if kept.is_empty() {
            self.del_attr(PathAttrType::Communities);
        } else {
            self.set_attr(PathAttr::Communities(kept));
        }
        dropped.len()
    }

    pub fn ext_communities(&self) -> Vec<ExtCommunity> {
        match self.attr(PathAttrType::ExtCommunities) {
            Some(PathAttr::ExtCommunities(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_ext_communities(
        &mut self,
        exts: &[ExtCommunity],
        replace: bool,
    ) {
        let list = if replace {
            exts.to_vec()
        } else {
            let mut list = self.ext_communities();
            list.extend_from_slice(exts);
            list
        };
        self.set_attr(PathAttr::ExtCommunities(list));
    }

    pub fn large_communities(&self) -> Vec<LargeCommunity> {
        match self.attr(PathAttrType::LargeCommunities) {
            Some(PathAttr::LargeCommunities(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    /// Add or replace large communities. An empty list with `replace` set
    /// clears the attribute.
    pub fn set_large_communities(
        &mut self,
        communities: &[LargeCommunity],
        replace: bool,
    ) {
        if communities.is_empty() && replace {
            self.del_attr(PathAttrType::LargeCommunities);
            return;
        }
        let list = if replace {
            communities.to_vec()
        } else {
            let mut list = self.large_communities();
            list.extend_from_slice(communities);
            list
        };
        self.set_attr(PathAttr::LargeCommunities(list));
    }

    pub fn med(&self) -> Result<u32, Error> {
        match self.attr(PathAttrType::MultiExitDisc) {
            Some(PathAttr::Med(v)) => Ok(*v),
            _ => Err(Error::AttrMissing(PathAttrType::MultiExitDisc)),
        }
    }

    /// Replace MED or add a signed delta to it. The result must fit in a
    /// u32; a missing MED counts as zero for the delta form.
    pub fn set_med(&mut self, med: i64, replace: bool) -> Result<(), Error> {
        let value = if replace {
            med
        } else {
            self.med().unwrap_or(0) as i64 + med
        };
        let value =
            u32::try_from(value).map_err(|_| Error::MedOutOfRange(value))?;
        self.set_attr(PathAttr::Med(value));
        Ok(())
    }

    /// LOCAL_PREF, defaulting to 100 when the attribute is absent.
    ///
    /// Ref: RFC 4271 §5.1.5
    pub fn local_pref(&self) -> u32 {
        match self.attr(PathAttrType::LocalPref) {
            Some(PathAttr::LocalPref(v)) => *v,
            _ => DEFAULT_LOCAL_PREF,
        }
    }

    pub fn remove_local_pref(&mut self) {
        if self.attr(PathAttrType::LocalPref).is_some() {
            self.del_attr(PathAttrType::LocalPref);
        }
    }

    pub fn origin(&self) -> Result<Origin, Error> {
        match self.attr(PathAttrType::Origin) {
            Some(PathAttr::Origin(o)) => Ok(*o),
            _ => Err(Error::AttrMissing(PathAttrType::Origin)),
        }
    }

    pub fn originator_id(&self) -> Option<Ipv4Addr> {
        match self.attr(PathAttrType::OriginatorId) {
            Some(PathAttr::OriginatorId(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn cluster_list(&self) -> Vec<Ipv4Addr> {
        match self.attr(PathAttrType::ClusterList) {
            Some(PathAttr::ClusterList(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    /// Two paths are equal when they share a source and their effective
    /// attribute lists agree.
    pub fn equal(&self, other: &Path) -> bool {
        self.source() == other.source()
            && self.path_attrs() == other.path_attrs()
    }

    /// The standard tie-break: local over learned, eBGP over iBGP, higher
    /// LOCAL_PREF, shorter AS_PATH, lower ORIGIN, lower MED. A positive
    /// return means `self` is preferred. Missing ORIGIN and MED compare
    /// as zero.
    pub fn compare(&self, other: &Path) -> i64 {
        if self.is_local() && !other.is_local() {
            return 1;
        }
        if !self.is_local() && other.is_local() {
            return -1;
        }

        if !self.is_ibgp() && other.is_ibgp() {
            return 1;
        }
        if self.is_ibgp() && !other.is_ibgp() {
            return -1;
        }

        let lp1 = self.local_pref() as i64;
        let lp2 = other.local_pref() as i64;
        if lp1 != lp2 {
            return lp1 - lp2;
        }

        let l1 = self.as_path_len() as i64;
        let l2 = other.as_path_len() as i64;
        if l1 != l2 {
            return l2 - l1;
        }

        let o1 = self.origin().map(|o| o as u8).unwrap_or(0) as i64;
        let o2 = other.origin().map(|o| o as u8).unwrap_or(0) as i64;
        if o1 != o2 {
            return o2 - o1;
        }

        let m1 = self.med().unwrap_or(0) as i64;
        let m2 = other.med().unwrap_or(0) as i64;
        m2 - m1
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_eor() {
            return write!(
                f,
                "{{ {} EOR | src: {:?} }}",
                self.route_family(),
                self.source().address
            );
        }
        write!(f, "{{ {} | src: {:?}", self.nlri(), self.source().address)?;
        match self.nexthop() {
            Some(nh) => write!(f, ", nh: {nh}")?,
            None => write!(f, ", nh: none")?,
        }
        if self.nexthop_invalid {
            write!(f, " (not reachable)")?;
        }
        if self.is_withdraw {
            write!(f, ", withdraw")?;
        }
        write!(f, " }}")
    }
}
