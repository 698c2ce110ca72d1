// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::attrs::PathAttrType;
use crate::sets::DefinedSetKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("attributes required for a non-withdraw path")]
    EmptyPathAttrs,

    #[error("no {0:?} path attribute")]
    AttrMissing(PathAttrType),

    #[error("med value out of range: {0}")]
    MedOutOfRange(i64),

    #[error("defined set type mismatch: expected {expected} found {found}")]
    SetTypeMismatch {
        expected: DefinedSetKind,
        found: DefinedSetKind,
    },

    #[error("can't append prefixes of a different address family")]
    FamilyMismatch,

    #[error("empty defined-set name")]
    EmptySetName,

    #[error("unknown {0} set {1}")]
    UnknownSet(DefinedSetKind, String),

    #[error("unknown statement {0}")]
    UnknownStatement(String),

    #[error("unknown policy {0}")]
    UnknownPolicy(String),

    #[error("{0} set {1} already defined")]
    DuplicateSet(DefinedSetKind, String),

    #[error("statement {0} already defined")]
    DuplicateStatement(String),

    #[error("policy {0} already defined")]
    DuplicatePolicy(String),

    #[error("{0} set {1} is referenced by statement {2}")]
    SetInUse(DefinedSetKind, String, String),

    #[error("statement {0} is referenced by policy {1}")]
    StatementInUse(String, String),

    #[error("policy {0} is assigned to the {1} direction")]
    PolicyInUse(String, crate::policy::Direction),

    #[error("invalid regular expression {0}")]
    InvalidRegex(String),

    #[error("invalid prefix {0}")]
    InvalidPrefix(String),

    #[error("invalid mask length range {0}")]
    InvalidMaskRange(String),

    #[error("invalid community {0}")]
    InvalidCommunity(String),

    #[error("invalid ext-community {0}, want (rt|soo):<value> | valid | not-found | invalid")]
    InvalidExtCommunity(String),

    #[error("invalid large community {0}")]
    InvalidLargeCommunity(String),

    #[error("invalid asn {0}")]
    InvalidAsn(String),

    #[error("invalid med format {0}")]
    InvalidMedFormat(String),

    #[error("invalid next-hop address {0}")]
    InvalidNexthop(String),

    #[error("invalid route family {0}")]
    InvalidRouteFamily(String),
}
