// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed property-key enumeration.
//!
//! Any new key must be added here and given a coding rule in `value.rs`;
//! this enumeration is part of the wire ABI, so variants are never
//! renumbered, only appended.

use std::fmt;

/// A single property key from the closed schema.
///
/// [`ALL`] enumerates every variant in wire-table order, so index-based
/// lookups (see `crate::wire`'s per-key tag) stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Key {
    BoundMax,
    BoundMin,
    CauseUpdate,
    DestLength,
    DestMax,
    DestMin,
    DestType,
    Direction,
    Expression,
    Id,
    Instances,
    Ip,
    Length,
    LibVersion,
    Max,
    Min,
    Mode,
    Mute,
    NumConnectsIn,
    NumConnectsOut,
    NumInputs,
    NumLinks,
    NumOutputs,
    NumSlots,
    Port,
    Rate,
    Rev,
    Scope,
    SendAsInstance,
    Slot,
    SrcLength,
    SrcMax,
    SrcMin,
    SrcType,
    Type,
    Units,
    /// Admin-only: whether the device can alias its requested name.
    CanAlias,
    /// Admin-only: mapping id carried on `/map*`/`/unmap` messages.
    MapId,
}

/// The full key set, in wire-table order. Kept in sync with the `Key`
/// variant list by the `keys_all_round_trips` test below.
pub const ALL: &[Key] = &[
    Key::BoundMax,
    Key::BoundMin,
    Key::CauseUpdate,
    Key::DestLength,
    Key::DestMax,
    Key::DestMin,
    Key::DestType,
    Key::Direction,
    Key::Expression,
    Key::Id,
    Key::Instances,
    Key::Ip,
    Key::Length,
    Key::LibVersion,
    Key::Max,
    Key::Min,
    Key::Mode,
    Key::Mute,
    Key::NumConnectsIn,
    Key::NumConnectsOut,
    Key::NumInputs,
    Key::NumLinks,
    Key::NumOutputs,
    Key::NumSlots,
    Key::Port,
    Key::Rate,
    Key::Rev,
    Key::Scope,
    Key::SendAsInstance,
    Key::Slot,
    Key::SrcLength,
    Key::SrcMax,
    Key::SrcMin,
    Key::SrcType,
    Key::Type,
    Key::Units,
    Key::CanAlias,
    Key::MapId,
];

impl Key {
    /// The wire spelling, including the leading `@`.
    pub fn as_str(self) -> &'static str {
        match self {
            Key::BoundMax => "@boundMax",
            Key::BoundMin => "@boundMin",
            Key::CauseUpdate => "@causeUpdate",
            Key::DestLength => "@destLength",
            Key::DestMax => "@destMax",
            Key::DestMin => "@destMin",
            Key::DestType => "@destType",
            Key::Direction => "@direction",
            Key::Expression => "@expression",
            Key::Id => "@ID",
            Key::Instances => "@instances",
            Key::Ip => "@IP",
            Key::Length => "@length",
            Key::LibVersion => "@libVersion",
            Key::Max => "@max",
            Key::Min => "@min",
            Key::Mode => "@mode",
            Key::Mute => "@mute",
            Key::NumConnectsIn => "@numConnectsIn",
            Key::NumConnectsOut => "@numConnectsOut",
            Key::NumInputs => "@numInputs",
            Key::NumLinks => "@numLinks",
            Key::NumOutputs => "@numOutputs",
            Key::NumSlots => "@numSlots",
            Key::Port => "@port",
            Key::Rate => "@rate",
            Key::Rev => "@rev",
            Key::Scope => "@scope",
            Key::SendAsInstance => "@sendAsInstance",
            Key::Slot => "@slot",
            Key::SrcLength => "@srcLength",
            Key::SrcMax => "@srcMax",
            Key::SrcMin => "@srcMin",
            Key::SrcType => "@srcType",
            Key::Type => "@type",
            Key::Units => "@units",
            Key::CanAlias => "@canAlias",
            Key::MapId => "@mapId",
        }
    }

    /// Parse a wire token (including the leading `@`) back into a `Key`.
    /// Returns `None` for unknown keys — callers fall back to the extras
    /// bag in that case.
    pub fn parse(token: &str) -> Option<Key> {
        ALL.iter().copied().find(|k| k.as_str() == token)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
