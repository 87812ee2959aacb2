//! crates/ps_core/src/ids.rs
//! Unit, plot and group tokens.
//!
//! Host source forms (`"A+B"` composite groups, `"3+7"` primary links) are
//! parsed here and only here; the rest of the engine sees typed keys.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::CoreError;

const TOKEN_MAX_LEN: usize = 64;

/// Separator used by the host for composite groups and multi-parent links.
pub const JOIN_SEPARATOR: char = '+';

/// Trimmed, non-empty, printable, at most 64 chars.
fn clean_token(s: &str, allow_join: bool) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() || t.chars().count() > TOKEN_MAX_LEN {
        return None;
    }
    if !allow_join && t.contains(JOIN_SEPARATOR) {
        return None;
    }
    if t.chars().any(char::is_control) {
        return None;
    }
    Some(t)
}

macro_rules! def_token {
    ($(#[$meta:meta])* $name:ident, allow_join = $join:expr) => {
        $(#[$meta])*
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str { &self.0 }

            /// Case-insensitive comparison (host data mixes cases freely).
            pub fn eq_ignore_case(&self, other: &str) -> bool {
                self.0.to_lowercase() == other.trim().to_lowercase()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl FromStr for $name {
            type Err = CoreError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                clean_token(s, $join)
                    .map(|t| Self(t.to_string()))
                    .ok_or_else(|| CoreError::InvalidToken(s.to_string()))
            }
        }

        #[cfg(feature = "serde")]
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.0)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

def_token!(
    /// Unit number, unique within a plot.
    UnitNumber, allow_join = false
);
def_token!(
    /// Plot label as registered in the project information.
    PlotName, allow_join = true
);
def_token!(
    /// Single (non-composite) property group name.
    GroupName, allow_join = false
);

// ----- GroupKey -----

/// Property group key. `"A+B"` is a combined group whose common area is
/// spread over its base groups.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum GroupKey {
    Simple(GroupName),
    Composite(Vec<GroupName>),
}

impl GroupKey {
    pub fn is_composite(&self) -> bool {
        matches!(self, GroupKey::Composite(_))
    }

    /// Base groups; a simple key is its own single base.
    pub fn bases(&self) -> &[GroupName] {
        match self {
            GroupKey::Simple(g) => core::slice::from_ref(g),
            GroupKey::Composite(gs) => gs,
        }
    }

    pub fn as_simple(&self) -> Option<&GroupName> {
        match self {
            GroupKey::Simple(g) => Some(g),
            GroupKey::Composite(_) => None,
        }
    }

    /// True for a simple key equal (case-insensitive) to `name`.
    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, GroupKey::Simple(g) if g.eq_ignore_case(name))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Simple(g) => f.write_str(g.as_str()),
            GroupKey::Composite(gs) => {
                for (i, g) in gs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{JOIN_SEPARATOR}")?;
                    }
                    f.write_str(g.as_str())?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for GroupKey {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<GroupName> = Vec::new();
        for piece in s.split(JOIN_SEPARATOR) {
            let g: GroupName = piece
                .parse()
                .map_err(|_| CoreError::InvalidGroupKey(s.to_string()))?;
            if parts.iter().any(|p| p.eq_ignore_case(g.as_str())) {
                return Err(CoreError::InvalidGroupKey(s.to_string()));
            }
            parts.push(g);
        }
        match parts.len() {
            0 => Err(CoreError::InvalidGroupKey(s.to_string())),
            1 => Ok(GroupKey::Simple(parts.remove(0))),
            _ => Ok(GroupKey::Composite(parts)),
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for GroupKey {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ----- PrimaryLink -----

/// Ordered, de-duplicated parent numbers of a subordinate unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrimaryLink(Vec<UnitNumber>);

impl PrimaryLink {
    pub fn from_parents<I: IntoIterator<Item = UnitNumber>>(parents: I) -> Self {
        let mut out: Vec<UnitNumber> = Vec::new();
        for p in parents {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        PrimaryLink(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parents(&self) -> &[UnitNumber] {
        &self.0
    }

    pub fn contains(&self, number: &UnitNumber) -> bool {
        self.0.contains(number)
    }
}

impl fmt::Display for PrimaryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{JOIN_SEPARATOR}")?;
            }
            f.write_str(n.as_str())?;
        }
        Ok(())
    }
}

/// Empty (or whitespace-only) input is an empty link, not an error.
impl FromStr for PrimaryLink {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(PrimaryLink::default());
        }
        let parents = s
            .split(JOIN_SEPARATOR)
            .map(str::parse::<UnitNumber>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| CoreError::InvalidToken(s.to_string()))?;
        Ok(PrimaryLink::from_parents(parents))
    }
}

#[cfg(feature = "serde")]
impl Serialize for PrimaryLink {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for PrimaryLink {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
