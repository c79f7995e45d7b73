//! Scope identifiers and consumer scope selectors.
//!
//! Signals carry scopes as raw strings so that malformed values survive construction and are
//! reported by the scope alignment gate. Parsing here only checks the per-kind format; whether an
//! instance exists is decided against a scope registry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    PolicyArea,
    Dimension,
    Cluster,
    Question,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 4] = [
        ScopeKind::PolicyArea,
        ScopeKind::Dimension,
        ScopeKind::Cluster,
        ScopeKind::Question,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            ScopeKind::PolicyArea => "PA",
            ScopeKind::Dimension => "D",
            ScopeKind::Cluster => "CL",
            ScopeKind::Question => "Q",
        }
    }

    /// Number of digits after the prefix.
    pub fn width(self) -> usize {
        match self {
            ScopeKind::PolicyArea => 2,
            ScopeKind::Dimension => 1,
            ScopeKind::Cluster => 2,
            ScopeKind::Question => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::PolicyArea => "policy_area",
            ScopeKind::Dimension => "dimension",
            ScopeKind::Cluster => "cluster",
            ScopeKind::Question => "question",
        }
    }

    // Longest prefixes first so `PA`/`CL` are never mistaken for a shorter one.
    fn detect(raw: &str) -> Option<ScopeKind> {
        [
            ScopeKind::PolicyArea,
            ScopeKind::Cluster,
            ScopeKind::Question,
            ScopeKind::Dimension,
        ]
        .into_iter()
        .find(|k| raw.starts_with(k.prefix()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScopeFormatError {
    #[error("scope '{0}' has no recognised kind prefix (expected PA, D, CL or Q)")]
    UnknownKind(String),
    #[error("scope '{raw}' must be {prefix} followed by exactly {width} digit(s)")]
    BadDigits {
        raw: String,
        prefix: &'static str,
        width: usize,
    },
}

/// A format-valid scope: kind plus numeric index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Scope {
    pub kind: ScopeKind,
    pub index: u16,
}

impl Scope {
    pub fn new(kind: ScopeKind, index: u16) -> Self {
        Self { kind, index }
    }

    pub fn parse(raw: &str) -> Result<Scope, ScopeFormatError> {
        let kind =
            ScopeKind::detect(raw).ok_or_else(|| ScopeFormatError::UnknownKind(raw.to_string()))?;
        let digits = &raw[kind.prefix().len()..];
        if digits.len() != kind.width() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScopeFormatError::BadDigits {
                raw: raw.to_string(),
                prefix: kind.prefix(),
                width: kind.width(),
            });
        }
        // At most three ASCII digits, so this always fits.
        let index = digits.parse::<u16>().map_err(|_| ScopeFormatError::BadDigits {
            raw: raw.to_string(),
            prefix: kind.prefix(),
            width: kind.width(),
        })?;
        Ok(Scope { kind, index })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.kind.prefix(),
            self.index,
            width = self.kind.width()
        )
    }
}

/// What a consumer declares it serves: one exact scope or every scope of a kind (`Q*`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeSelector {
    Exact(Scope),
    AnyOf(ScopeKind),
}

impl ScopeSelector {
    pub fn parse(raw: &str) -> Result<ScopeSelector, ScopeFormatError> {
        if let Some(prefix) = raw.strip_suffix('*') {
            return ScopeKind::ALL
                .into_iter()
                .find(|k| k.prefix() == prefix)
                .map(ScopeSelector::AnyOf)
                .ok_or_else(|| ScopeFormatError::UnknownKind(raw.to_string()));
        }
        Scope::parse(raw).map(ScopeSelector::Exact)
    }

    pub fn matches(&self, scope: &Scope) -> bool {
        match self {
            ScopeSelector::Exact(s) => s == scope,
            ScopeSelector::AnyOf(kind) => scope.kind == *kind,
        }
    }
}

impl fmt::Display for ScopeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeSelector::Exact(s) => write!(f, "{s}"),
            ScopeSelector::AnyOf(kind) => write!(f, "{}*", kind.prefix()),
        }
    }
}
