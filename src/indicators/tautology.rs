//! Detection of degenerate cause/effect pairs.
//!
//! Two indicators from the same concept family (two GDP measures, two
//! demographic rates) make any regression between them close to an
//! accounting identity.

use crate::models::IndicatorCode;
use std::fmt;

/// Coarse concept families keyed by code prefix.
pub const INDICATOR_FAMILIES: &[(&str, &str)] = &[
    ("NY.GDP", "GDP"),
    ("SE.XPD", "Education spending"),
    ("SH.XPD", "Health spending"),
    ("SP.DYN", "Demographics"),
    ("SI.POV", "Poverty"),
];

/// Why a pair was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TautologyReason {
    SameCode,
    SameFamily(&'static str),
    SharedSegments(String),
}

impl fmt::Display for TautologyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TautologyReason::SameCode => write!(f, "identical indicator codes"),
            TautologyReason::SameFamily(family) => write!(f, "both in the {} family", family),
            TautologyReason::SharedSegments(prefix) => write!(f, "both under {}", prefix),
        }
    }
}

/// Check a pair, most specific rule first.
pub fn tautology_reason(x: &IndicatorCode, y: &IndicatorCode) -> Option<TautologyReason> {
    if x == y {
        return Some(TautologyReason::SameCode);
    }

    for (prefix, family) in INDICATOR_FAMILIES {
        if x.as_str().starts_with(prefix) && y.as_str().starts_with(prefix) {
            return Some(TautologyReason::SameFamily(family));
        }
    }

    let x_head = leading_segments(x);
    match x_head {
        Some(head) if Some(head) == leading_segments(y) => {
            Some(TautologyReason::SharedSegments(format!("{}.{}", head.0, head.1)))
        }
        _ => None,
    }
}

/// True when `x` and `y` measure the same underlying concept.
pub fn is_tautology(x: &IndicatorCode, y: &IndicatorCode) -> bool {
    tautology_reason(x, y).is_some()
}

fn leading_segments(code: &IndicatorCode) -> Option<(&str, &str)> {
    let mut segments = code.segments();
    let first = segments.next().filter(|s| !s.is_empty())?;
    let second = segments.next().filter(|s| !s.is_empty())?;
    Some((first, second))
}
