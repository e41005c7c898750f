//! Known-good indicator pairs chosen from hypothesis keywords.
//!
//! Used only after a tautological pair was detected. Rules are tried in
//! order; the first whose keywords all match wins.

use crate::models::IndicatorCode;

/// A keyword trigger and the pair it selects.
#[derive(Debug, Clone, Copy)]
pub struct FallbackRule {
    /// Every one of these must appear in the hypothesis.
    pub all_of: &'static [&'static str],
    /// At least one of these must appear as well.
    pub any_of: &'static [&'static str],
    pub independent: &'static str,
    pub dependent: &'static str,
    pub x_label: &'static str,
    pub y_label: &'static str,
}

/// Replacement pair for a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPair {
    pub independent: IndicatorCode,
    pub dependent: IndicatorCode,
    pub x_label: String,
    pub y_label: String,
}

pub const FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        all_of: &["health"],
        any_of: &["life expectancy", "mortality", "life"],
        independent: "SH.XPD.CHEX.GD.ZS",
        dependent: "SP.DYN.LE00.IN",
        x_label: "Current health expenditure (% of GDP)",
        y_label: "Life expectancy at birth (years)",
    },
    FallbackRule {
        all_of: &["education"],
        any_of: &["gdp", "growth", "income"],
        independent: "SE.XPD.TOTL.GD.ZS",
        dependent: "NY.GDP.PCAP.PP.KD",
        x_label: "Government expenditure on education (% of GDP)",
        y_label: "GDP per capita (PPP, constant 2017 $)",
    },
    FallbackRule {
        all_of: &["internet"],
        any_of: &["gdp", "growth", "income"],
        independent: "IT.NET.USER.ZS",
        dependent: "NY.GDP.PCAP.PP.KD",
        x_label: "Individuals using the Internet (% of population)",
        y_label: "GDP per capita (PPP, constant 2017 $)",
    },
];

impl FallbackRule {
    pub fn matches(&self, hypothesis_lower: &str) -> bool {
        self.all_of.iter().all(|k| hypothesis_lower.contains(k))
            && (self.any_of.is_empty() || self.any_of.iter().any(|k| hypothesis_lower.contains(k)))
    }

    pub fn pair(&self) -> FallbackPair {
        FallbackPair {
            independent: IndicatorCode::new(self.independent),
            dependent: IndicatorCode::new(self.dependent),
            x_label: self.x_label.to_string(),
            y_label: self.y_label.to_string(),
        }
    }
}

/// First matching rule in `rules` for the hypothesis text.
pub fn select_fallback(rules: &[FallbackRule], hypothesis: &str) -> Option<FallbackPair> {
    let lower = hypothesis.to_lowercase();
    rules.iter().find(|r| r.matches(&lower)).map(FallbackRule::pair)
}
