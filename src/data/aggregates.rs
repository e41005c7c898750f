//! Supranational aggregates the provider lists alongside real countries.
//!
//! Income groups, regions and unions are sums or averages of member
//! countries. Keeping them in a panel counts each member twice.

/// Country codes that are aggregates, not countries.
pub const AGGREGATE_CODES: &[&str] = &[
    // world and income groups
    "WLD", "HIC", "LIC", "LMC", "MIC", "UMC", "LMY", "HPC",
    // regions
    "EAS", "ECS", "LCN", "MEA", "NAC", "SAS", "SSF", "AFE", "AFW", "ARB", "CEB", "CSS", "EAP",
    "EAR", "EMU", "EUU", "FCS", "IDA", "IDX", "LAC", "LDC", "LTE", "MNA", "OED", "OSS", "PRE",
    "PSS", "PST", "SSA", "SST", "TEA", "TEC", "TLA", "TMN", "TSA", "TSS",
    // lending groups
    "IBD", "IBT", "IDB",
];

/// Whether `country_code` names an aggregate.
pub fn is_aggregate(country_code: &str) -> bool {
    let code = country_code.trim();
    AGGREGATE_CODES
        .iter()
        .any(|agg| agg.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_aggregates() {
        assert!(is_aggregate("WLD"));
        assert!(is_aggregate("EUU"));
        assert!(is_aggregate("ssf"));
        assert!(is_aggregate(" OED "));
    }

    #[test]
    fn test_countries_pass() {
        assert!(!is_aggregate("USA"));
        assert!(!is_aggregate("DEU"));
        assert!(!is_aggregate("NGA"));
    }

    #[test]
    fn test_no_duplicates() {
        let mut codes = AGGREGATE_CODES.to_vec();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), AGGREGATE_CODES.len());
        assert_eq!(codes.len(), 47);
    }
}
