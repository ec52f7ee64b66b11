//! Geographic rollups and the state FIPS table used for block groups

use crate::error::{Error, Result};

/// A state abbreviation and its FIPS code
#[derive(Debug, PartialEq, Eq)]
pub struct StateCode {
    pub abbr: &'static str,
    pub fips: &'static str,
}

const fn state(abbr: &'static str, fips: &'static str) -> StateCode {
    StateCode { abbr, fips }
}

/// The fifty states and DC, in abbreviation order
pub static STATES: &[StateCode] = &[
    state("AK", "02"),
    state("AL", "01"),
    state("AR", "05"),
    state("AZ", "04"),
    state("CA", "06"),
    state("CO", "08"),
    state("CT", "09"),
    state("DC", "11"),
    state("DE", "10"),
    state("FL", "12"),
    state("GA", "13"),
    state("HI", "15"),
    state("IA", "19"),
    state("ID", "16"),
    state("IL", "17"),
    state("IN", "18"),
    state("KS", "20"),
    state("KY", "21"),
    state("LA", "22"),
    state("MA", "25"),
    state("MD", "24"),
    state("ME", "23"),
    state("MI", "26"),
    state("MN", "27"),
    state("MO", "29"),
    state("MS", "28"),
    state("MT", "30"),
    state("NC", "37"),
    state("ND", "38"),
    state("NE", "31"),
    state("NH", "33"),
    state("NJ", "34"),
    state("NM", "35"),
    state("NV", "32"),
    state("NY", "36"),
    state("OH", "39"),
    state("OK", "40"),
    state("OR", "41"),
    state("PA", "42"),
    state("RI", "44"),
    state("SC", "45"),
    state("SD", "46"),
    state("TN", "47"),
    state("TX", "48"),
    state("UT", "49"),
    state("VA", "51"),
    state("VT", "50"),
    state("WA", "53"),
    state("WI", "55"),
    state("WV", "54"),
    state("WY", "56"),
];

/// Look up a state by its two-letter abbreviation (case-insensitive)
pub fn state_by_abbr(abbr: &str) -> Option<&'static StateCode> {
    STATES.iter().find(|s| s.abbr.eq_ignore_ascii_case(abbr.trim()))
}

/// Spatial aggregation level of one API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geography {
    Zcta,
    State,
    County,
    BlockGroup(&'static StateCode),
}

impl Geography {
    /// Label used in namespace and file names
    pub fn label(&self) -> String {
        match self {
            Geography::Zcta => "ZCTA".to_string(),
            Geography::State => "STATE".to_string(),
            Geography::County => "COUNTY".to_string(),
            Geography::BlockGroup(state) => format!("BLOCKGROUP_{}", state.abbr),
        }
    }

    /// The `for=` (and `in=`) query clause, already URL-encoded
    pub fn api_clause(&self) -> String {
        match self {
            Geography::Zcta => "zip%20code%20tabulation%20area:*".to_string(),
            Geography::State => "state:*".to_string(),
            Geography::County => "county:*".to_string(),
            Geography::BlockGroup(state) => {
                format!("block%20group:*&in=state:{}%20county:*", state.fips)
            }
        }
    }

    /// Warehouse namespace holding this geography's tables for `year`
    pub fn namespace(&self, year: i32) -> String {
        format!("{}_{}", year, self.label())
    }
}

/// A rollup selected on the command line, before block groups are expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollup {
    Zcta,
    State,
    County,
    BlockGroup,
}

impl Rollup {
    pub const ALL: [Rollup; 4] = [Rollup::Zcta, Rollup::State, Rollup::County, Rollup::BlockGroup];
}

/// Expand selected rollups into concrete geographies.
///
/// No selection means every rollup. Block groups are requested per state:
/// all of [`STATES`] unless `states` names a subset. Unknown abbreviations
/// are a configuration error.
pub fn expand_geographies(rollups: &[Rollup], states: &[String]) -> Result<Vec<Geography>> {
    let rollups: &[Rollup] = if rollups.is_empty() {
        &Rollup::ALL
    } else {
        rollups
    };

    let block_states: Vec<&'static StateCode> = if states.is_empty() {
        STATES.iter().collect()
    } else {
        states
            .iter()
            .map(|abbr| {
                state_by_abbr(abbr)
                    .ok_or_else(|| Error::Configuration(format!("Unknown state: {}", abbr)))
            })
            .collect::<Result<_>>()?
    };

    let mut geographies = Vec::new();
    for rollup in Rollup::ALL {
        if !rollups.contains(&rollup) {
            continue;
        }
        match rollup {
            Rollup::Zcta => geographies.push(Geography::Zcta),
            Rollup::State => geographies.push(Geography::State),
            Rollup::County => geographies.push(Geography::County),
            Rollup::BlockGroup => {
                geographies.extend(block_states.iter().copied().map(Geography::BlockGroup))
            }
        }
    }

    Ok(geographies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table_is_complete_and_unique() {
        assert_eq!(STATES.len(), 51);
        let mut fips: Vec<_> = STATES.iter().map(|s| s.fips).collect();
        fips.sort();
        fips.dedup();
        assert_eq!(fips.len(), 51);
    }

    #[test]
    fn test_api_clauses() {
        assert_eq!(Geography::Zcta.api_clause(), "zip%20code%20tabulation%20area:*");
        assert_eq!(Geography::State.api_clause(), "state:*");
        assert_eq!(Geography::County.api_clause(), "county:*");
        let ca = state_by_abbr("ca").unwrap();
        assert_eq!(
            Geography::BlockGroup(ca).api_clause(),
            "block%20group:*&in=state:06%20county:*"
        );
    }

    #[test]
    fn test_namespace_names() {
        assert_eq!(Geography::Zcta.namespace(2020), "2020_ZCTA");
        let tx = state_by_abbr("TX").unwrap();
        assert_eq!(Geography::BlockGroup(tx).namespace(2019), "2019_BLOCKGROUP_TX");
    }

    #[test]
    fn test_expand_defaults_to_everything() {
        let geos = expand_geographies(&[], &[]).unwrap();
        assert_eq!(geos.len(), 3 + STATES.len());
        assert_eq!(geos[0], Geography::Zcta);
        assert_eq!(geos[1], Geography::State);
        assert_eq!(geos[2], Geography::County);
    }

    #[test]
    fn test_expand_block_group_subset() {
        let geos =
            expand_geographies(&[Rollup::BlockGroup], &["wa".to_string(), "OR".to_string()])
                .unwrap();
        let labels: Vec<_> = geos.iter().map(|g| g.label()).collect();
        assert_eq!(labels, vec!["BLOCKGROUP_WA", "BLOCKGROUP_OR"]);
    }

    #[test]
    fn test_expand_rejects_unknown_state() {
        let err = expand_geographies(&[Rollup::BlockGroup], &["XX".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
