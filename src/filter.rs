use std::ops::Range;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::schema::{Catalog, Geography, TableDescriptor, WorkUnit};

/// Half-open range of survey years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn years(&self) -> Range<i32> {
        self.start..self.end
    }
}

impl FromStr for YearRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_years(s)
    }
}

/// Parse `"YYYY"` or `"YYYY-YYYY"`.
///
/// The second bound of a range is exclusive: `"2018-2020"` covers 2018 and
/// 2019. A single year `"2020"` covers exactly 2020.
pub fn parse_years(input: &str) -> Result<YearRange> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let parse = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| Error::Configuration(format!("Invalid year '{}' in '{}'", s, input)))
    };

    let range = match compact.split_once('-') {
        Some((start, end)) => YearRange {
            start: parse(start)?,
            end: parse(end)?,
        },
        None => {
            let year = parse(&compact)?;
            YearRange {
                start: year,
                end: year + 1,
            }
        }
    };

    if range.start >= range.end {
        return Err(Error::Configuration(format!(
            "Year range '{}' is empty (the upper bound is exclusive)",
            input
        )));
    }

    Ok(range)
}

/// Select the tables to process, in catalog order.
///
/// `start` defaults to the first catalog entry. With `all_from_start` the
/// catalog suffix beginning at `start` is returned, otherwise only `start`.
pub fn resolve_tables<'a>(
    catalog: &'a Catalog,
    start: Option<&str>,
    all_from_start: bool,
) -> Result<Vec<&'a TableDescriptor>> {
    let start_idx = match start {
        Some(id) => catalog
            .position(id)
            .ok_or_else(|| Error::Configuration(format!("Unknown start table: {}", id)))?,
        None if catalog.is_empty() => {
            return Err(Error::Configuration("Table catalog is empty".to_string()))
        }
        None => 0,
    };

    let tables = &catalog.tables()[start_idx..];
    if all_from_start {
        Ok(tables.iter().collect())
    } else {
        Ok(vec![&tables[0]])
    }
}

/// Cartesian product of years, tables and geographies.
///
/// Years ascend, tables keep catalog order, geographies vary fastest.
pub fn enumerate_units(
    years: &YearRange,
    tables: &[&TableDescriptor],
    geographies: &[Geography],
) -> Vec<WorkUnit> {
    let mut units = Vec::with_capacity(years.years().len() * tables.len() * geographies.len());

    for year in years.years() {
        for table in tables {
            for geography in geographies {
                units.push(WorkUnit {
                    year,
                    geography: *geography,
                    table: (*table).clone(),
                });
            }
        }
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            TableDescriptor::new("B01001", "Sex By Age", "Total population"),
            TableDescriptor::new("B01002", "Median Age By Sex", "Total population"),
            TableDescriptor::new("B01003", "Total Population", "Total population"),
        ])
    }

    #[test]
    fn test_parse_single_year() {
        let range = parse_years("2020").unwrap();
        assert_eq!(range.years().collect::<Vec<_>>(), vec![2020]);
    }

    #[test]
    fn test_parse_range_is_end_exclusive() {
        let range = parse_years("2017 - 2020").unwrap();
        assert_eq!(range.years().collect::<Vec<_>>(), vec![2017, 2018, 2019]);
    }

    #[test]
    fn test_parse_rejects_garbage_and_empty_ranges() {
        assert!(matches!(parse_years("twenty"), Err(Error::Configuration(_))));
        assert!(matches!(parse_years("2020-2020"), Err(Error::Configuration(_))));
        assert!(matches!(parse_years("2020-"), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_resolve_from_start_is_catalog_suffix() {
        let catalog = catalog();
        let tables = resolve_tables(&catalog, Some("B01002"), true).unwrap();
        let ids: Vec<_> = tables.iter().map(|t| t.table_id.as_str()).collect();
        assert_eq!(ids, vec!["B01002", "B01003"]);
    }

    #[test]
    fn test_resolve_defaults_to_first_table() {
        let catalog = catalog();
        assert_eq!(resolve_tables(&catalog, None, true).unwrap().len(), 3);

        let alone = resolve_tables(&catalog, None, false).unwrap();
        assert_eq!(alone.len(), 1);
        assert_eq!(alone[0].table_id, "B01001");
    }

    #[test]
    fn test_resolve_unknown_start_is_configuration_error() {
        let catalog = catalog();
        let err = resolve_tables(&catalog, Some("C02003"), true).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_enumerate_order() {
        let catalog = catalog();
        let tables = resolve_tables(&catalog, Some("B01002"), true).unwrap();
        let years = parse_years("2019-2021").unwrap();
        let units = enumerate_units(&years, &tables, &[Geography::Zcta, Geography::State]);

        let keys: Vec<_> = units.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "2019 - ZCTA - B01002",
                "2019 - STATE - B01002",
                "2019 - ZCTA - B01003",
                "2019 - STATE - B01003",
                "2020 - ZCTA - B01002",
                "2020 - STATE - B01002",
                "2020 - ZCTA - B01003",
                "2020 - STATE - B01003",
            ]
        );
    }
}
