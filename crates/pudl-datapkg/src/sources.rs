//! Data source registry
//!
//! Static attribution tables: which agencies a table's data comes from, the
//! keywords and contributors associated with each source, and the license
//! every package is published under. A table belongs to source `s` when its
//! name ends in `_<s>`, e.g. `generation_eia923` -> `eia923`.

use crate::error::Result;
use crate::foreign_keys::ForeignKeyGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Source every package is attributed to
pub const PUDL_SOURCE: &str = "pudl";

/// Static description of one upstream data source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSourceInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub path: &'static str,
}

pub const DATA_SOURCES: &[DataSourceInfo] = &[
    DataSourceInfo {
        code: "eia860",
        title: "EIA Form 860",
        path: "https://www.eia.gov/electricity/data/eia860/",
    },
    DataSourceInfo {
        code: "eia861",
        title: "EIA Form 861",
        path: "https://www.eia.gov/electricity/data/eia861/",
    },
    DataSourceInfo {
        code: "eia923",
        title: "EIA Form 923",
        path: "https://www.eia.gov/electricity/data/eia923/",
    },
    DataSourceInfo {
        code: "epacems",
        title: "EPA Air Markets Program Data: Hourly Continuous Emission Monitoring System",
        path: "https://ampd.epa.gov/ampd/",
    },
    DataSourceInfo {
        code: "epaipm",
        title: "EPA Integrated Planning Model",
        path: "https://www.epa.gov/airmarkets/national-electric-energy-data-system-needs-v6",
    },
    DataSourceInfo {
        code: "ferc1",
        title: "FERC Form 1",
        path: "https://www.ferc.gov/docs-filing/forms/form-1/data.asp",
    },
    DataSourceInfo {
        code: PUDL_SOURCE,
        title: "The Public Utility Data Liberation Project (PUDL)",
        path: "https://catalyst.coop/pudl/",
    },
];

const KEYWORDS: &[(&str, &[&str])] = &[
    ("eia860", &["electricity", "electric", "boiler", "generator", "plant", "utility", "fuel", "coal", "natural gas", "prime mover", "eia860", "retirement", "capacity", "planned", "proposed", "energy", "hydro", "solar", "wind", "nuclear", "form 860", "eia"]),
    ("eia861", &["electricity", "electric", "utility", "sales", "customers", "demand response", "net metering", "eia861", "form 861", "eia"]),
    ("eia923", &["fuel", "boiler", "generator", "plant", "utility", "cost", "price", "natural gas", "coal", "eia923", "energy", "electricity", "form 923", "receipts", "net generation", "eia"]),
    ("epacems", &["epa", "us", "emissions", "pollution", "ghg", "so2", "co2", "sox", "nox", "load", "utility", "electricity", "plant", "generator", "unit", "generation", "capacity", "output", "power", "heat content", "mmbtu", "steam", "cems", "continuous emissions monitoring system", "hourly", "environmental protection agency", "ampd", "air markets program data"]),
    ("epaipm", &["epaipm", "integrated planning", "transmission", "load curves", "regions"]),
    ("ferc1", &["electricity", "electric", "utility", "plant", "steam", "generation", "cost", "expense", "price", "heat content", "ferc", "form 1", "federal energy regulatory commission", "capital", "accounting", "depreciation", "finance", "plant in service", "hydro", "coal", "natural gas", "gas", "opex", "capex", "accounts", "investment", "valuation"]),
    (PUDL_SOURCE, &["us", "electricity", "open data", "open source"]),
];

/// Static description of one contributor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributorInfo {
    pub key: &'static str,
    pub title: &'static str,
    pub role: &'static str,
    pub organization: &'static str,
    pub path: Option<&'static str>,
}

pub const CONTRIBUTORS: &[ContributorInfo] = &[
    ContributorInfo {
        key: "catalyst-cooperative",
        title: "Catalyst Cooperative",
        role: "publisher",
        organization: "Catalyst Cooperative",
        path: Some("https://catalyst.coop/"),
    },
    ContributorInfo {
        key: "zane-selvans",
        title: "Zane Selvans",
        role: "wrangler",
        organization: "Catalyst Cooperative",
        path: None,
    },
    ContributorInfo {
        key: "christina-gosnell",
        title: "Christina Gosnell",
        role: "contributor",
        organization: "Catalyst Cooperative",
        path: None,
    },
    ContributorInfo {
        key: "steven-winter",
        title: "Steven Winter",
        role: "contributor",
        organization: "Catalyst Cooperative",
        path: None,
    },
    ContributorInfo {
        key: "alana-wilson",
        title: "Alana Wilson",
        role: "contributor",
        organization: "Catalyst Cooperative",
        path: None,
    },
    ContributorInfo {
        key: "karl-dunkle-werner",
        title: "Karl Dunkle Werner",
        role: "contributor",
        organization: "Catalyst Cooperative",
        path: None,
    },
    ContributorInfo {
        key: "greg-schivley",
        title: "Greg Schivley",
        role: "contributor",
        organization: "Carbon Impact Consulting",
        path: None,
    },
];

const CONTRIBUTORS_BY_SOURCE: &[(&str, &[&str])] = &[
    ("eia860", &["catalyst-cooperative", "zane-selvans", "christina-gosnell", "steven-winter"]),
    ("eia861", &["catalyst-cooperative", "zane-selvans", "christina-gosnell"]),
    ("eia923", &["catalyst-cooperative", "zane-selvans", "christina-gosnell", "steven-winter"]),
    ("epacems", &["catalyst-cooperative", "karl-dunkle-werner", "zane-selvans"]),
    ("epaipm", &["greg-schivley"]),
    ("ferc1", &["catalyst-cooperative", "zane-selvans", "christina-gosnell", "steven-winter", "alana-wilson"]),
    (PUDL_SOURCE, &["catalyst-cooperative", "zane-selvans", "christina-gosnell", "steven-winter", "alana-wilson"]),
];

/// Source attribution as embedded in descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub path: String,
}

impl From<&DataSourceInfo> for Source {
    fn from(info: &DataSourceInfo) -> Self {
        Self {
            title: info.title.to_string(),
            path: info.path.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub title: String,
    pub role: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&ContributorInfo> for Contributor {
    fn from(info: &ContributorInfo) -> Self {
        Self {
            title: info.title.to_string(),
            role: info.role.to_string(),
            organization: info.organization.to_string(),
            path: info.path.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub name: String,
    pub title: String,
    pub path: String,
}

/// The license every PUDL package is published under
pub fn cc_by_4_0() -> License {
    License {
        name: "CC-BY-4.0".to_string(),
        title: "Creative Commons Attribution 4.0".to_string(),
        path: "https://creativecommons.org/licenses/by/4.0/".to_string(),
    }
}

pub fn data_source_info(code: &str) -> Option<&'static DataSourceInfo> {
    DATA_SOURCES.iter().find(|s| s.code == code)
}

pub fn keywords_by_source(code: &str) -> &'static [&'static str] {
    lookup_static(KEYWORDS, code)
}

pub fn contributors_by_source(code: &str) -> &'static [&'static str] {
    lookup_static(CONTRIBUTORS_BY_SOURCE, code)
}

pub fn contributor(key: &str) -> Option<&'static ContributorInfo> {
    CONTRIBUTORS.iter().find(|c| c.key == key)
}

fn lookup_static(table: &'static [(&'static str, &'static [&'static str])], code: &str) -> &'static [&'static str] {
    table
        .iter()
        .find(|(source, _)| *source == code)
        .map(|(_, values)| *values)
        .unwrap_or(&[])
}

/// `.*_<source>$` for every registered source
#[allow(clippy::expect_used)]
static SOURCE_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    DATA_SOURCES
        .iter()
        .map(|source| {
            let pattern = Regex::new(&format!(".*_{}$", regex::escape(source.code))).expect("valid source pattern");
            (source.code, pattern)
        })
        .collect()
});

/// Data sources used by some tables and everything they reference
///
/// Always includes [`PUDL_SOURCE`].
pub fn data_sources_from_tables<I, S>(graph: &ForeignKeyGraph, tables: I) -> Result<BTreeSet<&'static str>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let all_tables = graph.closure(tables)?;

    let mut sources = BTreeSet::from([PUDL_SOURCE]);
    for table in &all_tables {
        sources.extend(
            SOURCE_PATTERNS
                .iter()
                .filter(|(_, pattern)| pattern.is_match(table))
                .map(|(code, _)| *code),
        );
    }

    Ok(sources)
}

/// Union of the keywords of every source, sorted
pub fn compile_keywords<'a, I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    sources
        .into_iter()
        .flat_map(keywords_by_source)
        .map(|k| k.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Contributors to any of the sources, deduplicated and ordered by key
pub fn compile_contributors<'a, I>(sources: I) -> Vec<Contributor>
where
    I: IntoIterator<Item = &'a str>,
{
    sources
        .into_iter()
        .flat_map(contributors_by_source)
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter_map(contributor)
        .map(Contributor::from)
        .collect()
}

/// Descriptor attribution entries for a set of source codes
pub fn compile_sources<'a, I>(sources: I) -> Vec<Source>
where
    I: IntoIterator<Item = &'a str>,
{
    sources
        .into_iter()
        .filter_map(data_source_info)
        .map(Source::from)
        .collect()
}
