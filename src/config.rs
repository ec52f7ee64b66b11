//! Run configuration handed to the pipeline by the command line layer

use std::path::PathBuf;
use std::time::Duration;

use crate::filter::YearRange;
use crate::schema::Geography;

pub const DEFAULT_API_BASE: &str = "https://api.census.gov";
pub const DEFAULT_MANIFEST_URL: &str =
    "https://www.census.gov/programs-surveys/acs/technical-documentation/table-shells.2019.html";
pub const DEFAULT_MANIFEST_LINK: &str = "2019 ACS Table List";
pub const DEFAULT_DATABASE: &str = "AmericanCommunitySurvey";
pub const DEFAULT_MAX_COLUMNS: usize = 1024;

/// Hard column ceiling of the bundled SQLite, reached only by wide tables
pub const WIDE_MAX_COLUMNS: usize = 2000;

/// Format of the per-table label metadata endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LabelFormat {
    #[default]
    Html,
    Json,
}

impl LabelFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            LabelFormat::Html => "html",
            LabelFormat::Json => "json",
        }
    }
}

/// Census endpoints and request policy
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub manifest_url: String,
    /// Value of the `name` attribute marking the table list link
    pub manifest_link_name: String,
    /// Table ids must start with this prefix to be loaded
    pub table_prefix: String,
    pub label_format: LabelFormat,
    pub catalog_timeout: Duration,
    pub data_timeout: Duration,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            manifest_link_name: DEFAULT_MANIFEST_LINK.to_string(),
            table_prefix: "B".to_string(),
            label_format: LabelFormat::default(),
            catalog_timeout: Duration::from_secs(10),
            data_timeout: Duration::from_secs(100),
        }
    }
}

/// Location and limits of the SQLite warehouse
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Directory holding the main database file and the namespace files
    pub root: PathBuf,
    pub database: String,
    /// Column limit for normal (non-sparse) tables
    pub max_columns: usize,
    pub busy_timeout: Duration,
}

impl WarehouseConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            database: DEFAULT_DATABASE.to_string(),
            max_columns: DEFAULT_MAX_COLUMNS,
            busy_timeout: Duration::from_secs(30),
        }
    }

    pub fn main_path(&self) -> PathBuf {
        self.root.join(format!("{}.sqlite", self.database))
    }

    pub fn namespace_dir(&self) -> PathBuf {
        self.root.join(&self.database)
    }

    pub fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.namespace_dir().join(format!("{}.sqlite", namespace))
    }
}

/// Everything one run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub years: YearRange,
    /// First table to load; `None` starts at the head of the catalog
    pub start_table: Option<String>,
    /// Load every table from `start_table` onward instead of just that one
    pub all_from_start: bool,
    pub geographies: Vec<Geography>,
    pub api: ApiConfig,
    pub warehouse: WarehouseConfig,
    /// Keep the existing warehouse instead of dropping and recreating it
    pub resume: bool,
    /// Delete each intermediate file once it has been loaded
    pub cleanup: bool,
    /// Directory for intermediate files, logs and the run report
    pub output_dir: PathBuf,
}
