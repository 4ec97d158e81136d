//! Lobby Tracker: search European lobbying transparency registers at once.
//!
//! Nine jurisdiction connectors normalize their sources into [`Record`]s,
//! the [`Aggregator`] runs them concurrently behind a 24-hour result cache,
//! and [`export::write_workbook`] turns a [`SearchResult`] into an XLSX
//! workbook.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod connectors;
pub mod error;
pub mod export;
pub mod http_client;
pub mod query;
pub mod registry;
pub mod types;

pub use aggregator::Aggregator;
pub use config::TrackerConfig;
pub use connectors::{Connector, ConnectorSet};
pub use error::{ConnectorError, ConnectorResult, ExportError, ExportResult};
pub use export::{export_filename, write_workbook};
pub use query::SearchQuery;
pub use registry::{Jurisdiction, JurisdictionId, UnknownJurisdiction};
pub use types::*;
