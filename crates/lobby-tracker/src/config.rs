//! Library configuration: source endpoints, timeouts and cache lifetimes.

use chrono::NaiveDate;
use std::time::Duration;

/// Default lifetime of cached datasets and search results.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a whole connector invocation.
pub const DEFAULT_CONNECTOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Default browser-like user agent. Several registers reject unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/131.0.0.0 Safari/537.36";

/// Base URLs of every external source.
///
/// Each field is the full URL of a fixed resource, or a base that the
/// connector appends paths to.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// EU Transparency Register XML export.
    pub eu_register_xml: String,
    /// LobbyFacts.eu base (`/csv_export/{id}`, `/csv_export_meetings/{id}`).
    pub lobbyfacts: String,
    /// HATVP open-data bundle.
    pub hatvp_zip: String,
    /// Bundestag Lobbyregister base (`/sucheDetailJson`, `/sucheJson/{reg}/{entry}`).
    pub bundestag: String,
    /// GOV.UK base (`/api/search.json`, `/api/content{path}`).
    pub gov_uk: String,
    /// Austrian lobbying register list page.
    pub austria_list: String,
    /// Base for Austrian detail pages (`/{doc_id}!OpenDocument`).
    pub austria_detail: String,
    /// Catalan Socrata resource.
    pub catalonia: String,
    /// Finnish transparency register open-data API base.
    pub finland: String,
    /// Slovenian KPK register page.
    pub slovenia: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            eu_register_xml: "https://transparency-register.europa.eu/odplastorganisationxml_en"
                .into(),
            lobbyfacts: "https://www.lobbyfacts.eu".into(),
            hatvp_zip: "https://www.hatvp.fr/agora/opendata/csv/Vues_Separees_CSV.zip".into(),
            bundestag: "https://www.lobbyregister.bundestag.de".into(),
            gov_uk: "https://www.gov.uk".into(),
            austria_list:
                "https://lobbyreg.justiz.gv.at/edikte/ir/iredi18.nsf/liste!OpenForm&subf=a".into(),
            austria_detail: "https://lobbyreg.justiz.gv.at/edikte/ir/iredi18.nsf/alldoc".into(),
            catalonia: "https://analisi.transparenciacatalunya.cat/resource/gwpn-de62.json".into(),
            finland: "https://public.api.avoimuusrekisteri.fi".into(),
            slovenia: "https://www.kpk-rs.si/sl/lobiranje-22/register-lobistov".into(),
        }
    }
}

impl Endpoints {
    /// Point every source at one server, keeping each default path.
    ///
    /// Used by tests that serve fixtures from a single mock server.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            eu_register_xml: format!("{base}/odplastorganisationxml_en"),
            lobbyfacts: base.to_string(),
            hatvp_zip: format!("{base}/agora/opendata/csv/Vues_Separees_CSV.zip"),
            bundestag: base.to_string(),
            gov_uk: base.to_string(),
            austria_list: format!("{base}/edikte/ir/iredi18.nsf/liste"),
            austria_detail: format!("{base}/edikte/ir/iredi18.nsf/alldoc"),
            catalonia: format!("{base}/resource/gwpn-de62.json"),
            finland: base.to_string(),
            slovenia: format!("{base}/sl/lobiranje-22/register-lobistov"),
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
    /// Bound on parallel sub-requests inside one connector.
    pub concurrency: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 4,
        }
    }
}

/// GOV.UK publication discovery settings.
#[derive(Debug, Clone)]
pub struct UkSettings {
    /// Earliest publication date considered.
    pub since: NaiveDate,
    /// Results requested per search page.
    pub page_size: u32,
    /// Hard cap on pages fetched during discovery.
    pub max_pages: u32,
}

impl Default for UkSettings {
    fn default() -> Self {
        Self {
            since: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
            page_size: 100,
            max_pages: 50,
        }
    }
}

/// Top-level configuration for building a live aggregator.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub endpoints: Endpoints,
    pub http: HttpSettings,
    pub uk: UkSettings,
    /// Lifetime of cached datasets and per-term search results.
    pub cache_ttl: Duration,
    /// Upper bound on one connector invocation.
    pub connector_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            http: HttpSettings::default(),
            uk: UkSettings::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            connector_timeout: DEFAULT_CONNECTOR_TIMEOUT,
        }
    }
}
