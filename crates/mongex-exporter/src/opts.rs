use std::time::Duration;

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ExporterOpts {
    pub uri: String,
    pub metrics_path: String,
    pub compatible_mode: bool,
    pub global_conn_pool: bool,
    pub collstats_namespaces: Vec<String>,
    pub indexstats_namespaces: Vec<String>,
    pub enable_dbstats: bool,
    pub dbstats_namespaces: Vec<String>,
    pub enable_sharded: bool,
    pub enable_diagnostic_data: bool,
    pub enable_replicaset_status: bool,
    pub discovering_mode: bool,
    pub collstats_limit: usize,
    pub timeout: Duration,
}

impl Default for ExporterOpts {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            compatible_mode: false,
            global_conn_pool: false,
            collstats_namespaces: Vec::new(),
            indexstats_namespaces: Vec::new(),
            enable_dbstats: false,
            dbstats_namespaces: Vec::new(),
            enable_sharded: false,
            enable_diagnostic_data: true,
            enable_replicaset_status: true,
            discovering_mode: false,
            collstats_limit: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
