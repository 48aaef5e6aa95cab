use std::{sync::Arc, time::Duration};

use clap::{ArgAction, Parser};
use mongex_common::error::MongexError;
use mongex_exporter::{
    Exporter, ExporterOpts, MongoConnector, exporter_router,
    opts::{DEFAULT_METRICS_PATH, DEFAULT_URI},
    router::HEALTH_PATH,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mongex", about = "Prometheus exporter for MongoDB")]
struct Cli {
    #[arg(long = "mongodb.uri", env = "MONGODB_URI", default_value = DEFAULT_URI)]
    mongodb_uri: String,

    #[arg(long = "web.listen-address", default_value = ":9216")]
    listen_address: String,

    #[arg(long = "web.telemetry-path", default_value = DEFAULT_METRICS_PATH)]
    telemetry_path: String,

    #[arg(long = "compatible-mode", default_value_t = false)]
    compatible_mode: bool,

    #[arg(long = "mongodb.global-conn-pool", default_value_t = false)]
    global_conn_pool: bool,

    #[arg(long = "mongodb.collstats-colls", value_delimiter = ',')]
    collstats_colls: Vec<String>,

    #[arg(long = "mongodb.indexstats-colls", value_delimiter = ',')]
    indexstats_colls: Vec<String>,

    #[arg(long = "collector.dbstats", default_value_t = false)]
    dbstats: bool,

    #[arg(long = "collector.dbstats-dbs", value_delimiter = ',')]
    dbstats_dbs: Vec<String>,

    #[arg(long = "collector.sharded", default_value_t = false)]
    sharded: bool,

    #[arg(long = "collector.diagnosticdata", default_value_t = true, action = ArgAction::Set)]
    diagnosticdata: bool,

    #[arg(long = "no-diagnosticdata", default_value_t = false)]
    no_diagnosticdata: bool,

    #[arg(long = "collector.replicasetstatus", default_value_t = true, action = ArgAction::Set)]
    replicasetstatus: bool,

    #[arg(long = "no-replicasetstatus", default_value_t = false)]
    no_replicasetstatus: bool,

    #[arg(long = "discovering-mode", default_value_t = false)]
    discovering_mode: bool,

    #[arg(long = "collector.collstats-limit", default_value_t = 0)]
    collstats_limit: usize,

    /// Seconds allowed for connecting and for each collector fetch.
    #[arg(long = "mongodb.timeout", default_value_t = 10)]
    timeout: u64,

    #[arg(long = "log.level", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn exporter_opts(&self) -> Result<ExporterOpts, MongexError> {
        if !self.telemetry_path.starts_with('/') || self.telemetry_path == HEALTH_PATH {
            return Err(MongexError::InvalidArgument(format!(
                "invalid telemetry path {:?}",
                self.telemetry_path
            )));
        }
        if self.timeout == 0 {
            return Err(MongexError::InvalidArgument(
                "--mongodb.timeout must be at least one second".to_string(),
            ));
        }

        Ok(ExporterOpts {
            uri: self.mongodb_uri.clone(),
            metrics_path: self.telemetry_path.clone(),
            compatible_mode: self.compatible_mode,
            global_conn_pool: self.global_conn_pool,
            collstats_namespaces: clean(&self.collstats_colls),
            indexstats_namespaces: clean(&self.indexstats_colls),
            enable_dbstats: self.dbstats,
            dbstats_namespaces: clean(&self.dbstats_dbs),
            enable_sharded: self.sharded,
            enable_diagnostic_data: self.diagnosticdata && !self.no_diagnosticdata,
            enable_replicaset_status: self.replicasetstatus && !self.no_replicasetstatus,
            discovering_mode: self.discovering_mode,
            collstats_limit: self.collstats_limit,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

fn clean(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn bind_address(listen_address: &str) -> String {
    match listen_address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => listen_address.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter =
        EnvFilter::from_default_env().add_directive(format!("mongex={}", cli.log_level).parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let opts = cli.exporter_opts()?;
    let connector = Arc::new(MongoConnector::new(opts.timeout));
    let exporter = Arc::new(Exporter::new(opts, connector).await);

    let app = exporter_router(Arc::clone(&exporter));

    let addr = bind_address(&cli.listen_address);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        metrics_path = %exporter.opts().metrics_path,
        compatible_mode = exporter.opts().compatible_mode,
        "mongex listening on {addr}"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
