use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "volley",
    author,
    version,
    about = "Distributed HTTP load generator with declarative checks and thresholds",
    long_about = "volley runs the scenarios of a TOML plan against an HTTP target, validates \
                  responses and evaluates thresholds.\n\n\
                  Instances can stream every attempt to a `volley collect` daemon, which \
                  exposes fleet-wide Prometheus metrics."
)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default, Clone, Copy)]
pub struct LogArgs {
    /// Log at debug level, including every check result
    #[arg(long, global = true, conflicts_with = "silent")]
    pub debug: bool,

    /// Only log errors
    #[arg(long, global = true)]
    pub silent: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan file
    Run(RunArgs),

    /// Receive records from generator instances and serve them as Prometheus metrics
    Collect(CollectArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// TOML plan file
    pub plan: PathBuf,

    /// Collector address (host:port) to stream attempts to
    #[arg(long, value_name = "ADDR")]
    pub collector: Option<String>,

    /// Group identifier attached to every streamed record
    #[arg(long, requires = "collector")]
    pub group: Option<String>,

    /// Do not print the results summary
    #[arg(long)]
    pub skip_results: bool,

    /// Exit with status 0 even when thresholds fail
    #[arg(long)]
    pub skip_exit_code: bool,
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Port for the record stream
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Port for the /metrics scrape endpoint
    #[arg(long, default_value_t = 9090)]
    pub metrics_port: u16,

    /// Prefix for every exported metric name
    #[arg(long, default_value = "volley_")]
    pub prefix: String,

    /// Address to bind both listeners on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: std::net::IpAddr,
}
