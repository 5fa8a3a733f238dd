pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "podtag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Enrich tracing spans with Kubernetes pod labels", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to a YAML config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Watch pods and serve lookups and span enrichment")]
    Serve(ServeArgs),
    #[command(about = "Print the effective configuration")]
    Config(ServeArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(long, help = "Address to listen on")]
    pub listen: Option<SocketAddr>,

    #[arg(long, help = "Collector URL span batches are forwarded to")]
    pub forward_url: Option<String>,

    #[arg(long, help = "Largest span batch accepted, in bytes")]
    pub max_body_bytes: Option<usize>,

    #[arg(long, help = "Index pods by name alone instead of namespace/name")]
    pub name_only: bool,

    #[arg(
        short,
        long = "namespace",
        help = "Namespace to watch (repeatable, default all)"
    )]
    pub namespaces: Vec<String>,

    #[arg(
        short,
        long = "label",
        help = "Label to attach to spans (repeatable, default all)"
    )]
    pub labels: Vec<String>,

    #[arg(long, help = "Prefix for tag keys added to spans")]
    pub tag_prefix: Option<String>,

    #[arg(
        long = "identity-key",
        help = "Span tag holding the pod identity (repeatable, in priority order)"
    )]
    pub identity_keys: Vec<String>,
}
