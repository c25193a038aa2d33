use clap::{Args, Parser, Subcommand};
use zproxy_common::GlobalConfigPatch;

#[derive(Parser)]
#[command(name = "zproxy", version, about = "Local model-server gateway for the Z.AI coding API")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the gateway.
    Serve(ServeArgs),
    /// Read or write the persisted config file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Default)]
pub(crate) struct ServeArgs {
    #[arg(short = 'H', long)]
    pub(crate) host: Option<String>,
    #[arg(short, long)]
    pub(crate) port: Option<u16>,
    #[arg(short, long)]
    pub(crate) debug: bool,
    /// Egress proxy for upstream calls, e.g. http://127.0.0.1:7890.
    #[arg(long)]
    pub(crate) proxy: Option<String>,
}

impl ServeArgs {
    /// Only flags actually given override lower layers.
    pub(crate) fn patch(&self) -> GlobalConfigPatch {
        GlobalConfigPatch {
            host: self.host.clone(),
            port: self.port,
            debug: self.debug.then_some(true),
            proxy: self.proxy.clone(),
            ..GlobalConfigPatch::default()
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Set one of: api_key, base_url, host, port.
    Set { key: String, value: String },
    /// Print one of: api_key, base_url, host, port.
    Get { key: String },
    /// Print the config file location.
    Path,
}
