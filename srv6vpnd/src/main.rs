mod config;
mod fib;
mod inst;
mod logging;
mod show;
mod srv6;
mod vpn;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use daemonize::Daemonize;
use ipnet::IpNet;

use config::Config;
use fib::MemoryDataplane;
use inst::Srv6Vpn;
use logging::{LogFormat, LogOutputType, LoggingConfig, tracing_set};
use show::ShowCommand;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Arg {
    #[arg(short, long, help = "Configuration file (YAML)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Run as daemon in background")]
    daemon: bool,

    #[arg(long, value_enum, help = "Print state after the configuration is applied")]
    show: Vec<ShowCommand>,

    #[arg(long, help = "Prefix filter for --show vpn")]
    prefix: Option<IpNet>,

    #[arg(long, help = "Locator name for --show locator")]
    locator: Option<String>,

    #[arg(long, help = "JSON output for --show")]
    json: bool,

    #[arg(long, help = "Exit after applying the configuration")]
    oneshot: bool,

    #[arg(long, value_enum, default_value = "stdout", help = "Log output")]
    log_output: LogOutputType,

    #[arg(long, value_enum, default_value = "terminal", help = "Log format")]
    log_format: LogFormat,

    #[arg(long, help = "Log file path when --log-output=file")]
    log_file: Option<String>,
}

// 1. --config
// 2. ~/.srv6vpnd/srv6vpnd.yaml
// 3. /etc/srv6vpnd/srv6vpnd.yaml
fn config_path(arg: &Arg) -> Option<PathBuf> {
    if let Some(path) = &arg.config {
        return Some(path.clone());
    }
    if let Some(mut home) = dirs::home_dir() {
        home.push(".srv6vpnd");
        home.push("srv6vpnd.yaml");
        if home.exists() {
            return Some(home);
        }
    }
    let path = PathBuf::from("/etc/srv6vpnd/srv6vpnd.yaml");
    path.exists().then_some(path)
}

fn daemonize() -> anyhow::Result<()> {
    let daemonize = Daemonize::new()
        .pid_file("/var/run/srv6vpnd.pid")
        .chown_pid_file(true)
        .working_directory("/")
        .umask(0o027);

    daemonize
        .start()
        .map_err(|e| anyhow::anyhow!("Failed to daemonize: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arg = Arg::parse();

    if arg.daemon {
        daemonize()?;
    }

    let log_config = LoggingConfig::from_args(arg.log_output, arg.log_file.as_deref(), arg.log_format);
    tracing_set(arg.daemon, Some(log_config));

    let config = match config_path(&arg) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let dataplane = Arc::new(MemoryDataplane::new());
    let srv6 = Srv6Vpn::new(
        dataplane,
        config.fib.clone(),
        config.segment_routing.srv6.encap_source,
    );
    if let Err(err) = config.apply(&srv6).await {
        srv6.shutdown().await;
        return Err(err.context("failed to apply configuration"));
    }
    tracing::info!("srv6vpnd started");

    for command in arg.show.iter() {
        let output = srv6
            .show(*command, arg.prefix, arg.locator.as_deref(), arg.json)
            .await
            .context("show")?;
        println!("{}", output);
    }

    if !arg.oneshot {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
    }
    srv6.shutdown().await;
    Ok(())
}
