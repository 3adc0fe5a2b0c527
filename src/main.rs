#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod cache;
mod checker;
mod config;
mod error;
mod http;
mod jobs;
mod metrics;
mod probe;
mod router_driver;
mod server;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proxy-node-auditor", about = "Proxy-node quality-auditing orchestration service")]
struct Cli {
    /// Path to the config file (YAML or JSON).
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Listen port.
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Directory holding cached content files and URL-pointer maps.
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: format!("0.0.0.0:{}", cli.port),
        data_dir: cli.data_dir,
    }))
}
