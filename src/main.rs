use crate::common::config::Config;
use crate::common::logger;
use crate::proxy::TcpProxy;
use clap::Parser;
use log::LevelFilter;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;

mod common;
mod net;
mod proxy;

/// Fallback logger that writes to stderr when log4rs fails to initialise.
struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= LevelFilter::Info
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Unauthenticated CONNECT-only SOCKS5 relay", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,

    #[arg(long, value_name = "ADDRESS")]
    listen_address: Option<String>,

    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, value_name = "SIZE")]
    buffer_size: Option<usize>,

    #[arg(long, value_name = "COUNT")]
    max_connections: Option<usize>,

    #[arg(long, value_name = "SECONDS")]
    connect_timeout: Option<u64>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(listen_address) = self.listen_address {
            config.listen_address = listen_address;
        }
        if let Some(log_level) = self.log_level {
            config.log.level = log_level;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(max_connections) = self.max_connections {
            config.max_connections = max_connections;
        }
        if let Some(connect_timeout) = self.connect_timeout {
            config.connect_timeout = connect_timeout;
        }
    }
}

fn load_config(path: &str) -> Config {
    if !Path::new(path).exists() {
        eprintln!("Config file {} not found, using defaults", path);
        return Config::default();
    }

    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let print_config = args.print_config;

    let mut config = load_config(&args.config);
    args.apply(&mut config);

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if print_config {
        match config.to_toml() {
            Ok(rendered) => print!("{}", rendered),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(e) = logger::setup_logger(&config.log) {
        eprintln!("Failed to initialize logger: {}", e);
        if log::set_boxed_logger(Box::new(SimpleLogger)).is_ok() {
            log::set_max_level(LevelFilter::Info);
        }
    }

    log::info!("Starting with config: {:?}", config);

    let listener = match TcpListener::bind(&config.listen_address).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind to {}: {}", config.listen_address, e);
            std::process::exit(1);
        }
    };

    let proxy = TcpProxy::new(
        config.buffer_size,
        config.max_connections,
        Duration::from_secs(config.connect_timeout),
    );

    proxy.run(listener).await;
}
