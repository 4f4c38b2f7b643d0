use clap::Parser;
use env_logger::Env;
use ops_portal_lib::config::ServerConfig;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    if let Err(e) = ops_portal_lib::run(config).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
