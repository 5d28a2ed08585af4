use tracing_subscriber::EnvFilter;

use quasar::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        std::env::var("RUST_LOG")
            .ok()
            .map(EnvFilter::new)
            .unwrap_or_else(|| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    quasar::app::run(config).await
}
