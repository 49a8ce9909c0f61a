use anyhow::Result;
use clap::Parser;
use text_autoencoder::cli::Cli;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("text_autoencoder=info".parse()?),
        )
        .init();

    Cli::parse().run()
}
