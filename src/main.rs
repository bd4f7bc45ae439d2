use clap::Parser;
use printmerge::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    printmerge::run(Cli::parse()).await
}
