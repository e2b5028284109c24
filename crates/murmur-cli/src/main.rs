use clap::Parser;
use murmur_cli::cli::{execute, open_storage, render, Cli, CliConfig};
use murmur_core::tracing_setup::init_tracing;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let storage = open_storage(&config, cli.keyring)?;
    let value = execute(cli.command, &config, storage, cli.password.as_deref()).await?;
    println!("{}", render(&value, cli.pretty)?);
    Ok(())
}
