use avg_scalper::cli::{Cli, Commands};
use avg_scalper::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Validate = cli.command {
        let config = Config::load(&cli.config)?;
        println!(
            "{}: ok ({} strategies, {} enabled)",
            cli.config.display(),
            config.strategies.len(),
            config.enabled_strategies().count()
        );
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config from {}: {}", cli.config.display(), e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize telemetry
    avg_scalper::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => args.execute(&config).await?,
        Commands::Status(args) => args.execute(&config).await?,
        Commands::Resume(args) => args.execute(&config).await?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
        Commands::Validate => {}
    }

    Ok(())
}
