// src/main.rs

use clap::Parser;
use quarry::checksum::{self, ChecksumAlgorithm};
use quarry::{
    ArtifactCoordinate, Configuration, HttpTransport, ProxyResolver, TomlProvider, VerifyOutcome,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

mod cli;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quarry=info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> quarry::Result<ExitCode> {
    match cli.command {
        Commands::Resolve {
            coordinate,
            config,
            repo,
        } => resolve(&coordinate, &config, &repo),
        Commands::Verify { file, algorithm } => verify(&file, algorithm.as_deref()),
        Commands::Connectors { path, config, repo } => connectors(&path, &config, &repo),
    }
}

fn resolve(coordinate: &str, config_path: &str, repo: &str) -> quarry::Result<ExitCode> {
    let coordinate = ArtifactCoordinate::parse(coordinate)?;
    let provider = Arc::new(TomlProvider::new(config_path));
    let transport = Arc::new(HttpTransport::new());
    let resolver = ProxyResolver::new(provider, transport);

    let local = resolver.resolve(repo, &coordinate)?;
    info!("resolved {} to {}", coordinate, local.display());
    println!("{}", local.display());
    Ok(ExitCode::SUCCESS)
}

fn verify(file: &str, algorithm: Option<&str>) -> quarry::Result<ExitCode> {
    let path = Path::new(file);
    let algorithms: Vec<ChecksumAlgorithm> = match algorithm {
        Some(name) => vec![name.parse()?],
        None => ChecksumAlgorithm::all().to_vec(),
    };

    let mut valid = 0;
    for algo in algorithms {
        match checksum::verify(path, algo)? {
            VerifyOutcome::Valid => {
                println!("{}: {} OK", file, algo);
                valid += 1;
            }
            VerifyOutcome::MissingSidecar => continue,
            outcome => {
                println!("{}: {} FAILED: {}", file, algo, outcome.describe());
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    if valid == 0 {
        println!("{}: no checksum side-car found", file);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn connectors(path: &str, config_path: &str, repo: &str) -> quarry::Result<ExitCode> {
    let config = Configuration::load(Path::new(config_path))?;
    let eligible = config.connectors_for(repo, path);

    if eligible.is_empty() {
        println!("no eligible connectors for '{}' in '{}'", path, repo);
        return Ok(ExitCode::SUCCESS);
    }

    for connector in eligible {
        let proxy = connector
            .proxy_id
            .as_deref()
            .map(|p| format!(" via proxy '{}'", p))
            .unwrap_or_default();
        println!(
            "{:>3}  {}{}  policies: {:?}",
            connector.order,
            connector.id(),
            proxy,
            connector.policies
        );
    }
    Ok(ExitCode::SUCCESS)
}
