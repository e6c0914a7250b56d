// src/cli.rs

//! CLI definitions for the quarry repository proxy
//!
//! This module contains the command-line interface definitions using
//! clap. The command implementations live in `main.rs`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(author = "Quarry Project")]
#[command(version)]
#[command(
    about = "Artifact repository proxy engine with policy pipeline and transactional storage",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve an artifact into a managed repository, fetching it through
    /// the configured proxy connectors when missing
    Resolve {
        /// Artifact coordinate: group:artifact:version[:type[:classifier]]
        coordinate: String,

        /// Path to the configuration file
        #[arg(short, long, default_value = "/etc/quarry/quarry.toml")]
        config: String,

        /// Managed repository to resolve into
        #[arg(short, long)]
        repo: String,
    },

    /// Verify a local file against its checksum side-car
    Verify {
        /// Path to the file to verify
        file: String,

        /// Algorithm to verify with (default: try sha1, then md5)
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// Print the effective ordered connector list for a repository path
    Connectors {
        /// Repository path the connectors would serve
        path: String,

        /// Path to the configuration file
        #[arg(short, long, default_value = "/etc/quarry/quarry.toml")]
        config: String,

        /// Managed repository the connectors belong to
        #[arg(short, long)]
        repo: String,
    },
}
