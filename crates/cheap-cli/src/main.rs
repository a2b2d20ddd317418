//! CHEAP Command-Line Tool
//!
//! Hashes catalog definitions and manages catalogs in a local store.

mod executor;
mod formatter;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CHEAP Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "cheap")]
#[command(version, about = "CHEAP catalog tool")]
pub struct Args {
    /// Path to the data directory
    #[arg(short = 'd', long, default_value = "./cheap_data")]
    pub data: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the canonical hash of a catalog definition file (JSON)
    Hash {
        /// Definition file
        file: PathBuf,
    },

    /// Create a catalog and print its id
    CreateCatalog {
        /// Definition file (JSON) to pre-populate the catalog from
        #[arg(long)]
        def: Option<PathBuf>,

        /// Species: source, sink, mirror, cache, clone or fork
        #[arg(long, default_value = "source")]
        species: String,

        /// Reject aspect defs and hierarchies outside the definition
        #[arg(long)]
        strict: bool,

        /// Where the catalog lives
        #[arg(long)]
        uri: Option<String>,

        /// Id of the catalog this one derives from
        #[arg(long)]
        upstream: Option<String>,
    },

    /// List stored catalogs
    Catalogs,

    /// Show one catalog
    Show {
        /// Catalog id
        id: String,
    },

    /// Delete a catalog and everything it holds
    DeleteCatalog {
        /// Catalog id
        id: String,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cheap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match executor::execute(&args.command, &args.data, &*formatter) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
