mod files;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, metadata::LevelFilter};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Pads gzip and brotli streams with random junk without changing what they decompress to.
#[derive(Parser)]
#[clap(version)]
struct Args {
    /// Padding lengths are drawn from 0 up to, but not including, this value.
    #[clap(
        short,
        long,
        default_value_t = 16,
        value_parser = clap::value_parser!(u32).range(1..=65536)
    )]
    max_padding: u32,

    /// Keep the padded copy next to the original (as `<file>.htb`) instead of replacing the
    /// original with it.
    #[clap(short, long)]
    keep: bool,

    /// Files to pad. Standard input is padded to standard output when none are given.
    files: Vec<PathBuf>,
}

fn fallible_main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.files.is_empty() {
        files::patch_stdio(args.max_padding)?;
    } else {
        for path in &args.files {
            files::patch_file(path, args.max_padding, args.keep)
                .with_context(|| format!("could not process {}", path.display()))?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        );
    tracing::subscriber::set_global_default(subscriber)
        .expect("cannot set default tracing subscriber");

    info!("htb version {}", env!("CARGO_PKG_VERSION"));

    match fallible_main() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
