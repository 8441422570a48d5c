use clap::Parser;
use gotvc::cli::{self, Cli};
use gotvc::config::Config;
use gotvc::error::{AppError, GotError};
use gotvc::logging;
use std::env;
use std::io::{self, Write};

fn main() {
    let cli = Cli::parse();

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.logging.level);

    if let Some(dir) = &cli.directory {
        if let Err(e) = env::set_current_dir(dir) {
            eprintln!("Error: cannot change to {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    }

    if let Err(e) = cli::run(cli, config) {
        report(&e);
        std::process::exit(1);
    }
}

/// The tool's own diagnostic goes out byte for byte
fn report(err: &AppError) {
    if let AppError::Got(GotError::CommandFailed { operation, diagnostic }) = err {
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "Error: {}: ", operation);
        let _ = stderr.write_all(diagnostic.as_bytes());
        if !diagnostic.as_bytes().ends_with(b"\n") {
            let _ = writeln!(stderr);
        }
        return;
    }
    eprintln!("Error: {}", err);
}
