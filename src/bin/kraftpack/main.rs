//! kraftpack CLI - resolve, fetch, build and package unikernels

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kraftpack::core::KraftError;
use kraftpack::util::diagnostic::KraftfileParseError;
use kraftpack::util::Shell;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over the flags
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("kraftpack=debug")
        } else if cli.quiet {
            EnvFilter::new("kraftpack=error")
        } else {
            EnvFilter::new("kraftpack=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let shell = Shell::from_flags(cli.quiet, cli.verbose, cli.color);

    if let Err(e) = run(cli.command, &shell) {
        report(&e, shell.use_color());
        std::process::exit(1);
    }
}

fn run(command: Commands, shell: &Shell) -> Result<()> {
    match command {
        Commands::Build(args) => commands::build::execute(args, shell),
        Commands::Pkg(args) => commands::pkg::execute(args, shell),
        Commands::Pull(args) => commands::pull::execute(args, shell),
        Commands::Rootfs(args) => commands::rootfs::execute(args, shell),
        Commands::Source(args) => commands::source::execute(args, shell),
        Commands::Update(args) => commands::update::execute(args, shell),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print the error chain along with the context and hints a typed error carries.
fn report(e: &anyhow::Error, color: bool) {
    if let Some(parse) = e.downcast_ref::<KraftfileParseError>() {
        eprintln!("error: {:#}", e);
        eprintln!("{}", parse.render());
        return;
    }

    match e.downcast_ref::<KraftError>() {
        Some(err) => {
            let mut diag = err.to_diagnostic();
            diag.message = format!("{:#}", e);
            eprint!("{}", diag.format(color));
        }
        None => eprintln!("error: {:#}", e),
    }
}
