//! CLI entry point - the composition root.

use std::process::ExitCode;

use clap::Parser;

use netq_cli::{Cli, CliError, Commands, handlers, logging};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Fetch(args) => handlers::fetch::run(args).await.map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}
