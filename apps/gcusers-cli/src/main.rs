//! gcusers CLI entry point

use clap::Parser;
use gcusers_cli::cli::Cli;
use gcusers_cli::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match commands::run(cli).await {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}
