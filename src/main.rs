use anyhow::Result;
use clap::Parser;

use gaddr::commands::{self, Cli, Commands};
use gaddr::logging::init_logger;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Call(args) => commands::call::run(&args),
        Commands::Mcluster(args) => commands::mcluster::run(&args),
    }
}
