//! upset CLI: push plugins to a target and run a plan.

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "upset",
    version,
    about = "Agentless configuration management over ssh and sudo"
)]
struct Cli {
    /// More output (-v warn, -vv info, -vvv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: upset::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    upset::cli::init_tracing(cli.verbose);
    if let Err(e) = upset::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
