mod cache;
mod cli;
mod error;
mod logging;
mod model;
mod monitor;
mod orchestrator;
mod remote;
mod session;
#[cfg(test)]
mod testing;
mod text_summary;

use anyhow::Result;
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    logging::init(args.verbose, is_silent);

    match cli::run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
