mod args;
mod survey;

use clap::Parser;
use log::{debug, LevelFilter};

fn main() {
    let args = args::Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
    debug!("args: {:?}", args);

    if let Err(e) = survey::run_dashboard(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
