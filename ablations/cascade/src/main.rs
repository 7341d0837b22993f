//! 两阶段级联实验运行器.
//!
//! 用法: `cascade [two-stage|forest|online] [config.json] [--phantom]`.

mod result;
mod runner;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use runner::Mode;
use simple_logger::SimpleLogger;
use std::path::PathBuf;

fn main() -> Result<()> {
    SimpleLogger::new().with_level(LevelFilter::Info).env().init()?;

    let matches = Command::new("cascade")
        .version(clap::crate_version!())
        .about("Two-stage tumor sub-region cascade with calibrated post-processing")
        .arg(
            Arg::new("mode")
                .help("Experiment to run")
                .value_parser(["two-stage", "forest", "online"])
                .default_value("two-stage"),
        )
        .arg(
            Arg::new("config")
                .help("JSON experiment configuration; defaults apply to missing fields")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("phantom")
                .long("phantom")
                .help("Use synthetic phantom patients instead of the npz dataset")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mode = match matches.get_one::<String>("mode").map(String::as_str) {
        Some("forest") => Mode::Forest,
        Some("online") => Mode::Online,
        _ => Mode::TwoStage,
    };
    let config = matches.get_one::<PathBuf>("config");
    let phantom = matches.get_flag("phantom");

    println!("Running {} experiment...", mode.name());
    let result = runner::run(mode, config.map(PathBuf::as_path), phantom)?;
    result.analyze()?;
    Ok(())
}
