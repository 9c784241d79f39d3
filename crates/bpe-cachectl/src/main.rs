use anyhow::Context;
use bpe_cache::CacheConfig;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod simulate;

use simulate::SimulationOptions;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help("TOML cache configuration");

    Command::new("bpe-cachectl")
        .version(bpe_cache::VERSION)
        .about("Operate and exercise the BPE deployment cache")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Resolve definitions from a cold cache on many threads, then remove a deployment")
                .arg(
                    Arg::new("definitions")
                        .long("definitions")
                        .default_value("1000")
                        .value_parser(value_parser!(usize))
                        .help("Number of definitions to seed"),
                )
                .arg(
                    Arg::new("per-deployment")
                        .long("per-deployment")
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("Definitions bundled in each deployment"),
                )
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Worker threads resolving concurrently"),
                )
                .arg(config_arg.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output report as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(config_arg),
        )
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<CacheConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(CacheConfig::default()),
    }
}

/// Run the selected subcommand; `Ok(false)` means the run completed but
/// failed its checks
fn dispatch(matches: &ArgMatches) -> anyhow::Result<bool> {
    match matches.subcommand() {
        Some(("simulate", args)) => {
            let options = SimulationOptions {
                definitions: args.get_one::<usize>("definitions").copied().unwrap_or(1000),
                per_deployment: args.get_one::<usize>("per-deployment").copied().unwrap_or(10),
                threads: args.get_one::<usize>("threads").copied().unwrap_or(8),
            };
            let config = load_config(args)?;
            let report = simulate::run(config, &options)?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            Ok(report.passed())
        }
        Some(("config", args)) => {
            let config = load_config(args)?;
            print!("{}", config.to_toml_string()?);
            Ok(true)
        }
        _ => unreachable!("subcommand is required"),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    Ok(if dispatch(&matches)? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
