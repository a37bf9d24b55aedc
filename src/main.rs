use clap::Parser;
use std::io::Write;

use cabload::config_file::ConfigFile;
use cabload::platform::ExitCode;
use cabload::{Cli, LoaderConfig, RunStats, StatsFormat};

fn main() {
    let cli = Cli::parse();

    init_logging(&cli);

    let file_config = if cli.ignore_config {
        ConfigFile::default()
    } else {
        match ConfigFile::load_with_custom_path(cli.config_file.as_deref()) {
            Ok(config) => config,
            Err(e) => fail(ExitCode::InvalidUsage, &e),
        }
    };

    let config = match LoaderConfig::from_cli(&cli, &file_config) {
        Ok(config) => config,
        Err(e) => fail(ExitCode::InvalidUsage, &e),
    };

    if cli.show_config {
        ConfigFile::show_config(cli.config_file.as_deref(), cli.ignore_config);
        println!("\nEffective configuration:");
        println!("{}", config.describe());
        ExitCode::Success.exit();
    }

    match cabload::run(&config) {
        Ok(stats) => {
            if let Some(format) = config.output.stats {
                print_stats(&stats, format);
            }
            ExitCode::Success.exit();
        }
        Err(e) => fail(ExitCode::GeneralError, &e),
    }
}

fn init_logging(cli: &Cli) {
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_target(false)
        .init();
}

fn print_stats(stats: &RunStats, format: StatsFormat) {
    let line = match format {
        StatsFormat::Table => stats.format_stats(),
        StatsFormat::Json => stats.to_json(),
    };
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "{}", line).unwrap_or(());
}

fn fail(code: ExitCode, error: &anyhow::Error) -> ! {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "cabload: Error: {:#}", error).unwrap_or(());
    code.exit()
}
