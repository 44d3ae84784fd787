use anyhow::Result;
use clap::Parser;
use colored::*;
use gallium_test::cli::{Cli, Command};
use gallium_test::config::{self, ConfigFile, OutputFormat, CONFIG_FILE_NAME};
use gallium_test::runner::TestRunner;
use log::debug;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_root = match &cli.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let file = load_config(cli.config.as_deref(), &project_root)?;

    let command = cli.command.clone().unwrap_or(Command::Run {
        filters: Vec::new(),
    });
    let needs_compiler = matches!(command, Command::Run { .. });
    let config = config::resolve(project_root, file, cli.overrides(), |name| {
        match which::which(name) {
            Ok(path) => Some(path),
            // listing and checking never invoke the compiler
            Err(_) if !needs_compiler => Some(PathBuf::from(name)),
            Err(e) => {
                debug!("{name} not on PATH: {e}");
                None
            }
        }
    })?;
    debug!("{config:?}");

    let runner = TestRunner::new(config);
    match command {
        Command::Run { .. } => run_tests(&runner),
        Command::List { names_only } => list_tests(&runner, names_only),
        Command::Check => check_tests(&runner),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn load_config(explicit: Option<&Path>, project_root: &Path) -> Result<ConfigFile> {
    match explicit {
        Some(path) => config::load_config_file(path),
        None => {
            let path = project_root.join(CONFIG_FILE_NAME);
            if path.exists() {
                config::load_config_file(&path)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

fn run_tests(runner: &TestRunner) -> Result<i32> {
    let config = runner.config();
    let report = runner.run()?;

    match config.format {
        OutputFormat::Human => report.print(config.verbose),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(report.exit_code())
}

fn list_tests(runner: &TestRunner, names_only: bool) -> Result<i32> {
    let loaded = runner.load_all()?;

    if !names_only {
        println!("Available tests:");
        println!("{}", "-".repeat(60));
    }

    for (file, spec) in &loaded {
        if names_only {
            println!("{}", file.relative.display());
            continue;
        }
        match spec {
            Ok(spec) => println!("{} ({})", file.relative.display(), spec.kind()),
            Err(e) => println!(
                "{} ({})",
                file.relative.display(),
                format!("load error: {}", e.kind).red()
            ),
        }
    }

    if !names_only {
        println!("\n{} tests", loaded.len());
    }
    Ok(0)
}

fn check_tests(runner: &TestRunner) -> Result<i32> {
    let loaded = runner.load_all()?;
    let errors: Vec<_> = loaded.iter().filter_map(|(_, spec)| spec.as_ref().err()).collect();

    for error in &errors {
        println!("{} {}", "✗".red(), error);
    }

    if errors.is_empty() {
        println!(
            "{}",
            format!("✓ All {} test directives are valid", loaded.len()).green()
        );
        Ok(0)
    } else {
        println!(
            "\n{}",
            format!("{} of {} test directives are invalid", errors.len(), loaded.len())
                .red()
                .bold()
        );
        Ok(1)
    }
}
