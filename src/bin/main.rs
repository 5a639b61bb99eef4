use caseflow::ScenarioKind;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "caseflow")]
#[command(about = "End-to-end case journeys for Dynamics 365 Customer Service")]
#[command(version)]
struct Cli {
    /// Config file to run
    #[arg(default_value = "configs/dynamics.yaml")]
    config: PathBuf,

    /// Run in headless mode (overrides config)
    #[arg(long)]
    headless: bool,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Run only these scenarios (can be used multiple times)
    #[arg(short = 's', long = "scenario", value_name = "NAME")]
    scenarios: Vec<String>,

    /// Seed for record and option picks
    #[arg(long)]
    seed: Option<u64>,

    /// Load environment variables from this file instead of .env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> caseflow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    // Env files feed ${VAR} substitution, so they load before the config.
    match cli.env_file {
        Some(ref path) => {
            dotenvy::from_path(path).map_err(|e| {
                caseflow::Error::Config(format!("env file {}: {}", path.display(), e))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let params = caseflow::Params::from_args(&cli.params)?;
    let mut config = caseflow::Config::load_with_params(&cli.config, &params)?;

    if !cli.scenarios.is_empty() {
        config.scenarios = cli
            .scenarios
            .iter()
            .map(|s| s.parse::<ScenarioKind>())
            .collect::<caseflow::Result<_>>()?;
    }
    if cli.headless {
        config.browser.headless = true;
    }
    if cli.seed.is_some() {
        config.data.seed = cli.seed;
    }

    if cli.check {
        println!("Config valid: {}", config.name);
        println!("  Tenant: {}", config.environment.base());
        let names: Vec<&str> = config.scenarios.iter().map(|s| s.name()).collect();
        println!("  Scenarios: {}", names.join(", "));
        println!("  Fixtures: {}", config.fixtures.path.display());
        println!("  Session state: {}", config.session.storage_state.display());
        if !config.params.is_empty() {
            println!("  Parameters: {}", config.params.len());
            for (name, def) in &config.params {
                let req = if def.required { " (required)" } else { "" };
                let desc = def.description.as_deref().unwrap_or("");
                println!("    - {}{}: {}", name, req, desc);
            }
        }
        if let Some(ref on_failure) = config.on_failure {
            if let Some(ref retry) = on_failure.retry {
                println!("  Retry attempts: {}", retry.attempts);
            }
        }
        return Ok(());
    }

    println!("Running: {}", config.name);

    let runner = caseflow::Runner::launch(&config).await?;
    let results = runner.run_all().await;
    runner.close().await?;

    println!();
    let mut failed = 0;
    for result in &results {
        if result.success() {
            println!("✓ {}", result.scenario());
        } else {
            failed += 1;
            println!("✗ {}", result.scenario());
            println!("  Error: {}", result.failure_summary());
        }
        if let Some(title) = result.entity() {
            println!("  Case: {}", title);
        }
        if let Some(number) = result.case_number() {
            println!("  Number: {}", number);
        }
        for check in result.checks() {
            let mark = if check.passed { "✓" } else { "✗" };
            println!("    {} {}: {}", mark, check.name, check.detail);
        }
        println!("  Duration: {}ms", result.duration().as_millis());
        if result.attempts() > 1 {
            println!("  Retries: {}", result.attempts() - 1);
        }
    }
    println!();
    println!("{}/{} scenarios passed", results.len() - failed, results.len());

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
