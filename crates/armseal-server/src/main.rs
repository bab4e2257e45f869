use anyhow::Context;
use armseal_core::config::ENV_SIGNING_KEY;
use armseal_core::{Experiment, ExperimentConfig, ScenarioCatalog};
use armseal_server::{serve, simulate_assignments, AppState};
use armseal_token::{SigningKey, TurnGate, MIN_KEY_BYTES};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rand::RngCore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("armseal")
        .version(armseal_server::VERSION)
        .about("Signed-session server for two-arm chat experiments")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log")
                .long("log")
                .global(true)
                .default_value("info")
                .help("Log filter (overridden by RUST_LOG)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the experiment endpoint")
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .default_value("127.0.0.1:3000")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Address to bind"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Report assignment balance over many starts")
                .arg(
                    Arg::new("starts")
                        .long("starts")
                        .default_value("10000")
                        .value_parser(value_parser!(u64))
                        .help("Number of start calls to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML scenario catalog (defaults to the built-in one)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("inspect-token")
                .about("Verify a token against the configured signing key")
                .arg(Arg::new("token").required(true).help("Token to inspect")),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .or_else(|| matches.get_one::<String>("log").cloned())
        .unwrap_or_else(|| "info".to_string());
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter));
    if matches.get_flag("json-logs") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(&matches);

    match matches.subcommand() {
        Some(("serve", args)) => run_serve(args).await,
        Some(("simulate", args)) => run_simulate(args),
        Some(("inspect-token", args)) => run_inspect(args),
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

async fn run_serve(args: &ArgMatches) -> anyhow::Result<()> {
    let addr = *args
        .get_one::<SocketAddr>("listen")
        .context("missing --listen")?;

    let config = ExperimentConfig::from_env().context("invalid configuration")?;
    let experiment = Experiment::from_config(&config).context("failed to build experiment")?;

    tracing::info!(
        model = %config.model.model,
        scenarios = experiment.catalog().len(),
        opening_mode = %config.opening_mode,
        language = %config.response_language,
        "configuration loaded"
    );
    if experiment.discloses_condition() {
        tracing::warn!("condition disclosure ON: start responses include the assigned condition");
    } else {
        tracing::info!("condition disclosure off: participants are blinded");
    }

    serve(addr, AppState::new(Arc::new(experiment)), config.max_body_bytes)
        .await
        .context("server failed")
}

fn run_simulate(args: &ArgMatches) -> anyhow::Result<()> {
    let starts = *args.get_one::<u64>("starts").context("missing --starts")?;
    let seed = *args.get_one::<u64>("seed").context("missing --seed")?;
    let catalog = match args.get_one::<PathBuf>("catalog") {
        Some(path) => ScenarioCatalog::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ScenarioCatalog::builtin(),
    };

    // Ephemeral key: simulated tokens are discarded.
    let mut secret = [0u8; MIN_KEY_BYTES];
    rand::rng().fill_bytes(&mut secret);
    let key = SigningKey::from_secret(secret)?;

    let report = simulate_assignments(key, Arc::new(catalog), starts, seed)?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn run_inspect(args: &ArgMatches) -> anyhow::Result<()> {
    let token = args.get_one::<String>("token").context("missing token")?;
    let secret = std::env::var(ENV_SIGNING_KEY)
        .with_context(|| format!("{ENV_SIGNING_KEY} is not set"))?;
    let gate = TurnGate::new(SigningKey::from_secret(secret.as_bytes())?);

    match gate.inspect(token) {
        Ok(authorized) => {
            println!("{}", serde_json::to_string_pretty(&authorized.into_record())?);
            Ok(())
        }
        Err(reason) => anyhow::bail!("token rejected: {}", reason.as_str()),
    }
}
