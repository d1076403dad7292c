use clap::{Arg, ArgAction, Command};
use rapidchain_node::{driver::Simulation, metrics::Metrics, Config};
use std::str::FromStr;
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    // Parse arguments
    let matches = Command::new("rapidchain")
        .about("simulate participants agreeing on concurrently proposed blocks")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .default_value("info"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("emit logs as JSON"),
        )
        .get_matches();

    // Create logger
    let level = matches.get_one::<String>("log-level").unwrap();
    let level = Level::from_str(level).expect("Invalid log level");
    if matches.get_flag("json") {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(level)
            .with_line_number(true)
            .with_file(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    // Load config
    let config_file = matches.get_one::<String>("config").unwrap();
    let config_file = std::fs::read_to_string(config_file).expect("Could not read config file");
    let config = Config::from_yaml(&config_file).expect("Could not parse config file");
    info!(
        rounds = config.rounds,
        seed = config.seed,
        nodes = config.node.node_count,
        leaders = config.node.leader_count,
        chunks = config.node.block_chunk_count,
        erasure = config.node.erasure.is_some(),
        "loaded config"
    );

    // Run simulation
    let metrics = Metrics::init();
    let result = match Simulation::new(config, metrics.clone()) {
        Ok(simulation) => simulation.run().await,
        Err(err) => Err(err),
    };
    info!(metrics = metrics.encode(), "simulation metrics");
    match result {
        Ok(chain) => {
            let blocks: usize = chain.iter().map(Vec::len).sum();
            info!(rounds = chain.len(), blocks, "simulation complete");
        }
        Err(err) => {
            error!(?err, "simulation failed");
            std::process::exit(1);
        }
    }
}
