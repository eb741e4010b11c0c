use clap::Parser;
use log::{LevelFilter, error, info};
use marker_arena::arena::ArenaService;
use marker_arena::logging::init_logger;
use marker_arena::scheduler::ActorKind;
use marker_arena::sim::{self, SimHandle};
use marker_arena::world::World;
use marker_arena::{config, rpc};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

// Command line arguments structure
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding `Token Position Config.json` and `Robot {k}.json`.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Simulated seconds until the competition ends.
    #[arg(long, default_value_t = config::DEFAULT_END_TIME)]
    end_time: f64,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional comma-separated list of targets for debug/trace logging.
    #[arg(long)]
    debug_filter: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Parse log level string
    let log_level_filter = match args.log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => {
            eprintln!(
                "Warning: Invalid log level '{}'. Defaulting to 'info'.",
                args.log_level
            );
            LevelFilter::Info
        }
    };

    if let Err(e) = init_logger(log_level_filter, args.debug_filter) {
        eprintln!("Failed to set up logging: {}", e);
        process::exit(1);
    }

    info!("Marker arena simulator starting...");

    let token_specs = match config::load_token_layout(&args.config_dir) {
        Ok(specs) => specs,
        Err(e) => {
            error!("Failed to read the token layout: {}", e);
            process::exit(1);
        }
    };
    info!("Placing {} tokens.", token_specs.len());

    let ctx = SimHandle::new(
        World::new(args.end_time, &token_specs),
        args.config_dir.clone(),
    );
    let arena_actor = ctx.scheduler.register(ActorKind::Arena);
    let arena_service = ArenaService::new(ctx.clone(), arena_actor.clone());

    let registry = rpc::EndpointRegistry::new();
    let endpoint = match rpc::spawn_arena_endpoint(arena_service, registry.clone()) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Failed to open the arena endpoint: {}", e);
            process::exit(1);
        }
    };
    // The controller process scrapes this exact line off standard output.
    println!("Arena URL = {}", endpoint.url());
    io::stdout().flush().expect("Failed to flush stdout");

    sim::run(&ctx, &arena_actor);

    registry.shutdown_all();
    endpoint.shutdown();
    info!("Simulator finished.");
}
