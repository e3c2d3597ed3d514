use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uci_engine_pool::batch::{analyze_batch, read_positions, write_csv};
use uci_engine_pool::query::UNSET;
use uci_engine_pool::{AnalysisService, BatchSettings, EnginePool, PoolConfig, Query, QueryType};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Parser)]
#[command(author, version, about = "Analyze chess positions with a pool of UCI engines", long_about = None)]
struct Args {
    /// JSON pool configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine executable (overrides the assets directory lookup)
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Position to analyze
    #[arg(short, long, default_value = START_FEN)]
    fen: String,

    /// best-move, make-move, legal-moves, checkers, eval or analysis
    #[arg(short = 't', long = "type", default_value = "analysis")]
    query_type: String,

    /// Move to play for make-move queries (UCI notation)
    #[arg(short, long = "move")]
    mv: Option<String>,

    /// Search depth
    #[arg(short, long, default_value_t = UNSET, allow_negative_numbers = true)]
    depth: i32,

    /// Search time in milliseconds
    #[arg(long, default_value_t = UNSET, allow_negative_numbers = true)]
    movetime: i32,

    /// Engine skill level (0-20)
    #[arg(short, long, default_value_t = UNSET, allow_negative_numbers = true)]
    skill: i32,

    /// Cap on regular engine instances
    #[arg(long)]
    max_instances: Option<usize>,

    /// Batch mode: file with one FEN per line
    #[arg(short, long)]
    positions: Option<PathBuf>,

    /// CSV report for batch mode (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PoolConfig::from_json_file(path)?,
        None => PoolConfig::default(),
    };
    if let Some(engine) = &args.engine {
        config.engine_path = Some(engine.clone());
    }
    if let Some(max_instances) = args.max_instances {
        config.max_instances = max_instances;
        config.initial_instances = config.initial_instances.min(max_instances);
    }

    let pool = Arc::new(EnginePool::new(&config)?);
    let service = Arc::new(AnalysisService::new(Arc::clone(&pool)));

    let outcome = match &args.positions {
        Some(positions) => run_batch(Arc::clone(&service), positions, &args).await,
        None => run_single(&service, &args).await,
    };
    pool.shutdown();
    outcome
}

async fn run_single(service: &AnalysisService, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = args.query_type == "analysis";
    let query_type = if analysis {
        QueryType::BestMove
    } else {
        args.query_type.parse()?
    };

    let mut builder = Query::builder(query_type, args.fen.as_str())
        .depth(args.depth)
        .movetime(args.movetime)
        .difficulty(args.skill);
    if let Some(mv) = &args.mv {
        builder = builder.with_move(mv.as_str());
    }
    let query = builder.build()?;

    if analysis {
        let answer = service.best_move_eval_async(&query).await?;
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        let answer = service.respond_async(query).await?;
        println!("{}", answer);
    }
    Ok(())
}

async fn run_batch(
    service: Arc<AnalysisService>,
    positions: &Path,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let positions = read_positions(positions)?;
    let settings = BatchSettings {
        depth: args.depth,
        movetime: args.movetime,
        skill: args.skill,
        workers: service.pool().max_instances(),
        show_progress: true,
        ..BatchSettings::default()
    };

    let entries = tokio::task::spawn_blocking(move || {
        analyze_batch(&service, &positions, &settings)
    })
    .await??;

    match &args.output {
        Some(path) => write_csv(&entries, File::create(path)?)?,
        None => write_csv(&entries, std::io::stdout().lock())?,
    }
    Ok(())
}
