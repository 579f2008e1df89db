#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use venue_funnel::funnel::{JsonlTraceSink, TraceWorker};
use venue_funnel::oracle::{OpenRouterOracle, RetryingOracle, TracingUsageSink};
use venue_funnel::{
    Agent, DataTool, FunnelConfig, MemoryStore, RecommendationTask, ReviewTask, SqliteStore, Task,
    TaskOutput,
};

#[derive(Parser)]
#[command(name = "funnel", version, about = "Venue recommendation funnel CLI")]
struct Cli {
    /// Log rendered prompts and raw oracle replies (debug level)
    #[arg(long, global = true)]
    log_prompts: bool,
    /// Override FUNNEL_MODEL
    #[arg(long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Directory with user.json, item.json and review.json (JSONL)
    #[arg(long, conflicts_with = "db")]
    data_dir: Option<PathBuf>,
    /// SQLite database created by `funnel import`
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend venues for a user
    Recommend {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        user: String,
        /// Candidate item ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        candidates: Vec<String>,
        #[arg(long, default_value = "")]
        category: String,
        /// Write one JSON line per stage to this file
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Write a review of a venue in a user's voice
    Review {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        user: String,
        #[arg(long)]
        item: String,
    },
    /// Run a task object read from a JSON file
    Run {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        task: PathBuf,
        #[arg(long)]
        trace: Option<PathBuf>,
    },
    /// Import a JSONL dataset directory into SQLite
    Import {
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn open_store(data: &DataArgs) -> Result<Arc<dyn DataTool>, Box<dyn std::error::Error>> {
    if let Some(dir) = &data.data_dir {
        return Ok(Arc::new(MemoryStore::load_dir(dir)?));
    }
    let path = data.db.clone().unwrap_or_else(SqliteStore::default_path);
    if !path.exists() {
        return Err(format!(
            "database {} not found; run `funnel import` or pass --data-dir",
            path.display()
        )
        .into());
    }
    Ok(Arc::new(SqliteStore::open(path)?))
}

fn build_agent(
    cli: &Cli,
    data: &DataArgs,
    trace: Option<&PathBuf>,
) -> Result<(Agent, Option<TraceWorker>), Box<dyn std::error::Error>> {
    let mut config = FunnelConfig::from_env()?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if cli.log_prompts {
        config.log_prompts = true;
    }

    let oracle = RetryingOracle::new(OpenRouterOracle::from_env()?, Arc::new(TracingUsageSink));
    let mut agent = Agent::new(Arc::new(oracle), open_store(data)?, config);
    let mut worker = None;
    if let Some(path) = trace {
        let (sink, handle) = JsonlTraceSink::new(path)?;
        agent = agent.with_trace(Arc::new(sink));
        worker = Some(handle);
    }
    Ok((agent, worker))
}

async fn run_task(
    cli: &Cli,
    data: &DataArgs,
    trace: Option<&PathBuf>,
    task: Task,
) -> Result<TaskOutput, Box<dyn std::error::Error>> {
    let (agent, worker) = build_agent(cli, data, trace)?;
    let output = agent.forward(&task).await;
    // The trace channel closes once the agent is gone.
    drop(agent);
    if let Some(worker) = worker {
        worker.join()?;
    }
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("venue_funnel=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let output = match &cli.command {
        Commands::Import { data_dir, db } => {
            let source = MemoryStore::load_dir(data_dir)?;
            let path = db.clone().unwrap_or_else(SqliteStore::default_path);
            let stats = SqliteStore::open(&path)?.import(&source)?;
            println!("{}", serde_json::to_string(&stats)?);
            return Ok(());
        }
        Commands::Recommend {
            data,
            user,
            candidates,
            category,
            trace,
        } => {
            let task = Task::Recommendation(RecommendationTask {
                user_id: user.clone(),
                candidate_list: candidates.clone(),
                candidate_category: category.clone(),
            });
            run_task(&cli, data, trace.as_ref(), task).await?
        }
        Commands::Review { data, user, item } => {
            let task = Task::ReviewWriting(ReviewTask {
                user_id: user.clone(),
                item_id: item.clone(),
            });
            run_task(&cli, data, None, task).await?
        }
        Commands::Run { data, task, trace } => {
            let raw = std::fs::read_to_string(task)?;
            let task = Task::from_value(serde_json::from_str(&raw)?)?;
            run_task(&cli, data, trace.as_ref(), task).await?
        }
    };

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
