use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tailsearch_protocol::{AgentId, SearchRequest};
use tailsearch_server::{loopback_cluster, SearchAgent, SearchOrchestrator, ServerConfig};

#[derive(Parser)]
#[command(name = "tailsearch")]
#[command(about = "Reverse-chronological keyword search over timestamped log files", long_about = None)]
#[command(version)]
struct Cli {
    /// Log file name, resolved inside each read directory
    filename: String,

    /// Keep only lines containing this substring
    #[arg(short, long)]
    keyword: Option<String>,

    /// Return at most the N most recent lines
    #[arg(short, long)]
    last: Option<u64>,

    /// Directory holding log files; repeat the flag to search several
    /// shard directories as a distributed cluster (one agent per dir)
    #[arg(short = 'd', long = "read-dir")]
    read_dirs: Vec<PathBuf>,

    /// Directory for partial and merged temp files
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Character separating the epoch key from the line body
    #[arg(long)]
    delimiter: Option<char>,

    /// Seconds to wait for agent responses before forcing completion
    #[arg(long)]
    deadline: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = ServerConfig::from_env();
    if let Some(temp_dir) = &cli.temp_dir {
        config.temp_dir = temp_dir.clone();
    }
    if let Some(delimiter) = cli.delimiter {
        config.delimiter = delimiter;
    }
    if let Some(seconds) = cli.deadline {
        config.deadline = Duration::from_secs(seconds);
    }

    let mut request = SearchRequest::new(cli.filename.clone());
    if let Some(keyword) = &cli.keyword {
        request = request.with_keyword(keyword.as_str());
    }
    if let Some(last) = cli.last {
        request = request.with_last(last);
    }

    let mut stdout = tokio::io::stdout();

    if cli.read_dirs.len() > 1 {
        let agents = cli
            .read_dirs
            .iter()
            .enumerate()
            .map(|(i, dir)| SearchAgent::new(AgentId::new(format!("shard-{i}")), dir));
        let orchestrator = loopback_cluster(config, agents);
        orchestrator
            .search(&request, &mut stdout)
            .await
            .with_context(|| format!("distributed search of {} failed", cli.filename))?;
    } else {
        if let Some(dir) = cli.read_dirs.first() {
            config.read_dir = dir.clone();
        }
        let orchestrator = SearchOrchestrator::new(config);
        orchestrator
            .search_local(&request, &mut stdout)
            .await
            .with_context(|| format!("search of {} failed", cli.filename))?;
    }

    Ok(())
}
