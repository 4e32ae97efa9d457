use std::{env, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use csp_cluster::{init_logging, run_pipeline, Database, EngineConfig, RunOutput};

const USAGE: &str = "usage: csp-cluster <database> [config.json] [--prune]";

struct Args {
    database: PathBuf,
    config: Option<PathBuf>,
    prune: bool,
}

fn parse_args() -> Result<Args> {
    let mut database = None;
    let mut config = None;
    let mut prune = false;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--prune" => prune = true,
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with('-') => bail!("unknown flag {flag}\n{USAGE}"),
            _ if database.is_none() => database = Some(PathBuf::from(&arg)),
            _ if config.is_none() => config = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument {arg}\n{USAGE}"),
        }
    }

    let database = database.with_context(|| USAGE.to_string())?;
    Ok(Args {
        database,
        config,
        prune,
    })
}

async fn run(args: Args) -> Result<RunOutput> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let db = Arc::new(Database::new(args.database)?);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received; partitions not yet started will be skipped");
            ctrl_c.cancel();
        }
    });

    Ok(run_pipeline(db, config, cancel, args.prune).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let outcome = match parse_args() {
        Ok(args) => run(args).await,
        Err(err) => Err(err),
    };

    match outcome.and_then(|output| {
        serde_json::to_string_pretty(&output).context("failed to serialize run report")
    }) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
