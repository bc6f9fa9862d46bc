//! 查询集执行器
//!
//! Usage:
//!   bitmap-query --dir Experiments/bitmap_raw_attr10_card100 queries.txt
//!   bitmap-query --config engine.toml --threads 8 queries.txt
//!
//! 每条查询输出一行：`query bits= ones= words= digest= elapsed`，最后输出汇总。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use bitmap_query_engine::workload::QuerySet;
use bitmap_query_engine::{BitmapEncoding, EngineConfig, Query, QueryEngine, Result};

#[derive(Parser, Debug)]
#[command(name = "bitmap-query")]
#[command(about = "Execute point/range queries against WAH-compressed bitmap columns")]
#[command(version)]
struct Args {
    /// Query set file, one `[p,&,a,b]` / `[r,|,s,e]` query per line
    queries: PathBuf,

    /// TOML engine config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory containing the compressed column files
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Column encoding (wah32 | wah64)
    #[arg(short, long)]
    encoding: Option<BitmapEncoding>,

    /// Worker threads; 1 runs sequentially, 0 uses all cores
    #[arg(short, long)]
    threads: Option<usize>,
}

fn run(args: Args) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None       => EngineConfig::default(),
    };
    if let Some(dir) = args.dir {
        config.data_dir = dir;
    }
    if let Some(encoding) = args.encoding {
        config.encoding = encoding;
    }
    if let Some(threads) = args.threads {
        config.worker_threads = threads;
    }

    let queries: Vec<Query> = QuerySet::open(&args.queries)?.collect::<Result<_>>()?;
    let engine = QueryEngine::from_config(&config);

    let (results, summary) = if config.worker_threads == 1 {
        engine.run_workload(queries)
    } else {
        engine.run_workload_parallel(&queries)?
    };

    for r in &results {
        match r {
            Ok(outcome) => println!("{outcome}"),
            Err(e)      => println!("error: {e}"),
        }
    }
    println!("{summary}");
    Ok(summary.failed == 0)
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(true)  => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e)    => {
            error!("{e}");
            eprintln!("bitmap-query: {e}");
            ExitCode::FAILURE
        }
    }
}
