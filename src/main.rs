// src/main.rs

use stagedag::engine::RunOutcome;
use stagedag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(RunOutcome::Succeeded) => {}
        Ok(outcome) => {
            eprintln!("stagedag: run {outcome}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("stagedag error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<RunOutcome> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
