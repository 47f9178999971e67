//! Command-line entry point for the tally core.
//!
//! # Responsibility
//! - Wire environment config, logging and storage the way a host would.
//! - Print current results and winners for the configured ledger as JSON.
//! - With an election id argument, add that election's Schulze results.

use log::error;
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;
use tally_core::db::open_db_with_options;
use tally_core::{init_logging_from_config, EngineConfig, ResultsRanker, SqliteLedgerStore};

fn main() -> ExitCode {
    println!("tally_core ping={}", tally_core::ping());
    println!("tally_core version={}", tally_core::core_version());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("tally_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::from_env()?;
    init_logging_from_config(&config)?;

    let conn = open_db_with_options(&config.db_path, &config.db_options())?;
    let store = SqliteLedgerStore::new(&conn).with_commit_attempts(config.commit_attempts);
    let ranker = ResultsRanker::new(store);

    let results = ranker.all_results_descending()?;
    let winners = ranker.winners()?;
    let schulze = match std::env::args().nth(1) {
        Some(election_id) => Some(ranker.schulze_results(&election_id)?),
        None => None,
    };

    let report = json!({
        "db_path": config.db_path.display().to_string(),
        "results": results,
        "winners": winners,
        "schulze": schulze,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
