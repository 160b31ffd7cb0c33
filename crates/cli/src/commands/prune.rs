use chrono::Utc;
use mooai_db::{connect, ContinuationRepository, SqlContinuationRepository};

use crate::commands::{load_config, runtime, CommandResult, EXIT_DATABASE};

/// The context store only expires records lazily on read; this reclaims the rows.
pub fn run() -> CommandResult {
    let config = match load_config("prune") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("prune") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string()))?;
        let repository = SqlContinuationRepository::new(pool.clone());
        let removed = repository
            .delete_expired(Utc::now())
            .await
            .map_err(|error| ("prune", error.to_string()))?;
        pool.close().await;
        Ok::<u64, (&'static str, String)>(removed)
    });

    match result {
        Ok(removed) => CommandResult::success(
            "prune",
            format!("pruned {removed} expired continuation records"),
        ),
        Err((error_class, message)) => {
            CommandResult::failure("prune", error_class, message, EXIT_DATABASE)
        }
    }
}
