//! Run one process call against the configured database and print the JSON reply.
//!
//! Usage: `table-engine <process> [json-arg ...]`, e.g.
//! `table-engine table.Search service '{"wheres":[{"column":"status","value":"enabled"}]}' 1 20`.
//! Arguments that are not valid JSON are passed as strings.

use serde_json::Value;
use table_engine::{dispatch, reply, DirectorySource, EngineConfig, EngineState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("table_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut argv = std::env::args().skip(1);
    let Some(process) = argv.next() else {
        eprintln!("usage: table-engine <process> [json-arg ...]");
        std::process::exit(2);
    };
    let args: Vec<Value> = argv
        .map(|a| serde_json::from_str(&a).unwrap_or(Value::String(a)))
        .collect();

    let config = EngineConfig::from_env();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!(settings_dir = %config.settings_dir.display(), "connected");

    let state = EngineState::new(pool, DirectorySource::new(&config.settings_dir), &config);
    let result = dispatch(&state, &process, args).await;
    let failed = result.is_err();
    println!("{}", serde_json::to_string_pretty(&reply(result))?);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
