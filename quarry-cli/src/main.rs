//! Quarry CLI
//!
//! Command-line interface for the Quarry persistence layer.
//!
//! # Usage
//!
//! ```bash
//! # Compile a query for a backend
//! quarry translate '{"attribute": "age", "operator": "gte", "argument": 18}'
//! quarry translate --backend sql '{"or": [...]}'
//!
//! # Draw keys
//! quarry keygen --count 3 --seed 42
//!
//! # Postgres CRUD (built with --features postgres)
//! quarry insert --table users '{"name": "Ann", "age": 30}'
//! quarry find --table users --sort -age '{"attribute": "age", "operator": "gte", "argument": 18}'
//! ```

use std::io::Read;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use quarry_core::constants::KEYGEN_LENGTH_MAX;
use quarry_core::dst::DeterministicRng;
use quarry_core::translate::SqlParam;
use quarry_core::{
    DocumentTranslator, Key, KeyGenerator, OdmConfig, Query, SqlTranslator, Translator,
};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Quarry persistence layer CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Postgres URL (overrides QUARRY_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Document-store filter
    Document,
    /// Postgres JSONB WHERE clause
    Sql,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a JSON query into a backend filter
    Translate {
        /// Target backend
        #[arg(long, value_enum, default_value = "document")]
        backend: Backend,
        /// Query JSON (one query or an array of units); stdin if omitted
        query: Option<String>,
    },
    /// Generate random primary keys
    Keygen {
        /// Number of keys
        #[arg(long, default_value_t = 1)]
        count: u32,
        /// Characters per key (defaults to QUARRY_KEYGEN_LENGTH)
        #[arg(long)]
        length: Option<usize>,
        /// Seed for reproducible keys
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Insert a record, generating a key unless one is given
    #[cfg(feature = "postgres")]
    Insert {
        /// Table name
        #[arg(long)]
        table: String,
        /// Primary key
        #[arg(long)]
        key: Option<String>,
        /// Record JSON
        record: String,
    },
    /// Print the record under a key
    #[cfg(feature = "postgres")]
    Get {
        /// Table name
        #[arg(long)]
        table: String,
        /// Primary key
        key: String,
    },
    /// Print records matching a query
    #[cfg(feature = "postgres")]
    Find {
        /// Table name
        #[arg(long)]
        table: String,
        /// Sort keys; a leading '-' sorts descending
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        sort: Vec<String>,
        /// Records to skip
        #[arg(long, default_value_t = 0)]
        skip: u64,
        /// Maximum records
        #[arg(long)]
        limit: Option<u64>,
        /// Query JSON; every record if omitted
        query: Option<String>,
    },
    /// Delete records matching a query
    #[cfg(feature = "postgres")]
    Remove {
        /// Table name
        #[arg(long)]
        table: String,
        /// Query JSON
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = OdmConfig::from_env()?;
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }

    // Initialize logging
    let filter = match cli.verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Translate { backend, query } => {
            let units = parse_units(&read_arg(query)?)?;
            let output = match backend {
                Backend::Document => DocumentTranslator::new().translate_all(&units)?,
                Backend::Sql => {
                    let filter = SqlTranslator::default().translate_all(&units)?;
                    json!({
                        "clause": filter.clause,
                        "params": filter.params.iter().map(param_to_json).collect::<Vec<_>>(),
                    })
                }
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Keygen {
            count,
            length,
            seed,
        } => {
            let length = length.unwrap_or(config.keygen_length);
            if !(1..=KEYGEN_LENGTH_MAX).contains(&length) {
                bail!("--length must be in 1..={KEYGEN_LENGTH_MAX}, got {length}");
            }
            let rng = match seed {
                Some(seed) => DeterministicRng::new(seed),
                None => DeterministicRng::from_entropy(),
            };
            tracing::debug!(seed = rng.seed(), length, count, "generating keys");
            let keygen = KeyGenerator::with_rng(length, config.keygen_attempts_max, rng);
            for _ in 0..count {
                if let Key::Str(key) = keygen.generate() {
                    println!("{key}");
                }
            }
        }
        #[cfg(feature = "postgres")]
        command => pg::run(command, &config).await?,
    }

    Ok(())
}

/// Read an argument, or stdin if it is absent or `-`.
fn read_arg(arg: Option<String>) -> anyhow::Result<String> {
    match arg {
        Some(text) if text != "-" => Ok(text),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

/// One query, or an array of query units.
fn parse_units(text: &str) -> anyhow::Result<Vec<Query>> {
    let value: Value = serde_json::from_str(text).context("query is not valid JSON")?;
    let units = match value {
        Value::Array(_) => serde_json::from_value(value)?,
        Value::Object(_) => vec![serde_json::from_value(value)?],
        other => bail!("query must be an object or an array, got {other}"),
    };
    Ok(units)
}

fn param_to_json(param: &SqlParam) -> Value {
    match param {
        SqlParam::Text(text) => json!({"text": text}),
        SqlParam::Path(path) => json!({"path": path}),
        SqlParam::Json(value) => json!({"json": value}),
        SqlParam::Int(n) => json!({"int": n}),
    }
}

#[cfg(feature = "postgres")]
mod pg {
    use anyhow::{bail, Context};
    use quarry_core::constants::PRIMARY_NAME_DEFAULT;
    use quarry_core::storage::{Instrumented, PostgresBackend, StorageBackend};
    use quarry_core::{Key, KeyGenerator, OdmConfig, Record};
    use serde_json::Value;

    use super::{parse_units, Commands};

    fn parse_key(text: &str) -> Key {
        text.parse::<i64>().map_or_else(|_| Key::from(text), Key::Int)
    }

    fn parse_record(text: &str) -> anyhow::Result<Record> {
        match serde_json::from_str(text).context("record is not valid JSON")? {
            Value::Object(record) => Ok(record),
            other => bail!("record must be a JSON object, got {other}"),
        }
    }

    /// Reject input the backend would refuse with a panic.
    fn check_target(url: &str, table: &str) -> anyhow::Result<()> {
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            bail!("database URL must start with postgres:// or postgresql://");
        }
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("--table must be a plain identifier, got {table:?}");
        }
        Ok(())
    }

    async fn open(
        config: &OdmConfig,
        table: &str,
    ) -> anyhow::Result<Instrumented<PostgresBackend>> {
        let Some(url) = config.database_url.as_deref() else {
            bail!("no database URL: pass --database-url or set QUARRY_DATABASE_URL");
        };
        check_target(url, table)?;
        let backend = PostgresBackend::new(url, table).await?;
        Ok(Instrumented::new(backend))
    }

    pub(super) async fn run(command: Commands, config: &OdmConfig) -> anyhow::Result<()> {
        match command {
            Commands::Insert { table, key, record } => {
                let storage = open(config, &table).await?;
                let record = parse_record(&record)?;
                let key = match key {
                    Some(key) => {
                        let key = parse_key(&key);
                        storage.insert(PRIMARY_NAME_DEFAULT, &key, record).await?;
                        key
                    }
                    None => {
                        let keygen = KeyGenerator::from_config(config);
                        storage
                            .insert_generated(PRIMARY_NAME_DEFAULT, record, &keygen)
                            .await?
                    }
                };
                println!("{key}");
            }
            Commands::Get { table, key } => {
                let storage = open(config, &table).await?;
                match storage.get(PRIMARY_NAME_DEFAULT, &parse_key(&key)).await? {
                    Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                    None => bail!("no record under {key}"),
                }
            }
            Commands::Find {
                table,
                sort,
                skip,
                limit,
                query,
            } => {
                let storage = open(config, &table).await?;
                let units = match query {
                    Some(text) => parse_units(&text)?,
                    None => Vec::new(),
                };
                let mut cursor = storage.find(&units).await?.sort(&sort)?.skip(skip);
                if let Some(limit) = limit {
                    cursor = cursor.limit(limit);
                }
                for record in cursor.to_vec().await? {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
            Commands::Remove { table, query } => {
                let storage = open(config, &table).await?;
                let removed = storage.remove(&parse_units(&query)?).await?;
                println!("{removed}");
            }
            Commands::Translate { .. } | Commands::Keygen { .. } => {
                unreachable!("handled in main")
            }
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_check_target() {
            assert!(check_target("postgres://localhost/db", "users").is_ok());
            assert!(check_target("mysql://localhost/db", "users").is_err());
            assert!(check_target("postgres://localhost/db", "users; drop").is_err());
            assert!(check_target("postgres://localhost/db", "").is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_translate() {
        let cli = Cli::try_parse_from([
            "quarry",
            "-vv",
            "translate",
            "--backend",
            "sql",
            r#"{"attribute": "age", "operator": "gt", "argument": 1}"#,
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Translate { backend, query } => {
                assert!(matches!(backend, Backend::Sql));
                assert!(query.is_some());
            }
            _ => panic!("expected translate"),
        }
    }

    #[test]
    fn test_parse_keygen_defaults() {
        let cli = Cli::try_parse_from(["quarry", "keygen"]).unwrap();
        match cli.command {
            Commands::Keygen {
                count,
                length,
                seed,
            } => {
                assert_eq!(count, 1);
                assert!(length.is_none());
                assert!(seed.is_none());
            }
            _ => panic!("expected keygen"),
        }
    }

    #[test]
    fn test_parse_units_accepts_object_and_array() {
        let one = parse_units(r#"{"attribute": "a", "operator": "eq", "argument": 1}"#).unwrap();
        assert_eq!(one.len(), 1);

        let many = parse_units(
            r#"[{"attribute": "a", "operator": "eq", "argument": 1},
                {"attribute": "b", "operator": "lt", "argument": 2}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);

        assert!(parse_units("42").is_err());
        assert!(parse_units("not json").is_err());
    }

    #[test]
    fn test_param_to_json() {
        assert_eq!(param_to_json(&SqlParam::Int(3)), json!({"int": 3}));
        assert_eq!(
            param_to_json(&SqlParam::Path(vec!["a".into(), "b".into()])),
            json!({"path": ["a", "b"]})
        );
    }
}
