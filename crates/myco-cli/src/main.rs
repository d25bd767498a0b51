//! `myco-query`: compile and run queries against a dataset file.
//!
//! ```text
//! myco-query run observation '{"region": "California, USA"}' --data fixture.yaml
//! myco-query explain name '{"observation_query": {"clade": "Agaricales"}}' --data fixture.yaml
//! myco-query nav observation 3 --data fixture.yaml
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use myco_query::{
    params_from_json, params_to_json, EngineConfig, Id, LocationFormat, MemoryStore, ParamMap, Query,
    QueryContext, QueryEngine, RecordType,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "myco-query")]
#[command(version)]
#[command(about = "Compile and run mycology record queries over a dataset file")]
struct Cli {
    /// Engine config (YAML). Defaults to $MYCO_QUERY_CONFIG, then built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print matching ids in order
    Run {
        #[command(flatten)]
        query: QueryArgs,

        /// Only this page of results (numbered from 1)
        #[arg(long)]
        page: Option<usize>,

        #[arg(long, default_value_t = 20)]
        per_page: usize,
    },

    /// Print the number of matches
    Count(QueryArgs),

    /// Print the query's fingerprint
    Fingerprint(QueryArgs),

    /// Print the compiled predicate and sort order without running it
    Explain(QueryArgs),

    /// Print an id's neighbours within the results
    Nav {
        #[command(flatten)]
        query: QueryArgs,

        /// Id to navigate from
        #[arg(long)]
        id: Id,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Record type, e.g. `observation`
    #[arg(value_parser = parse_record_type)]
    record_type: RecordType,

    /// Params as a JSON object
    #[arg(default_value = "{}")]
    params: String,

    /// Dataset file (.json, .yaml or .yml)
    #[arg(short, long)]
    data: PathBuf,

    /// Run as this user id
    #[arg(short, long)]
    user: Option<Id>,

    /// `postal` or `scientific`
    #[arg(long, value_parser = parse_location_format)]
    location_format: Option<LocationFormat>,
}

fn parse_record_type(input: &str) -> std::result::Result<RecordType, String> {
    RecordType::parse(input).map_err(|err| err.to_string())
}

fn parse_location_format(input: &str) -> std::result::Result<LocationFormat, String> {
    LocationFormat::parse(input).ok_or_else(|| format!("unknown location format `{input}`"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("myco_query=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("reading config {}", path.display())),
        None => EngineConfig::from_env().context("reading config from MYCO_QUERY_CONFIG"),
    }
}

impl QueryArgs {
    fn params(&self) -> Result<ParamMap> {
        let json: serde_json::Value = serde_json::from_str(&self.params).context("params are not valid JSON")?;
        Ok(params_from_json(&json)?)
    }

    fn context(&self, engine: &QueryEngine) -> QueryContext {
        let mut context = engine.context();
        if let Some(user) = self.user {
            context = context.with_user(user);
        }
        if let Some(format) = self.location_format {
            context = context.with_location_format(format);
        }
        context
    }

    fn engine(&self, config: EngineConfig) -> Result<QueryEngine> {
        let data = MemoryStore::load(&self.data).with_context(|| format!("loading {}", self.data.display()))?;
        Ok(QueryEngine::in_memory(Arc::new(data), config))
    }

    fn lookup(&self, config: EngineConfig) -> Result<Arc<Query>> {
        let engine = self.engine(config)?;
        let params = self.params()?;
        let query = engine.lookup(self.record_type, &params, &self.context(&engine))?;
        tracing::debug!(fingerprint = %query.fingerprint(), "compiled");
        Ok(query)
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run { query, page, per_page } => {
            let query = query.lookup(config)?;
            let ids = match page {
                Some(page) => query.paginate(page, per_page)?,
                None => query.result_ids()?,
            };
            print_json(&json!({
                "record_type": query.record_type().tag(),
                "fingerprint": query.fingerprint().as_str(),
                "count": query.count()?,
                "pages": query.num_pages(per_page)?,
                "ids": ids,
            }))
        }
        Command::Count(args) => {
            println!("{}", args.lookup(config)?.count()?);
            Ok(())
        }
        Command::Fingerprint(args) => {
            println!("{}", args.lookup(config)?.fingerprint());
            Ok(())
        }
        Command::Explain(args) => {
            let query = args.lookup(config)?;
            let spec = query.spec();
            print_json(&json!({
                "record_type": spec.record_type.tag(),
                "fingerprint": spec.fingerprint.as_str(),
                "params": params_to_json(&spec.params),
                "context": params_to_json(&spec.context),
                "sql": spec.to_string(),
            }))
        }
        Command::Nav { query, id } => {
            let query = query.lookup(config)?;
            let Some(index) = query.index_of(id)? else {
                anyhow::bail!("{id} is not among the results");
            };
            print_json(&json!({
                "id": id,
                "index": index,
                "prev": query.prev(id)?,
                "next": query.next(id)?,
                "first": query.first_id()?,
                "last": query.last_id()?,
            }))
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    run(Cli::parse())
}
