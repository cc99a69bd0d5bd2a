use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use estat_rs::storage;
use estat_rs::{Client, ClientConfig, Query, Record, SortKey, TableOptions, TimeWindow};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "estat",
    version,
    about = "Browse Eurostat datasets and fetch observations"
)]
struct Cli {
    /// Root of the SDMX REST service (overrides ESTAT_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List datasets whose id or name contains any of the terms.
    Datasets {
        /// Search term (repeatable); no term lists everything.
        #[arg(short, long = "filter")]
        filter: Vec<String>,
    },
    /// Show dimensions and concepts of a dataset.
    Schema { dataset: String },
    /// Show the codes of one field of a dataset.
    Codes { dataset: String, field: String },
    /// Fetch observations (and optionally save them).
    Get(GetArgs),
}

#[derive(ValueEnum, Clone, Debug)]
enum OutFormat {
    Csv,
    Json,
}

#[derive(Args, Debug)]
struct GetArgs {
    dataset: String,
    /// Pin a dimension, e.g. FREQ=A (repeatable).
    #[arg(long = "fix", value_parser = parse_pair)]
    fix: Vec<(String, String)>,
    /// First year (inclusive).
    #[arg(long)]
    start: Option<i32>,
    /// Last year (inclusive).
    #[arg(long)]
    end: Option<i32>,
    /// Restrict a field to one or more values, e.g. GEO=NL,BE (repeatable).
    #[arg(short, long = "where", value_parser = parse_pair)]
    conditions: Vec<(String, String)>,
    /// Sort by a field, FIELD or FIELD:desc (repeatable).
    #[arg(long)]
    sort: Vec<String>,
    /// Save results to file (format inferred by --format or extension).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Output format (csv or json). If omitted, inferred from --out extension.
    #[arg(long, value_enum)]
    format: Option<OutFormat>,
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", s))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

fn parse_list(s: &str) -> Vec<String> {
    s.split([',', ';']).map(|x| x.trim().to_string()).collect()
}

fn parse_sort(s: &str) -> SortKey {
    match s.rsplit_once(':') {
        Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => SortKey::desc(field),
        Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => SortKey::asc(field),
        _ => SortKey::asc(s),
    }
}

fn window(start: Option<i32>, end: Option<i32>) -> TimeWindow {
    TimeWindow { start, end }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.base_url {
        config = config.with_base_url(url);
    }
    let client = Client::new(config)?;
    match cli.cmd {
        Command::Datasets { filter } => cmd_datasets(&client, &filter).await,
        Command::Schema { dataset } => cmd_schema(&client, &dataset).await,
        Command::Codes { dataset, field } => cmd_codes(&client, &dataset, &field).await,
        Command::Get(args) => cmd_get(&client, args).await,
    }
}

async fn cmd_datasets(client: &Client, terms: &[String]) -> Result<()> {
    let found = client.datasets(terms).await?;
    for d in &found {
        println!("{}\t{}", d.id, d.display_name(&client.config().languages));
    }
    eprintln!("{} datasets", found.len());
    Ok(())
}

async fn cmd_schema(client: &Client, dataset: &str) -> Result<()> {
    let schema = client.schema(dataset).await?;
    println!("dimensions: {}", schema.dimensions.join(", "));
    println!("concepts:   {}", schema.concepts.join(", "));
    for cl in &schema.code_lists {
        println!("{} ({}): {} codes", cl.field, cl.name, cl.codes.len());
    }
    Ok(())
}

async fn cmd_codes(client: &Client, dataset: &str, field: &str) -> Result<()> {
    for (code, name) in client.codes(dataset, field).await? {
        println!("{}\t{}", code, name);
    }
    Ok(())
}

async fn cmd_get(client: &Client, args: GetArgs) -> Result<()> {
    let mut opts = TableOptions::new().window(window(args.start, args.end));
    for (dim, value) in args.fix {
        opts = opts.fix(dim, value);
    }
    let table = client
        .init_table(&args.dataset, opts)
        .await
        .with_context(|| format!("initializing table {}", args.dataset))?;

    let mut query = Query::new();
    for (field, values) in &args.conditions {
        query = match parse_list(values).as_slice() {
            [one] => query.eq(field.as_str(), one.as_str()),
            many => query.any_of(field.as_str(), many.iter().map(String::as_str)),
        };
    }
    let order: Vec<SortKey> = args.sort.iter().map(|s| parse_sort(s)).collect();
    let rows = client.ensure_then_query(&args.dataset, &query, &order).await?;

    match args.out.as_ref() {
        Some(path) => {
            let fmt = match args.format {
                Some(OutFormat::Csv) => "csv",
                Some(OutFormat::Json) => "json",
                None => path.extension().and_then(|e| e.to_str()).unwrap_or("csv"),
            }
            .to_ascii_lowercase();
            match fmt.as_str() {
                "csv" => storage::save_csv(&rows, table.fields(), path)?,
                "json" => storage::save_json(&rows, path)?,
                other => anyhow::bail!("unsupported format: {}", other),
            }
            eprintln!("Saved {} rows to {}", rows.len(), path.display());
        }
        None => print_rows(&rows, table.fields()),
    }
    Ok(())
}

fn print_rows(rows: &[Record], fields: &[String]) {
    println!("{}", fields.join("\t"));
    for r in rows {
        let cells: Vec<String> = fields
            .iter()
            .map(|f| r.get(f).map(ToString::to_string).unwrap_or_default())
            .collect();
        println!("{}", cells.join("\t"));
    }
    eprintln!("{} rows", rows.len());
}
