use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use flowlogs_reader::aggregation::{DEFAULT_KEY_FIELDS, KeyField};
use flowlogs_reader::config::AppConfig;
use flowlogs_reader::gcp::GcpClient;
use flowlogs_reader::output;
use flowlogs_reader::reader::{ProjectLister, Reader, ReaderConfig};
use flowlogs_reader::source::EntryLister;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[derive(Parser)]
#[command(
    name = "flowlogs-reader",
    about = "Read records from Google Cloud VPC Flow Logs"
)]
struct Cli {
    /// Filter for records at or after this time (default: one hour ago).
    #[arg(short = 's', long, value_name = "WHEN")]
    start_time: Option<String>,

    /// Filter for records before this time (default: now).
    #[arg(short = 'e', long, value_name = "WHEN")]
    end_time: Option<String>,

    /// strftime(3) format used to interpret --start-time and --end-time.
    #[arg(long, default_value = "%Y-%m-%d %H:%M:%S", value_name = "FORMAT")]
    time_format: String,

    /// Additional server-side filters, split on " AND ".
    #[arg(long)]
    filters: Option<String>,

    /// Collect flows from every project visible to the credentials.
    #[arg(long)]
    collect_multiple_projects: bool,

    /// Log name to read (default: derived from the project name).
    #[arg(long, value_name = "NAME")]
    log_name: Option<String>,

    /// Project id (default: the GOOGLE_CLOUD_PROJECT environment variable).
    #[arg(long, value_name = "ID")]
    project: Option<String>,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand)]
enum Action {
    /// Print the flow log records as TSV.
    Print {
        /// Stop after this many records (0 = no limit).
        limit: Option<u64>,
    },
    /// Show the set of IPs seen in the flow log records.
    Ipset,
    /// Find flow log records involving the given IPs.
    Findip { ips: Vec<IpAddr> },
    /// Aggregate flow records by a key tuple and print the totals.
    Aggregate {
        /// Comma-separated key fields (default: the 5-tuple).
        #[arg(long, value_delimiter = ',')]
        key_fields: Option<Vec<KeyField>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app_config = AppConfig::load()?;

    let start_time = parse_cli_time(cli.start_time.as_deref(), &cli.time_format, "--start-time")?;
    let end_time = parse_cli_time(cli.end_time.as_deref(), &cli.time_format, "--end-time")?;
    let filters: Vec<String> = cli
        .filters
        .map(|f| f.split(" AND ").map(str::to_owned).collect())
        .unwrap_or_default();

    let access_token = std::env::var("GOOGLE_ACCESS_TOKEN").context(
        "GOOGLE_ACCESS_TOKEN is not set (try `gcloud auth print-access-token`)",
    )?;
    let project_id = match cli.project {
        Some(p) => p,
        None => std::env::var("GOOGLE_CLOUD_PROJECT")
            .context("set GOOGLE_CLOUD_PROJECT or pass --project")?,
    };
    let client = Arc::new(GcpClient::new(project_id, access_token)?);

    let reader_config = ReaderConfig {
        start_time,
        end_time,
        filters,
        log_name: cli.log_name,
        collect_multiple_projects: cli.collect_multiple_projects,
        page_size: app_config.query.page_size,
        retry: app_config.retry_policy(),
    };
    let project_lister = cli
        .collect_multiple_projects
        .then_some(client.as_ref() as &dyn ProjectLister);
    let reader = Reader::new(
        Arc::clone(&client) as Arc<dyn EntryLister>,
        client.project_id(),
        project_lister,
        reader_config,
    )
    .await;

    let mut records = reader.records();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.action.unwrap_or(Action::Print { limit: None }) {
        Action::Print { limit } => {
            let stop_after = limit.filter(|n| *n > 0);
            output::action_print(&mut records, &mut out, stop_after).await?;
        }
        Action::Ipset => output::action_ipset(&mut records, &mut out).await?,
        Action::Findip { ips } => {
            let targets: HashSet<IpAddr> = ips.into_iter().collect();
            output::action_findip(&mut records, &mut out, &targets).await?;
        }
        Action::Aggregate { key_fields } => {
            let key_fields = key_fields.unwrap_or_else(|| DEFAULT_KEY_FIELDS.to_vec());
            output::action_aggregate(&mut records, &mut out, &key_fields).await?;
        }
    }

    tracing::info!(
        bytes_processed = records.bytes_processed(),
        "query complete"
    );
    Ok(())
}

fn parse_cli_time(
    value: Option<&str>,
    format: &str,
    flag: &str,
) -> Result<Option<NaiveDateTime>> {
    value
        .map(|s| {
            NaiveDateTime::parse_from_str(s, format)
                .with_context(|| format!("{flag}: cannot parse {s:?} with format {format:?}"))
        })
        .transpose()
}
