use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use color_eyre::Result;
use jgcstats::config::{Config, load_config, load_config_from_path};
use jgcstats::health::{Classifier, Thresholds};
use jgcstats::report::{COLUMN_LEGEND, Reporter};
use jgcstats::system::{Collector, HotspotSource, MetricSource};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "JGCSTATS_LOG";
/// Characters that mean something inside a `-xyz` cluster.
const SHORT_FLAGS: &[char] = &['c', '1', 'h'];

#[derive(Parser, Debug)]
#[command(
    name = "jgcstats",
    about = "Garbage collection and resource health of the JVMs on this host",
    disable_help_flag = true,
    after_long_help = COLUMN_LEGEND
)]
struct Cli {
    /// Print one health character per JVM instead of the table
    #[arg(short = 'c')]
    compact: bool,

    /// Measure over one second instead of the JVM's lifetime
    #[arg(short = '1')]
    one_second: bool,

    /// Print usage and the column legend
    #[arg(short = 'h', long = "help")]
    help: bool,

    /// Path to config file
    #[arg(long, allow_hyphen_values = true)]
    config: Option<PathBuf>,

    /// Only inspect the JVM with this process id; the last one given wins
    #[arg(value_name = "PID")]
    pids: Vec<String>,
}

impl Cli {
    fn selected_pid(&self) -> Option<&str> {
        self.pids.last().map(String::as_str)
    }
}

/// Drops unknown characters from short-flag clusters, so `-fc` means `-c`
/// and `-g` means nothing. Long options and their values pass untouched.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = Vec::new();
    let mut takes_value = false;
    for arg in args {
        if std::mem::take(&mut takes_value) {
            out.push(arg);
            continue;
        }
        let Some(text) = arg.to_str() else {
            out.push(arg);
            continue;
        };
        if text == "--config" {
            takes_value = true;
            out.push(arg);
        } else if text.starts_with("--") || !text.starts_with('-') {
            out.push(arg);
        } else {
            let known: String = text[1..].chars().filter(|c| SHORT_FLAGS.contains(c)).collect();
            if !known.is_empty() {
                out.push(OsString::from(format!("-{known}")));
            }
        }
    }
    out
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    if cli.help {
        Cli::command().print_long_help()?;
        std::process::exit(1);
    }

    init_logging();
    let config = load_config_for_cli(&cli);

    let source = Arc::new(HotspotSource::new(&config.source.perfdata_roots));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let output = runtime.block_on(run(&cli, &config, source));
    // a fetch that timed out may still be blocked in its worker thread
    runtime.shutdown_background();

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn run(cli: &Cli, config: &Config, source: Arc<dyn MetricSource>) -> String {
    let collector = Collector::new(source).with_fetch_timeout(config.general.fetch_timeout());
    let selected = cli.selected_pid();

    let observations = if cli.one_second {
        collector
            .observe_delta(selected, config.general.delta_interval())
            .await
    } else {
        collector.observe(selected).await
    };
    tracing::debug!(count = observations.len(), "collected observations");

    let reporter = Reporter::new(Classifier::new(Thresholds::DEFAULT), config.report.name_width);
    if cli.compact {
        format!("{}\n", reporter.render_compact(&observations))
    } else {
        reporter.render_table(&observations)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config_for_cli(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
}
