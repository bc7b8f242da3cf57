use clap::{Args, Parser, Subcommand};
use icwmatrix::{
    IcwError,
    config::{ClusterConfig, LoadFilter, MatrixConfig, RunConfig, ThrottleConfig, parse_identifier_list},
    csv_sink::CsvSink,
    fetcher::ReplayFetcher,
    loader::MatchesLoader,
    pipeline::{cluster_saved_data, extend_saved_data},
    progress::Progress,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "icwmatrix")]
#[command(about = "Shared-match aggregation and correlation clustering for DNA matches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch shared matches for selected matches and save the extended data
    Extend(ExtendArgs),
    /// Cluster saved data and write the correlation matrix as CSV
    Cluster(ClusterArgs),
}

#[derive(Args)]
struct ExtendArgs {
    /// Saved data to extend
    #[arg(long)]
    input: PathBuf,
    /// Where to save the extended data (`.bin` for binary)
    #[arg(long)]
    output: PathBuf,
    /// Saved data to replay shared matches from
    #[arg(long)]
    donor: PathBuf,
    /// Match identifier to extend; repeatable
    #[arg(long = "extend")]
    extend: Vec<String>,
    /// File with one identifier per line
    #[arg(long)]
    extend_file: Option<PathBuf>,
    #[arg(long, default_value_t = ThrottleConfig::default().max_requests)]
    max_requests: usize,
    #[arg(long, default_value_t = ThrottleConfig::default().max_matches_in_flight)]
    max_matches_in_flight: usize,
}

#[derive(Args)]
struct ClusterArgs {
    /// Saved data to cluster
    #[arg(long)]
    input: PathBuf,
    /// First output file; further files get -2, -3, ... suffixes
    #[arg(long)]
    output: PathBuf,
    #[arg(long, default_value_t = LoadFilter::default().min_centimorgans_to_cluster)]
    min_centimorgans_to_cluster: f64,
    #[arg(long, default_value_t = LoadFilter::default().min_centimorgans_in_shared_matches)]
    min_centimorgans_in_shared_matches: f64,
    #[arg(long, default_value_t = ClusterConfig::default().min_cluster_size)]
    min_cluster_size: usize,
    #[arg(long, default_value_t = ClusterConfig::default().cluster_linkage)]
    cluster_linkage: f64,
    #[arg(long, default_value_t = MatrixConfig::default().lowest_clusterable_centimorgans)]
    lowest_clusterable_centimorgans: f64,
    #[arg(long, default_value_t = MatrixConfig::default().max_matches_per_file)]
    max_matches_per_file: usize,
    /// Host for per-match links
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), IcwError> {
    icwmatrix::init_tracing("icwmatrix");
    let cli = Cli::parse();
    let progress = Arc::new(Progress::new());

    match cli.command {
        Commands::Extend(args) => {
            let mut ids = args.extend;
            if let Some(path) = &args.extend_file {
                ids.extend(parse_identifier_list(&fs::read_to_string(path)?));
            }
            let mut config = RunConfig::new(args.input, args.output).with_extend(ids);
            config.throttle = ThrottleConfig {
                max_requests: args.max_requests,
                max_matches_in_flight: args.max_matches_in_flight,
            };

            let donor = MatchesLoader::default().read_snapshot(&args.donor)?;
            let fetcher = Arc::new(ReplayFetcher::from_snapshot(&donor));
            if fetcher.is_empty() {
                warn!(donor = %args.donor.display(), "donor has no saved shared matches");
            } else {
                info!(entries = fetcher.len(), "replaying saved shared matches");
            }
            let summary = extend_saved_data(&config, fetcher, progress).await?;
            println!(
                "Done. Downloaded {} matches ({} with shared matches, averaging {:.1} shared matches). Saved {}",
                summary.fetched,
                summary.with_shared_matches,
                summary.average_shared_matches,
                summary.output_path.display()
            );
        }
        Commands::Cluster(args) => {
            let mut config = RunConfig::new(args.input, args.output);
            config.load_filter = LoadFilter {
                min_centimorgans_to_cluster: args.min_centimorgans_to_cluster,
                min_centimorgans_in_shared_matches: args.min_centimorgans_in_shared_matches,
            };
            config.cluster.min_cluster_size = args.min_cluster_size;
            config.cluster.cluster_linkage = args.cluster_linkage;
            config.matrix.lowest_clusterable_centimorgans = args.lowest_clusterable_centimorgans;
            config.matrix.max_matches_per_file = args.max_matches_per_file;
            config.matrix.host_name = args.host;

            let files = cluster_saved_data(&config, &mut CsvSink::new(), progress)?;
            if files.is_empty() {
                println!("Nothing to write.");
            }
            for file in files {
                println!("{}", file.display());
            }
        }
    }
    Ok(())
}
