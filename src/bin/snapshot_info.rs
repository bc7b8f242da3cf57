use clap::Parser;
use icwmatrix::{IcwError, loader::MatchesLoader};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapshot_info")]
#[command(about = "Summarise a saved icwmatrix snapshot", long_about = None)]
struct Cli {
    path: PathBuf,
}

fn main() -> Result<(), IcwError> {
    icwmatrix::init_tracing("snapshot_info");
    let cli = Cli::parse();

    let snapshot = MatchesLoader::default().read_snapshot(&cli.path)?;
    snapshot.validate()?;

    println!("owner\t{}", snapshot.owner_id);
    println!("matches\t{}", snapshot.matches.len());
    println!("fetched\t{}", snapshot.icw.len());
    println!("with shared matches\t{}", snapshot.matches_with_shared_matches());
    println!("average shared matches\t{:.1}", snapshot.average_shared_matches());
    println!("tags\t{}", snapshot.tags.len());
    Ok(())
}
