//! scoreline-enrich - command-line enrichment runner
//!
//! Reads a JSON array of rows, runs one enrichment pipeline over it and
//! writes the rows back out with the enrichment attached as a new column.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scoreline_common::logging::init_tracing;
use scoreline_enrich::pipeline::album_match::DEFAULT_COMPOSER_COLUMN;
use scoreline_enrich::pipeline::{
    AlbumMatchPipeline, ArtistProfilePipeline, ComposerPipeline, MusicPipeline, RevenuePipeline,
    SoundtrackPipeline,
};
use scoreline_enrich::{ChunkedJobRunner, EnrichConfig, InputRecord, StageResolver};
use serde::Serialize;
use tracing::{info, warn};

/// Command-line arguments for scoreline-enrich
#[derive(Parser, Debug)]
#[command(name = "scoreline-enrich")]
#[command(about = "Enrich movie and composer records from TMDB and Spotify")]
#[command(version)]
struct Args {
    /// Config file (default: $SCORELINE_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TMDB bearer token (overrides environment and config file)
    #[arg(long)]
    tmdb_token: Option<String>,

    /// Spotify bearer token (overrides environment and config file)
    #[arg(long)]
    spotify_token: Option<String>,

    /// Records per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    pipeline: PipelineCommand,
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Movies → composers credited on each movie
    Composers(IoArgs),
    /// Movies → box office revenue
    Revenue(IoArgs),
    /// Composer names → tracks from the composer's albums
    Music(IoArgs),
    /// Movies → best matching soundtrack album
    Albums(AlbumArgs),
    /// Movies → tracks of the best matching soundtrack album
    Soundtrack(AlbumArgs),
    /// Composer names → artist profiles
    Artists(IoArgs),
}

#[derive(clap::Args, Debug)]
struct IoArgs {
    /// JSON array of input rows
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the enriched rows
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(clap::Args, Debug)]
struct AlbumArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Input column holding the movie's composer name
    #[arg(long, default_value = DEFAULT_COMPOSER_COLUMN)]
    composer_column: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = EnrichConfig::load(args.config.as_deref()).context("Failed to load config")?;
    init_tracing(&config.logging)?;

    info!("Starting scoreline-enrich");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let runner = config.runner(args.chunk_size);
    let tmdb_token = args.tmdb_token.as_deref();
    let spotify_token = args.spotify_token.as_deref();

    // Provider clients live until the end of the match arm; dropping them
    // closes their connection pools
    match args.pipeline {
        PipelineCommand::Composers(io) => {
            let tmdb = Arc::new(config.tmdb_api(tmdb_token)?);
            run_pipeline(&runner, ComposerPipeline::new(tmdb), &io).await
        }
        PipelineCommand::Revenue(io) => {
            let tmdb = Arc::new(config.tmdb_api(tmdb_token)?);
            run_pipeline(&runner, RevenuePipeline::new(tmdb), &io).await
        }
        PipelineCommand::Music(io) => {
            let spotify = Arc::new(config.spotify_api(spotify_token)?);
            run_pipeline(&runner, MusicPipeline::new(spotify), &io).await
        }
        PipelineCommand::Albums(album) => {
            let spotify = Arc::new(config.spotify_api(spotify_token)?);
            let pipeline = AlbumMatchPipeline::new(spotify).with_composer_column(album.composer_column);
            run_pipeline(&runner, pipeline, &album.io).await
        }
        PipelineCommand::Soundtrack(album) => {
            let spotify = Arc::new(config.spotify_api(spotify_token)?);
            let albums = AlbumMatchPipeline::new(spotify).with_composer_column(album.composer_column);
            run_pipeline(&runner, SoundtrackPipeline::new(albums), &album.io).await
        }
        PipelineCommand::Artists(io) => {
            let spotify = Arc::new(config.spotify_api(spotify_token)?);
            run_pipeline(&runner, ArtistProfilePipeline::new(spotify), &io).await
        }
    }
}

/// Run one pipeline over the input file; the enrichment lands in a column
/// named after the pipeline
async fn run_pipeline<R>(runner: &ChunkedJobRunner, resolver: R, io: &IoArgs) -> Result<()>
where
    R: StageResolver,
    R::Output: Serialize,
{
    let column = resolver.name();
    let rows = read_rows(&io.input)?;
    info!(
        pipeline = resolver.name(),
        rows = rows.len(),
        input = %io.input.display(),
        "Input loaded"
    );

    let report = runner.run(&rows, &resolver).await;

    if !report.is_complete() {
        warn!(
            failed_chunks = report.failed_chunks.len(),
            "Some chunks were abandoned; their rows have no '{}' column",
            column
        );
    }

    let enriched = report.to_rows(column)?;
    let json = serde_json::to_string_pretty(&enriched)?;
    std::fs::write(&io.output, json)
        .with_context(|| format!("Failed to write {}", io.output.display()))?;

    info!(
        rows = enriched.len(),
        attempts = report.attempts,
        output = %io.output.display(),
        "Output written"
    );
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<InputRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut rows: Vec<InputRecord> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of rows", path.display()))?;
    InputRecord::assign_positions(&mut rows);
    Ok(rows)
}
