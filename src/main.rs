use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use issuedesk::clustering::{
    self, analyze_clusters, elbow_index, grid_search, grid_table, k_distance_profile,
    write_k_distance_csv, DbscanParams,
};
use issuedesk::config::PipelineConfig;
use issuedesk::db::Database;
use issuedesk::environment::get_env_var_as_parsed_vec;
use issuedesk::ingest::ingest_file;
use issuedesk::llm::LlmGenerator;
use issuedesk::logging::configure_logging;
use issuedesk::pipeline::{ArtifactStore, Pipeline, PipelineSettings, PipelineState, Stage};
use issuedesk::vector::{distance_matrix, OpenAIEmbedder};
use issuedesk::{LLMParams, TARGET_PIPELINE};

#[derive(Parser)]
#[clap(
    name = "issuedesk",
    about = "Group news coverage across outlets into issues"
)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in order (the default)
    Run,

    /// Embed articles that are not linked to an issue yet
    Vectorize,

    /// Cluster the embeddings from the last vectorize run
    Group {
        /// Neighbourhood radius in cosine distance
        #[clap(long)]
        eps: Option<f64>,

        /// Neighbours (other than itself) a point needs to be a core point
        #[clap(long)]
        min_samples: Option<usize>,

        /// Score a grid of parameters instead of clustering
        #[clap(long)]
        grid_search: bool,

        /// Write the k-distance profile instead of clustering
        #[clap(long)]
        plot_k_distance: bool,

        /// Neighbour rank used by the k-distance profile
        #[clap(short, long, default_value = "4")]
        k: usize,
    },

    /// Create an issue for every cluster from the last group run
    Synthesize,

    /// Link articles to the issues created by the last synthesize run
    Reconcile,

    /// Load a JSON array of scraped articles into the database
    Ingest {
        #[clap(required = true)]
        file: PathBuf,
    },

    /// Remove intermediate artifacts
    Clean,
}

#[tokio::main]
async fn main() -> ExitCode {
    configure_logging();
    let cli = Cli::parse();

    match run(cli.command.unwrap_or(Commands::Run)).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<bool> {
    let config = PipelineConfig::from_env();
    let artifacts = ArtifactStore::new(&config.artifact_dir);

    let (stages, dbscan) = match command {
        Commands::Clean => {
            let removed = artifacts.clean()?;
            println!("{} {} artifacts removed", "✓".green(), removed.len());
            return Ok(true);
        }
        Commands::Group {
            grid_search,
            plot_k_distance,
            k,
            ..
        } if grid_search || plot_k_distance => {
            run_diagnostics(&artifacts, grid_search, plot_k_distance, k)?;
            return Ok(true);
        }
        Commands::Ingest { file } => {
            let db = Database::new(&config.database_path).await?;
            let report = ingest_file(&db, &file).await?;
            println!(
                "{} {} articles stored, {} skipped",
                "✓".green(),
                report.succeeded(),
                report.skipped.len()
            );
            return Ok(true);
        }
        Commands::Run => (Stage::ALL.to_vec(), config.dbscan),
        Commands::Vectorize => (vec![Stage::Vectorize], config.dbscan),
        Commands::Group {
            eps, min_samples, ..
        } => (
            vec![Stage::Group],
            DbscanParams {
                eps: eps.unwrap_or(config.dbscan.eps),
                min_samples: min_samples.unwrap_or(config.dbscan.min_samples),
            },
        ),
        Commands::Synthesize => (vec![Stage::Synthesize], config.dbscan),
        Commands::Reconcile => (vec![Stage::Reconcile], config.dbscan),
    };

    let db = Database::new(&config.database_path).await?;
    let embedder = OpenAIEmbedder::new(
        config.openai_api_key.as_deref().unwrap_or_default(),
        &config.embedding_model,
    );
    let generator = LlmGenerator::new(LLMParams::from_config(&config));
    let settings = PipelineSettings {
        dbscan,
        ..PipelineSettings::from_config(&config)
    };

    let pipeline = Pipeline::new(&db, &embedder, &generator, artifacts, settings);
    let outcome = pipeline.run(&stages).await;

    if stages.contains(&Stage::Group) && !outcome.state.is_failed() {
        let assignments = pipeline.artifacts().load_clusters()?;
        analyze_clusters(&assignments).printstd();
    }

    println!("{}", outcome.summary);
    if let PipelineState::Failed { stage, error } = &outcome.state {
        eprintln!("{} stage {} failed: {}", "✗".red().bold(), stage, error);
    } else {
        println!("{}", "✓ Pipeline completed".green().bold());
    }

    Ok(outcome.succeeded())
}

/// Tuning aids for `eps`/`min_samples`; neither touches the database.
fn run_diagnostics(
    artifacts: &ArtifactStore,
    grid: bool,
    plot_k_distance: bool,
    k: usize,
) -> Result<()> {
    let records = artifacts.load_embeddings()?;
    let vectors: Vec<Vec<f32>> = records
        .into_iter()
        .map(|r| r.embedding)
        .filter(|v| !v.is_empty())
        .collect();
    info!(target: TARGET_PIPELINE, "Loaded {} vectors for diagnostics", vectors.len());
    let distances = distance_matrix(&vectors)?;

    if plot_k_distance {
        let profile = k_distance_profile(&distances, k);
        let path = artifacts
            .reports_dir()
            .join(format!("k_distance_k{}.csv", k));
        write_k_distance_csv(&path, &profile)?;
        println!("{} k-distance profile written to {}", "✓".green(), path.display());

        if let Some(index) = elbow_index(&profile) {
            println!(
                "Suggested eps (elbow at point {}): {:.3}",
                index, profile[index]
            );
        }
    }

    if grid {
        let mut eps_values: Vec<f64> = get_env_var_as_parsed_vec("GRID_EPS", ';');
        if eps_values.is_empty() {
            eps_values = clustering::DEFAULT_GRID_EPS.to_vec();
        }
        let mut min_samples_values: Vec<usize> = get_env_var_as_parsed_vec("GRID_MIN_SAMPLES", ';');
        if min_samples_values.is_empty() {
            min_samples_values = clustering::DEFAULT_GRID_MIN_SAMPLES.to_vec();
        }

        let candidates = grid_search(&distances, &eps_values, &min_samples_values);
        match candidates.first() {
            Some(best) => {
                grid_table(&candidates).printstd();
                println!(
                    "{} best silhouette {:.4} at eps={}, min_samples={} ({} clusters, {} noise)",
                    "✓".green(),
                    best.silhouette,
                    best.params.eps,
                    best.params.min_samples,
                    best.clusters,
                    best.noise
                );
            }
            None => println!(
                "{}",
                "No parameter combination produced a usable clustering".yellow()
            ),
        }
    }

    Ok(())
}
