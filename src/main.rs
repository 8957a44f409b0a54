//! `vannotate` — variant annotation pipeline CLI.
//!
//! Argument parsing plumbing, configuration-file loading, pedigree/VCF
//! parsing and feature-index loading are external collaborators (spec §1);
//! this binary wires the flags onto the library's `Pipeline` and reports a
//! clear error for flags that would require one of those collaborators.

use clap::{Parser, ValueEnum};
use console::Term;
use vannotate::common;
use vannotate::pipeline::{Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Csv,
    Tsv,
    Vcf,
    Schema,
}

/// CLI surface per SPEC_FULL.md §6.
#[derive(Debug, Parser)]
#[command(author, version, about = "Variant annotation pipeline", long_about = None)]
struct Cli {
    #[command(flatten)]
    common: common::Args,

    /// One or more variants given directly on the command line.
    #[arg(long, num_args = 1..)]
    variants: Vec<String>,

    /// Path to a file with one variant per line.
    #[arg(long)]
    variants_file: Option<std::path::PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Write output to this path instead of stdout (rejected in streaming mode).
    #[arg(long)]
    save: Option<std::path::PathBuf>,

    #[arg(long)]
    output_file: Option<std::path::PathBuf>,

    #[arg(long, default_value_t = true)]
    cache: bool,

    #[arg(long)]
    scoring_config_path: Option<std::path::PathBuf>,

    #[arg(long)]
    ped: Option<std::path::PathBuf>,

    #[arg(long)]
    calculate_inheritance: bool,

    #[arg(long)]
    sample_map: Option<String>,

    #[arg(long, default_value_t = vannotate::recoder::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long)]
    bed_file: Vec<std::path::PathBuf>,

    #[arg(long)]
    gene_list: Vec<std::path::PathBuf>,

    #[arg(long)]
    json_genes: Vec<std::path::PathBuf>,

    #[arg(long)]
    json_gene_mapping: Option<String>,
}

/// Collaborators this binary does not implement; exercising the
/// corresponding flag fails clearly instead of silently no-opping.
fn reject_unimplemented_collaborators(cli: &Cli) -> Result<(), anyhow::Error> {
    if cli.ped.is_some() {
        anyhow::bail!("pedigree file parsing is not implemented by this worker; pass genotypes programmatically via the library API");
    }
    if !cli.bed_file.is_empty()
        || !cli.gene_list.is_empty()
        || !cli.json_genes.is_empty()
        || cli.json_gene_mapping.is_some()
    {
        anyhow::bail!("feature-index loading (--bed-file/--gene-list/--json-genes/--json-gene-mapping) is not implemented by this worker; build indexes via the library API");
    }
    if cli.scoring_config_path.is_some() {
        anyhow::bail!("scoring configuration file loading is not implemented by this worker; construct a ScoringConfig via the library API");
    }
    Ok(())
}

fn parse_sample_map(raw: &str) -> vannotate::inheritance::RoleMap {
    let mut index = String::new();
    let mut mother = None;
    let mut father = None;
    for part in raw.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            match key.trim() {
                "index" => index = value.trim().to_string(),
                "mother" => mother = Some(value.trim().to_string()),
                "father" => father = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    vannotate::inheritance::RoleMap { index, mother, father }
}

fn collect_inputs(cli: &Cli) -> Result<Vec<String>, anyhow::Error> {
    let mut inputs = cli.variants.clone();
    if let Some(path) = &cli.variants_file {
        let text = std::fs::read_to_string(path)?;
        for line in text.lines() {
            if !line.trim().is_empty() {
                inputs.push(line.trim().to_string());
            }
        }
    }
    if inputs.is_empty() {
        anyhow::bail!("no variants given; pass --variants or --variants-file");
    }
    Ok(inputs)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let _guard = tracing::subscriber::set_default(collector_for(&cli));

    reject_unimplemented_collaborators(&cli)?;

    let inputs = collect_inputs(&cli)?;

    let mut config = PipelineConfig {
        cache_enabled: cli.cache,
        chunk_size: cli.chunk_size,
        calculate_inheritance: cli.calculate_inheritance,
        ..Default::default()
    };
    if let Some(sample_map) = &cli.sample_map {
        config.role_map = Some(parse_sample_map(sample_map));
    }

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.run(&inputs, None).await?;

    let rendered = match cli.output {
        OutputFormat::Json => format!(
            "{{\"meta\":{{\"batchSize\":{},\"stepsPerformed\":{:?}}},\"annotationData\":[{}]}}",
            output.meta.batch_size,
            output.meta.steps_performed,
            output
                .annotation_data
                .iter()
                .map(|a| serde_json::to_string(a).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(",")
        ),
        OutputFormat::Csv | OutputFormat::Tsv => {
            anyhow::bail!("CSV/TSV rendering requires an extract-column configuration; use the library API directly");
        }
        OutputFormat::Vcf => {
            anyhow::bail!("VCF rendering requires an original vcfRecordMap; use the library API directly");
        }
        OutputFormat::Schema => {
            "default-column/schema validation is not implemented by this worker".to_string()
        }
    };

    match cli.save.as_ref().or(cli.output_file.as_ref()) {
        Some(path) => std::fs::write(path, &rendered)?,
        None => Term::stdout().write_line(&rendered)?,
    }

    if !output.failures.is_empty() {
        for (input, error) in &output.failures {
            tracing::warn!(input = %input, error = %error, "input failed");
        }
    }

    Ok(())
}

fn collector_for(cli: &Cli) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish()
}
