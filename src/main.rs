//! # Sparkify ETL
//!
//! ## Visão Geral
//! Executa os pipelines de músicas e de logs em sequência, lendo a configuração
//! de `dl.toml` (ou do caminho informado).
//!
//! ## Princípios de Engenharia
//! - **Fail-Fast**: A primeira falha aborta a execução com código de saída 1.
//! - **Observabilidade**: Logs estruturados com tempos de execução por etapa.

use clap::Parser;
use sparkify_etl::errors::EtlError;
use sparkify_etl::models::{Config, DEFAULT_CONFIG_PATH};
use sparkify_etl::pipeline::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sparkify-etl")]
#[command(about = "Monta o modelo estrela de reproduções a partir dos JSON brutos")]
struct Args {
    /// Arquivo de configuração TOML (padrão: dl.toml)
    config: Option<PathBuf>,

    /// Substitui `paths.input_data`
    #[arg(long)]
    input_data: Option<String>,

    /// Substitui `paths.output_data`
    #[arg(long)]
    output_data: Option<String>,

    /// Nível de log quando RUST_LOG não está definido
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Execução abortada: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), EtlError> {
    let global_timer = Instant::now();

    info!("--- INICIANDO ETL PIPELINE ---");

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None if PathBuf::from(DEFAULT_CONFIG_PATH).exists() => {
            Config::load_from_file(DEFAULT_CONFIG_PATH)?
        }
        None => {
            warn!("'{}' não encontrado, usando configuração padrão", DEFAULT_CONFIG_PATH);
            Config::default()
        }
    };
    config.override_paths(args.input_data, args.output_data)?;

    let pipeline = Pipeline::from_config(&config)?;
    let summaries = pipeline.run()?;

    info!("==========================================");
    for summary in &summaries {
        info!(
            "{:<10} {:>10} linhas {:>6} arquivo(s)",
            summary.table, summary.rows, summary.files
        );
    }
    info!("Tempo de execução: {:.2?}", global_timer.elapsed());
    info!("==========================================");

    Ok(())
}
