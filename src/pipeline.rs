//! # Orquestração do ETL
//!
//! ## Visão Geral
//! Dois pipelines independentes executados em sequência:
//! - **Músicas**: `song_data` → `songs`, `artists`.
//! - **Logs**: `log_data` (+ releitura de `song_data`) → `users`, `time`, `songplays`.
//!
//! ## Semântica de Falha
//! Qualquer erro aborta a execução na primeira falha. Tabelas gravadas antes
//! do erro permanecem no destino; não há transação entre tabelas.

use crate::errors::EtlError;
use crate::ids::MonotonicIds;
use crate::models::{Config, PipelineConfig};
use crate::reader;
use crate::storage::{Location, Storage};
use crate::transform;
use crate::writer::{TableWriter, WriteSummary};
use polars::prelude::*;
use std::time::Instant;
use tracing::info;

pub const SONGS_TABLE: &str = "songs";
pub const ARTISTS_TABLE: &str = "artists";
pub const USERS_TABLE: &str = "users";
pub const TIME_TABLE: &str = "time";
pub const SONGPLAYS_TABLE: &str = "songplays";

/// Contexto compartilhado pelos dois pipelines.
pub struct Pipeline {
    input: Box<dyn Storage>,
    output: Box<dyn Storage>,
    ids: MonotonicIds,
    run_id: String,
}

impl Pipeline {
    pub fn new(
        input: Box<dyn Storage>,
        output: Box<dyn Storage>,
        settings: &PipelineConfig,
    ) -> Result<Self, EtlError> {
        Ok(Self {
            input,
            output,
            ids: MonotonicIds::new(settings.songplay_id_partition_rows)?,
            run_id: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Abre os storages de entrada e saída descritos na configuração.
    pub fn from_config(config: &Config) -> Result<Self, EtlError> {
        let aws = config.aws.as_ref();
        let input = Location::parse(&config.paths.input_data)?.open(aws)?;
        let output = Location::parse(&config.paths.output_data)?.open(aws)?;

        Self::new(input, output, &config.pipeline)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Executa o pipeline de músicas e depois o de logs.
    pub fn run(&self) -> Result<Vec<WriteSummary>, EtlError> {
        info!(
            "Execução {}: {} -> {}",
            self.run_id,
            self.input.describe(),
            self.output.describe()
        );

        let mut summaries = self.process_song_data()?;
        summaries.extend(self.process_log_data()?);
        Ok(summaries)
    }

    /// `song_data` → `songs` (particionada por ano e artista) e `artists`.
    pub fn process_song_data(&self) -> Result<Vec<WriteSummary>, EtlError> {
        let step_timer = Instant::now();
        let writer = TableWriter::new(self.output.as_ref(), &self.run_id);

        let songs = reader::load_songs(self.input.as_ref())?;

        let songs_table = transform::songs_table(songs.clone().lazy()).collect()?;
        let songs_summary = writer.write_table(SONGS_TABLE, &songs_table, &transform::YEAR_ARTIST)?;

        let artists_table = transform::artists_table(songs.lazy()).collect()?;
        let artists_summary = writer.write_table(ARTISTS_TABLE, &artists_table, &[])?;

        info!("Pipeline de músicas concluído ({:.2?})", step_timer.elapsed());

        Ok(vec![songs_summary, artists_summary])
    }

    /// `log_data` → `users`, `time` e `songplays`.
    pub fn process_log_data(&self) -> Result<Vec<WriteSummary>, EtlError> {
        let step_timer = Instant::now();
        let writer = TableWriter::new(self.output.as_ref(), &self.run_id);

        let logs = reader::load_logs(self.input.as_ref())?;
        let plays = transform::play_events(logs.lazy()).collect()?;
        info!("{} eventos NextSong", plays.height());

        let users_table = transform::users_table(plays.clone().lazy()).collect()?;
        let users_summary = writer.write_table(USERS_TABLE, &users_table, &[])?;

        let plays = transform::with_start_time(plays.lazy()).collect()?;

        let time_table = transform::time_table(plays.clone().lazy()).collect()?;
        let time_summary = writer.write_table(TIME_TABLE, &time_table, &transform::YEAR_MONTH)?;

        // Os metadados de músicas são relidos do storage de entrada
        let songs = reader::load_songs(self.input.as_ref())?;
        let songplays = transform::songplays_table(plays.lazy(), songs.lazy()).collect()?;
        let songplays = self.assign_songplay_ids(songplays)?;
        let songplays_summary =
            writer.write_table(SONGPLAYS_TABLE, &songplays, &transform::YEAR_MONTH)?;

        info!("Pipeline de logs concluído ({:.2?})", step_timer.elapsed());

        Ok(vec![users_summary, time_summary, songplays_summary])
    }

    /// Insere `songplay_id` como primeira coluna, na ordem atual das linhas.
    fn assign_songplay_ids(&self, mut songplays: DataFrame) -> Result<DataFrame, EtlError> {
        let ids = self.ids.column("songplay_id", songplays.height())?;
        songplays.with_column(ids)?;

        let mut order = vec!["songplay_id"];
        order.extend(
            songplays
                .get_column_names_str()
                .into_iter()
                .filter(|name| *name != "songplay_id"),
        );

        Ok(songplays.select(order)?)
    }
}
