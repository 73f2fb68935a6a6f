//! # Leitura dos Dados Brutos
//!
//! ## Visão Geral
//! Localiza os objetos JSON de entrada por padrão de chave, normaliza cada objeto
//! em JSON Lines e carrega tudo em um único `DataFrame` com schema inferido pelo Polars.
//! Em seguida as colunas conhecidas são convertidas para os tipos esperados.
//!
//! ## Formatos aceitos por objeto
//! - Um documento JSON por arquivo (dados de músicas).
//! - JSON Lines (logs de eventos).
//! - Um array JSON de registros.
//!
//! Documentos malformados são descartados com aviso, nunca interrompem a carga.

use crate::errors::EtlError;
use crate::storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use polars::io::SerReader;
use polars::prelude::*;
use regex::Regex;
use serde_json::Value;
use std::io::Cursor;
use tracing::{debug, info, warn};

/// Metadados de músicas: três níveis de diretório.
pub const SONG_DATA_PATTERN: &str = "song_data/*/*/*/*.json";

/// Logs de eventos: dois níveis de diretório.
pub const LOG_DATA_PATTERN: &str = "log_data/*/*/*.json";

/// Colunas obrigatórias dos registros de músicas e seus tipos.
pub fn song_columns() -> Vec<(&'static str, DataType)> {
    vec![
        ("song_id", DataType::String),
        ("title", DataType::String),
        ("artist_id", DataType::String),
        ("year", DataType::Int64),
        ("duration", DataType::Float64),
        ("artist_name", DataType::String),
        ("artist_location", DataType::String),
        ("artist_latitude", DataType::Float64),
        ("artist_longitude", DataType::Float64),
    ]
}

/// Colunas obrigatórias dos eventos de log e seus tipos.
pub fn log_columns() -> Vec<(&'static str, DataType)> {
    vec![
        ("userId", DataType::String),
        ("firstName", DataType::String),
        ("lastName", DataType::String),
        ("gender", DataType::String),
        ("level", DataType::String),
        ("page", DataType::String),
        ("ts", DataType::Int64),
        ("song", DataType::String),
        ("artist", DataType::String),
        ("length", DataType::Float64),
        ("sessionId", DataType::Int64),
        ("location", DataType::String),
        ("userAgent", DataType::String),
    ]
}

/// Padrão de chave no estilo glob, onde `*` casa exatamente um segmento.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    prefix: String,
    regex: Regex,
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, EtlError> {
        let segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();

        // Prefixo fixo: segmentos antes do primeiro curinga, usado para listar.
        let prefix = segments
            .iter()
            .take_while(|s| !s.contains(['*', '?']))
            .copied()
            .collect::<Vec<_>>()
            .join("/");

        let body = segments
            .iter()
            .map(|segment| {
                segment
                    .split_inclusive(['*', '?'])
                    .map(|piece| match piece.char_indices().last() {
                        Some((i, '*')) => format!("{}[^/]*", regex::escape(&piece[..i])),
                        Some((i, '?')) => format!("{}[^/]", regex::escape(&piece[..i])),
                        _ => regex::escape(piece),
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("/");

        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| EtlError::Config(format!("padrão inválido '{}': {}", pattern, e)))?;

        Ok(Self { prefix, regex })
    }

    /// Parte fixa do padrão (diretório a listar).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// Resultado da normalização de um objeto bruto.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub records: usize,
    pub skipped: usize,
}

/// Anexa ao buffer JSON Lines todos os registros (objetos) contidos em `bytes`.
///
/// Valores que não são objetos são ignorados. Se o objeto bruto tiver erro de
/// sintaxe, ele é relido linha a linha e apenas as linhas inválidas são descartadas.
pub fn append_records(bytes: &[u8], buffer: &mut Vec<u8>) -> Result<DocumentStats, EtlError> {
    let mut staged = Vec::new();
    let mut stats = DocumentStats::default();

    for document in serde_json::Deserializer::from_slice(bytes).into_iter::<Value>() {
        match document {
            Ok(value) => push_value(value, &mut staged, &mut stats)?,
            Err(e) => {
                debug!("JSON malformado, relendo linha a linha: {}", e);
                return append_lines(bytes, buffer);
            }
        }
    }

    buffer.extend_from_slice(&staged);
    Ok(stats)
}

/// Modo JSON Lines tolerante: cada linha é um documento independente.
fn append_lines(bytes: &[u8], buffer: &mut Vec<u8>) -> Result<DocumentStats, EtlError> {
    let mut stats = DocumentStats::default();

    for line in bytes.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Value>(line) {
            Ok(value) => push_value(value, buffer, &mut stats)?,
            Err(e) => {
                debug!("linha JSON ignorada: {}", e);
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

fn push_value(
    value: Value,
    buffer: &mut Vec<u8>,
    stats: &mut DocumentStats,
) -> Result<(), EtlError> {
    match value {
        Value::Object(record) => {
            serde_json::to_writer(&mut *buffer, &record)?;
            buffer.push(b'\n');
            stats.records += 1;
        }
        Value::Array(items) => {
            for item in items {
                if let Value::Object(record) = item {
                    serde_json::to_writer(&mut *buffer, &record)?;
                    buffer.push(b'\n');
                    stats.records += 1;
                } else {
                    stats.skipped += 1;
                }
            }
        }
        _ => stats.skipped += 1,
    }
    Ok(())
}

/// Carrega todos os objetos que casam com `pattern` em um único `DataFrame`.
///
/// # Errors
///
/// * `EtlError::NoInput` se nenhum objeto casar com o padrão.
/// * `EtlError::Schema` se nenhum registro válido for encontrado.
/// * Erros de storage ou do Polars durante a leitura.
pub fn load_json_records(storage: &dyn Storage, pattern: &str) -> Result<DataFrame, EtlError> {
    let key_pattern = KeyPattern::new(pattern)?;

    let keys: Vec<String> = storage
        .list(key_pattern.prefix())?
        .into_iter()
        .filter(|key| key_pattern.matches(key))
        .collect();

    if keys.is_empty() {
        return Err(EtlError::NoInput(format!(
            "{}/{}",
            storage.describe(),
            pattern
        )));
    }

    info!("Lendo {} objetos de {}/{}", keys.len(), storage.describe(), pattern);

    let pb = ProgressBar::new(keys.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(pattern.to_string());

    let mut json_lines = Vec::new();
    let mut total = DocumentStats::default();

    for key in &keys {
        let bytes = storage.get(key)?;
        let stats = append_records(&bytes, &mut json_lines)?;

        if stats.skipped > 0 {
            warn!("{} documento(s) inválido(s) ignorado(s) em '{}'", stats.skipped, key);
        }

        total.records += stats.records;
        total.skipped += stats.skipped;
        pb.inc(1);
    }

    pb.finish_with_message(format!("{} registros", total.records));

    if total.records == 0 {
        return Err(EtlError::Schema(format!(
            "nenhum registro JSON válido em '{}'",
            pattern
        )));
    }

    let dataframe = JsonReader::new(Cursor::new(json_lines))
        .with_json_format(JsonFormat::JsonLines)
        // None = infere o schema a partir de todos os registros
        .infer_schema_len(None)
        .finish()?;

    info!(
        "{} registros carregados ({} ignorados), {} colunas",
        dataframe.height(),
        total.skipped,
        dataframe.width()
    );

    Ok(dataframe)
}

/// Garante a presença das colunas obrigatórias e converte cada uma para o tipo esperado.
///
/// Colunas extras são preservadas sem alteração.
pub fn conform(
    dataframe: DataFrame,
    columns: &[(&'static str, DataType)],
) -> Result<DataFrame, EtlError> {
    let missing: Vec<&str> = columns
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| dataframe.column(name).is_err())
        .collect();

    if !missing.is_empty() {
        return Err(EtlError::Schema(format!(
            "colunas obrigatórias ausentes: {}",
            missing.join(", ")
        )));
    }

    let casts: Vec<Expr> = columns
        .iter()
        .map(|(name, dtype)| col(*name).cast(dtype.clone()))
        .collect();

    Ok(dataframe.lazy().with_columns(casts).collect()?)
}

/// Lê e conforma os registros de músicas.
pub fn load_songs(storage: &dyn Storage) -> Result<DataFrame, EtlError> {
    let raw = load_json_records(storage, SONG_DATA_PATTERN)?;
    conform(raw, &song_columns())
}

/// Lê e conforma os eventos de log.
pub fn load_logs(storage: &dyn Storage) -> Result<DataFrame, EtlError> {
    let raw = load_json_records(storage, LOG_DATA_PATTERN)?;
    conform(raw, &log_columns())
}
