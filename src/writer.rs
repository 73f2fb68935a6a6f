//! # Escrita Parquet Particionada
//!
//! ## Engenharia de Dados
//! Grava cada tabela como um diretório de arquivos Parquet, com sobrescrita total
//! do conteúdo anterior. Tabelas particionadas seguem a convenção Hive
//! (`coluna=valor/`), e as colunas de partição ficam apenas no caminho.

use crate::errors::EtlError;
use crate::storage::Storage;
use polars::prelude::*;
use tracing::{debug, info};

/// Valor de partição usado para nulos e strings vazias.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Marcador gravado ao final de cada tabela concluída.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Resumo da gravação de uma tabela.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub table: String,
    pub rows: usize,
    pub files: usize,
}

/// Grava tabelas sob a raiz de saída.
pub struct TableWriter<'a> {
    storage: &'a dyn Storage,
    run_id: String,
}

impl<'a> TableWriter<'a> {
    pub fn new(storage: &'a dyn Storage, run_id: &str) -> Self {
        Self {
            storage,
            run_id: run_id.to_string(),
        }
    }

    /// Sobrescreve a tabela `table` com o conteúdo de `dataframe`.
    ///
    /// Sem colunas de partição, gera um único arquivo. Com colunas, gera um arquivo
    /// por combinação de valores, na ordem das colunas informadas.
    pub fn write_table(
        &self,
        table: &str,
        dataframe: &DataFrame,
        partition_by: &[&str],
    ) -> Result<WriteSummary, EtlError> {
        let removed = self.storage.delete_prefix(table)?;
        if removed > 0 {
            debug!("{}: {} objetos anteriores removidos", table, removed);
        }

        let mut files = 0;

        if partition_by.is_empty() {
            let key = format!("{}/{}", table, self.file_name(0));
            self.storage.put(&key, encode_parquet(&mut dataframe.clone())?)?;
            files += 1;
        } else {
            let data_columns: Vec<&str> = dataframe
                .get_column_names_str()
                .into_iter()
                .filter(|name| !partition_by.contains(name))
                .collect();

            for part in dataframe.partition_by_stable(partition_by.iter().copied(), true)? {
                if part.height() == 0 {
                    continue;
                }
                let directory = partition_path(&part, partition_by)?;
                let mut contents = part.select(data_columns.iter().copied())?;

                let key = format!("{}/{}/{}", table, directory, self.file_name(files));
                self.storage.put(&key, encode_parquet(&mut contents)?)?;
                files += 1;
            }
        }

        self.storage
            .put(&format!("{}/{}", table, SUCCESS_MARKER), Vec::new())?;

        info!(
            "Tabela '{}' gravada: {} linhas em {} arquivo(s)",
            table,
            dataframe.height(),
            files
        );

        Ok(WriteSummary {
            table: table.to_string(),
            rows: dataframe.height(),
            files,
        })
    }

    fn file_name(&self, index: usize) -> String {
        format!("part-{:05}-{}.snappy.parquet", index, self.run_id)
    }
}

/// Serializa o DataFrame em Parquet (Snappy, com estatísticas de min/max/nulos).
pub fn encode_parquet(dataframe: &mut DataFrame) -> Result<Vec<u8>, EtlError> {
    let mut buffer = Vec::new();

    let stats_options = StatisticsOptions {
        min_value: true,
        max_value: true,
        null_count: true,
        distinct_count: false,
    };

    ParquetWriter::new(&mut buffer)
        .with_compression(ParquetCompression::Snappy)
        .with_statistics(stats_options)
        .finish(dataframe)?;

    Ok(buffer)
}

/// Monta `col1=v1/col2=v2` a partir da primeira linha de uma partição.
fn partition_path(part: &DataFrame, partition_by: &[&str]) -> Result<String, EtlError> {
    let mut segments = Vec::with_capacity(partition_by.len());

    for name in partition_by {
        let value = part.column(name)?.get(0)?;
        segments.push(format!("{}={}", name, partition_value(&value)));
    }

    Ok(segments.join("/"))
}

fn partition_value(value: &AnyValue<'_>) -> String {
    let raw = match value {
        AnyValue::Null => return HIVE_DEFAULT_PARTITION.to_string(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => other.to_string(),
    };

    if raw.is_empty() {
        HIVE_DEFAULT_PARTITION.to_string()
    } else {
        escape_path_value(&raw)
    }
}

/// Escapa caracteres que não podem aparecer em um segmento de partição.
pub fn escape_path_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for ch in value.chars() {
        if ch.is_control() || matches!(ch, '/' | '\\' | '=' | '%' | ':' | '?' | '#' | '"' | '\'' | '*' | '[' | ']' | '{' | '^') {
            let mut utf8 = [0u8; 4];
            for byte in ch.encode_utf8(&mut utf8).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(ch);
        }
    }

    escaped
}
