//! # Definição de Erros do Pipeline
//!
//! Este módulo centraliza as falhas possíveis durante extração, transformação e carga.
//!
//! # Error Handling Strategy
//! - **Tipagem:** Enum único para tratamento exaustivo.
//! - **Propagação:** Nenhuma etapa captura ou repete operações; tudo sobe via `?` até o `main`.
//! - **Extensibilidade:** Marcado como `non_exhaustive` para permitir evolução sem quebra de contrato.

use thiserror::Error;

/// Enumeração central de falhas do ETL.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EtlError {
    /// Falhas no sistema de arquivos (permissão, disco cheio, arquivo inexistente).
    #[error("[I/O] {0}")]
    Io(#[from] std::io::Error),

    #[error("[JSON] {0}")]
    Json(#[from] serde_json::Error),

    /// Erros originados na engine de DataFrames (inferência, join, escrita Parquet).
    #[error("[Polars] {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Falhas do object storage (S3 ou diretório local).
    /// Armazenadas como `String` para não acoplar o enum ao SDK.
    #[error("[Storage] {0}")]
    Storage(String),

    /// Arquivo de configuração inválido ou incompleto.
    #[error("[Config] {0}")]
    Config(String),

    /// Inconsistência de formato nos dados (ex: coluna obrigatória ausente).
    #[error("[Schema] {0}")]
    Schema(String),

    /// O padrão de entrada não encontrou nenhum objeto.
    #[error("[Input] nenhum objeto encontrado para o padrão '{0}'")]
    NoInput(String),
}
