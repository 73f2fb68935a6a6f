//! # Sparkify Data Lake ETL
//!
//! Lê registros JSON de músicas e eventos de log do object storage, monta um
//! modelo estrela (uma tabela fato e quatro dimensões) com Polars e grava o
//! resultado como Parquet particionado.

pub mod errors;
pub mod ids;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod storage;
pub mod transform;
pub mod writer;
