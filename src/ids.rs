//! Gerador de identificadores monotônicos para a tabela fato.
//!
//! Cada id combina o índice da partição lógica (bits altos) com a posição da
//! linha dentro da partição (33 bits baixos). Os valores crescem estritamente na
//! ordem de geração, mas não são contíguos entre partições nem estáveis entre execuções.

use crate::errors::EtlError;
use polars::prelude::*;

/// Bits reservados para a sequência dentro de cada partição.
pub const PARTITION_SHIFT: u32 = 33;

/// Maior partição lógica aceita (a sequência precisa caber em 33 bits).
pub const MAX_ROWS_PER_PARTITION: u64 = 1 << PARTITION_SHIFT;

// 63 bits úteis em um i64 positivo.
const MAX_PARTITIONS: u64 = 1 << (63 - PARTITION_SHIFT);

#[derive(Debug, Clone, Copy)]
pub struct MonotonicIds {
    rows_per_partition: u64,
}

impl MonotonicIds {
    pub fn new(rows_per_partition: u64) -> Result<Self, EtlError> {
        if rows_per_partition == 0 || rows_per_partition > MAX_ROWS_PER_PARTITION {
            return Err(EtlError::Config(format!(
                "partição de ids inválida: {} linhas",
                rows_per_partition
            )));
        }
        Ok(Self { rows_per_partition })
    }

    /// Id da linha na posição `position` da ordem de geração.
    pub fn id_at(&self, position: u64) -> i64 {
        let partition = position / self.rows_per_partition;
        let sequence = position % self.rows_per_partition;
        ((partition << PARTITION_SHIFT) | sequence) as i64
    }

    /// Gera uma coluna `Int64` com `len` ids consecutivos na ordem de geração.
    pub fn column(&self, name: &str, len: usize) -> Result<Column, EtlError> {
        let partitions = (len as u64).div_ceil(self.rows_per_partition);
        if partitions > MAX_PARTITIONS {
            return Err(EtlError::Schema(format!(
                "{} linhas excedem a capacidade do gerador de ids",
                len
            )));
        }

        let ids: Vec<i64> = (0..len as u64).map(|position| self.id_at(position)).collect();
        Ok(Column::new(name.into(), ids))
    }
}
