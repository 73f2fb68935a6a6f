//! Modelos de Configuração do ETL
//!
//! ## Visão Geral
//! Este módulo define as estruturas lidas do arquivo TOML (`dl.toml`).
//! As credenciais AWS ficam na seção `[AWS]` e são entregues ao storage como
//! um objeto de configuração; nenhuma variável de ambiente do processo é alterada.
//!
//! ## Boas Práticas
//! - **Encapsulamento**: Validações de integridade ocorrem no momento da carga.
//! - **Defaults**: `[paths]` e `[pipeline]` são opcionais e assumem os valores de produção.

use crate::errors::EtlError;
use crate::ids::MAX_ROWS_PER_PARTITION;
use crate::storage::Location;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Caminho padrão do arquivo de configuração.
pub const DEFAULT_CONFIG_PATH: &str = "dl.toml";

/// Raiz de entrada padrão (dados brutos de músicas e logs).
pub const DEFAULT_INPUT_DATA: &str = "s3a://udacity-dend/";

/// Raiz de saída padrão (tabelas Parquet).
pub const DEFAULT_OUTPUT_DATA: &str = "s3a://sparkify-table-bucket/";

pub const DEFAULT_ID_PARTITION_ROWS: u64 = 1_000_000;

/// Configuração completa do job.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Credenciais do object storage. Obrigatórias apenas quando alguma raiz é S3.
    #[serde(rename = "AWS")]
    pub aws: Option<AwsCredentials>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Par de credenciais (access key id, secret key) e destino opcional do S3.
#[derive(Deserialize, Clone)]
pub struct AwsCredentials {
    #[serde(rename = "AWS_ACCESS_KEY_ID")]
    pub access_key_id: String,

    #[serde(rename = "AWS_SECRET_ACCESS_KEY")]
    pub secret_access_key: String,

    /// Região do bucket. Sem valor, usa `us-west-2`.
    pub region: Option<String>,

    /// Endpoint alternativo (MinIO, localstack). Ativa path-style.
    pub endpoint_url: Option<String>,
}

// Nunca expor o segredo em logs.
impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Raízes de entrada e saída (URI `s3a://bucket/prefixo` ou diretório local).
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_input_data")]
    pub input_data: String,

    #[serde(default = "default_output_data")]
    pub output_data: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_data: default_input_data(),
            output_data: default_output_data(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Tamanho de cada partição lógica do gerador de `songplay_id`.
    #[serde(default = "default_id_partition_rows")]
    pub songplay_id_partition_rows: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            songplay_id_partition_rows: default_id_partition_rows(),
        }
    }
}

fn default_input_data() -> String {
    DEFAULT_INPUT_DATA.to_string()
}

fn default_output_data() -> String {
    DEFAULT_OUTPUT_DATA.to_string()
}

fn default_id_partition_rows() -> u64 {
    DEFAULT_ID_PARTITION_ROWS
}

impl Config {
    /// Carrega e valida o arquivo de configuração TOML.
    ///
    /// # Erros
    /// Retorna `EtlError::Io` se o arquivo não for encontrado ou
    /// `EtlError::Config` se a estrutura for inválida.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EtlError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Falha ao abrir o arquivo de configuração '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    /// Faz o parse de um documento TOML e valida o resultado.
    pub fn from_toml_str(content: &str) -> Result<Self, EtlError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("Erro no TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Substitui as raízes configuradas (ex: argumentos de linha de comando) e revalida.
    pub fn override_paths(
        &mut self,
        input_data: Option<String>,
        output_data: Option<String>,
    ) -> Result<(), EtlError> {
        if let Some(input) = input_data {
            self.paths.input_data = input;
        }
        if let Some(output) = output_data {
            self.paths.output_data = output;
        }
        self.validate()
    }

    /// Validação pós-carga (Fail-Fast).
    pub fn validate(&self) -> Result<(), EtlError> {
        let input = Location::parse(&self.paths.input_data)?;
        let output = Location::parse(&self.paths.output_data)?;

        if input.is_remote() || output.is_remote() {
            let aws = self.aws.as_ref().ok_or_else(|| {
                EtlError::Config("seção [AWS] obrigatória para raízes S3".to_string())
            })?;

            if aws.access_key_id.trim().is_empty() || aws.secret_access_key.trim().is_empty() {
                return Err(EtlError::Config(
                    "AWS_ACCESS_KEY_ID e AWS_SECRET_ACCESS_KEY não podem ser vazios".to_string(),
                ));
            }
        }

        let rows = self.pipeline.songplay_id_partition_rows;
        if rows == 0 || rows > MAX_ROWS_PER_PARTITION {
            return Err(EtlError::Config(format!(
                "songplay_id_partition_rows deve estar entre 1 e {} (recebido {})",
                MAX_ROWS_PER_PARTITION, rows
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml_str(
            r#"
            [AWS]
            AWS_ACCESS_KEY_ID = "AKIAEXAMPLE"
            AWS_SECRET_ACCESS_KEY = "secret"
            region = "us-east-1"

            [paths]
            input_data = "s3a://udacity-dend/"
            output_data = "/tmp/sparkify"

            [pipeline]
            songplay_id_partition_rows = 500
            "#,
        )
        .unwrap();

        let aws = config.aws.as_ref().unwrap();
        assert_eq!(aws.access_key_id, "AKIAEXAMPLE");
        assert_eq!(aws.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.paths.output_data, "/tmp/sparkify");
        assert_eq!(config.pipeline.songplay_id_partition_rows, 500);
    }

    #[test]
    fn defaults_point_to_production_buckets() {
        let config = Config::from_toml_str(
            r#"
            [AWS]
            AWS_ACCESS_KEY_ID = "id"
            AWS_SECRET_ACCESS_KEY = "key"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.input_data, DEFAULT_INPUT_DATA);
        assert_eq!(config.paths.output_data, DEFAULT_OUTPUT_DATA);
        assert_eq!(
            config.pipeline.songplay_id_partition_rows,
            DEFAULT_ID_PARTITION_ROWS
        );
    }

    #[test]
    fn s3_roots_require_credentials() {
        let err = Config::from_toml_str("[paths]\ninput_data = \"s3://bucket/raw\"\noutput_data = \"out\"")
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn local_roots_need_no_credentials() {
        let config =
            Config::from_toml_str("[paths]\ninput_data = \"data/raw\"\noutput_data = \"data/out\"")
                .unwrap();
        assert!(config.aws.is_none());
    }

    #[test]
    fn rejects_zero_partition_rows() {
        let err = Config::from_toml_str(
            "[paths]\ninput_data = \"in\"\noutput_data = \"out\"\n[pipeline]\nsongplay_id_partition_rows = 0",
        )
        .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn override_paths_revalidates() {
        let mut config = Config::default();
        config
            .override_paths(Some("in".to_string()), Some("out".to_string()))
            .unwrap();
        assert_eq!(config.paths.input_data, "in");

        let err = config
            .override_paths(Some("s3a://udacity-dend/".to_string()), None)
            .unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn debug_hides_secret() {
        let aws = AwsCredentials {
            access_key_id: "id".to_string(),
            secret_access_key: "super-secret".to_string(),
            region: None,
            endpoint_url: None,
        };
        assert!(!format!("{:?}", aws).contains("super-secret"));
    }
}
