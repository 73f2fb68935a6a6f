//! # Object Storage
//!
//! ## Visão Geral
//! Abstração mínima sobre o armazenamento de objetos usado na entrada e na saída.
//! As chaves são sempre relativas à raiz configurada e usam `/` como separador.
//!
//! Backends:
//! - [`LocalStorage`]: diretório no disco (desenvolvimento e testes).
//! - [`S3Storage`]: bucket S3 via `aws-sdk-s3`, com fachada bloqueante.

use crate::errors::EtlError;
use crate::models::AwsCredentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

const DEFAULT_REGION: &str = "us-west-2";

// Limite do DeleteObjects por requisição.
const DELETE_BATCH_SIZE: usize = 1000;

/// Operações de armazenamento exigidas pelo pipeline.
pub trait Storage {
    /// Descrição legível da raiz (para logs).
    fn describe(&self) -> String;

    /// Lista recursivamente todas as chaves sob `prefix`, em ordem lexicográfica.
    /// Um prefixo inexistente resulta em lista vazia.
    fn list(&self, prefix: &str) -> Result<Vec<String>, EtlError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, EtlError>;

    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), EtlError>;

    /// Remove todos os objetos sob `prefix`. Retorna quantos foram removidos.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, EtlError>;
}

/// Raiz de armazenamento resolvida a partir de uma URI da configuração.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
}

impl Location {
    /// Interpreta `s3://`, `s3a://`, `s3n://`, `file://` ou um caminho local simples.
    pub fn parse(uri: &str) -> Result<Self, EtlError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(EtlError::Config("raiz de armazenamento vazia".to_string()));
        }

        for scheme in ["s3://", "s3a://", "s3n://"] {
            if let Some(rest) = uri.strip_prefix(scheme) {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(EtlError::Config(format!("URI sem bucket: '{}'", uri)));
                }
                return Ok(Location::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.trim_matches('/').to_string(),
                });
            }
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(Location::Local(PathBuf::from(path)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::S3 { .. })
    }

    /// Abre o backend correspondente. Credenciais são exigidas apenas para S3.
    pub fn open(&self, aws: Option<&AwsCredentials>) -> Result<Box<dyn Storage>, EtlError> {
        match self {
            Location::Local(root) => Ok(Box::new(LocalStorage::new(root))),
            Location::S3 { bucket, prefix } => {
                let credentials = aws.ok_or_else(|| {
                    EtlError::Config(format!("credenciais AWS ausentes para o bucket '{}'", bucket))
                })?;
                Ok(Box::new(S3Storage::connect(bucket, prefix, credentials)?))
            }
        }
    }
}

/* ========================================================================== */
/* Local                                                                      */
/* ========================================================================== */

/// Armazenamento em diretório local.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn collect_files(&self, dir: &Path, keys: &mut Vec<String>) -> Result<(), EtlError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_files(&path, keys)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, EtlError> {
        let start = self.resolve(prefix);
        let mut keys = Vec::new();

        if start.is_dir() {
            self.collect_files(&start, &mut keys)?;
        } else if start.is_file() {
            keys.push(prefix.trim_matches('/').to_string());
        }

        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, EtlError> {
        let path = self.resolve(key);
        fs::read(&path).map_err(|e| {
            EtlError::Storage(format!("Falha ao ler '{}': {}", path.display(), e))
        })
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), EtlError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).map_err(|e| {
            EtlError::Storage(format!("Falha ao gravar '{}': {}", path.display(), e))
        })
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, EtlError> {
        let path = self.resolve(prefix);

        if path.is_dir() {
            let removed = self.list(prefix)?.len();
            fs::remove_dir_all(&path)?;
            Ok(removed)
        } else if path.is_file() {
            fs::remove_file(&path)?;
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

/* ========================================================================== */
/* S3                                                                         */
/* ========================================================================== */

/// Armazenamento em bucket S3.
///
/// O SDK é assíncrono; cada operação é executada até o fim em um runtime
/// `current_thread` privado, mantendo o restante do pipeline síncrono.
pub struct S3Storage {
    client: Client,
    runtime: Runtime,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub fn connect(bucket: &str, prefix: &str, aws: &AwsCredentials) -> Result<Self, EtlError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let region = aws.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string());
        let credentials = Credentials::new(
            aws.access_key_id.clone(),
            aws.secret_access_key.clone(),
            None,
            None,
            "sparkify-config",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &aws.endpoint_url {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn relative_key<'a>(&self, full: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            full
        } else {
            full.strip_prefix(&self.prefix)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(full)
        }
    }
}

/// Agrupa chaves completas em requisições DeleteObjects de até 1000 objetos.
fn delete_batches(full_keys: &[String]) -> Result<Vec<Delete>, EtlError> {
    full_keys
        .chunks(DELETE_BATCH_SIZE)
        .map(|batch| {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| sdk_error("Requisição inválida para", &batch[0], e))?;

            Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| sdk_error("Requisição inválida para", &batch[0], e))
        })
        .collect()
}

fn sdk_error<E: std::error::Error>(operation: &str, key: &str, err: E) -> EtlError {
    EtlError::Storage(format!(
        "{} '{}': {}",
        operation,
        key,
        DisplayErrorContext(err)
    ))
}

impl Storage for S3Storage {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, EtlError> {
        let mut full_prefix = self.full_key(prefix);
        if !full_prefix.is_empty() && !full_prefix.ends_with('/') {
            full_prefix.push('/');
        }

        let mut keys = self.runtime.block_on(async {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .into_paginator()
                .send();

            let mut keys = Vec::new();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| sdk_error("Falha ao listar", &full_prefix, e))?;
                for object in page.contents() {
                    if let Some(key) = object.key() {
                        keys.push(self.relative_key(key).to_string());
                    }
                }
            }
            Ok::<_, EtlError>(keys)
        })?;

        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, EtlError> {
        let full_key = self.full_key(key);

        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .send()
                .await
                .map_err(|e| sdk_error("Falha ao baixar", &full_key, e))?;

            let body = output
                .body
                .collect()
                .await
                .map_err(|e| sdk_error("Falha ao ler corpo de", &full_key, e))?;

            Ok::<_, EtlError>(body.into_bytes().to_vec())
        })
    }

    fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), EtlError> {
        let full_key = self.full_key(key);

        self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&full_key)
                .body(ByteStream::from(bytes))
                .send()
                .await
                .map_err(|e| sdk_error("Falha ao enviar", &full_key, e))?;
            Ok::<_, EtlError>(())
        })
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, EtlError> {
        let keys = self.list(prefix)?;

        let full_keys: Vec<String> = keys.iter().map(|key| self.full_key(key)).collect();

        for delete in delete_batches(&full_keys)? {
            let output = self
                .runtime
                .block_on(
                    self.client
                        .delete_objects()
                        .bucket(&self.bucket)
                        .delete(delete)
                        .send(),
                )
                .map_err(|e| sdk_error("Falha ao remover", prefix, e))?;

            if let Some(failed) = output.errors().first() {
                return Err(EtlError::Storage(format!(
                    "Falha ao remover '{}': {} ({} erro(s) no lote)",
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or_default(),
                    output.errors().len()
                )));
            }
        }

        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s3_uris() {
        assert_eq!(
            Location::parse("s3a://udacity-dend/").unwrap(),
            Location::S3 {
                bucket: "udacity-dend".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            Location::parse("s3://bucket/lake/tables/").unwrap(),
            Location::S3 {
                bucket: "bucket".to_string(),
                prefix: "lake/tables".to_string()
            }
        );
        assert!(Location::parse("s3n://bucket").unwrap().is_remote());
    }

    #[test]
    fn parses_local_paths() {
        assert_eq!(
            Location::parse("file:///tmp/lake").unwrap(),
            Location::Local(PathBuf::from("/tmp/lake"))
        );
        assert_eq!(
            Location::parse("data/out").unwrap(),
            Location::Local(PathBuf::from("data/out"))
        );
    }

    #[test]
    fn rejects_bucketless_and_empty_uris() {
        assert!(Location::parse("s3a:///prefix").is_err());
        assert!(Location::parse("  ").is_err());
    }

    #[test]
    fn delete_batches_respect_request_limit() {
        let keys: Vec<String> = (0..2500)
            .map(|i| format!("lake/songs/year=2000/part-{:05}.parquet", i))
            .collect();

        let batches = delete_batches(&keys).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|d| d.objects().len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(batches[2].objects()[0].key(), "lake/songs/year=2000/part-02000.parquet");

        assert!(delete_batches(&[]).unwrap().is_empty());
    }

    #[test]
    fn local_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.put("songs/year=2018/part-0.parquet", b"a".to_vec()).unwrap();
        storage.put("songs/_SUCCESS", Vec::new()).unwrap();
        storage.put("songs_backup/x", b"b".to_vec()).unwrap();

        assert_eq!(
            storage.list("songs").unwrap(),
            vec!["songs/_SUCCESS", "songs/year=2018/part-0.parquet"]
        );
        assert_eq!(storage.get("songs/year=2018/part-0.parquet").unwrap(), b"a");

        assert_eq!(storage.delete_prefix("songs").unwrap(), 2);
        assert!(storage.list("songs").unwrap().is_empty());
        assert_eq!(storage.list("songs_backup").unwrap(), vec!["songs_backup/x"]);
    }

    #[test]
    fn missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(storage.list("log_data").unwrap().is_empty());
        assert_eq!(storage.delete_prefix("log_data").unwrap(), 0);
        assert!(storage.get("log_data/x.json").is_err());
    }
}
