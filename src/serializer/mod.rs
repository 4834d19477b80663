//! Serializer Module
//!
//! Moves a [`Mapping`] between memory and the backing file.
//!
//! ## Variants
//! ```text
//! ┌─────────────────────┬──────────────────────┬────────────┐
//! │ Kind                │ Key comparison       │ Encryption │
//! ├─────────────────────┼──────────────────────┼────────────┤
//! │ Plain               │ ordinal              │ none       │
//! │ IgnoreCase          │ ordinal ignore-case  │ none       │
//! │ Encrypted           │ ordinal              │ AES-GCM    │
//! │ EncryptedIgnoreCase │ ordinal ignore-case  │ AES-GCM    │
//! └─────────────────────┴──────────────────────┴────────────┘
//! ```
//! One `Serializer` type covers all four; the variant is fixed when it is
//! built from a [`Config`].
//!
//! ## Write Path
//! mapping → codec (rented buffer) → [cipher] → `<path>.tmp` → rename → `<path>`

mod file;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::buffer::BufferPool;
use crate::cancel::CancellationToken;
use crate::codec;
use crate::config::Config;
use crate::crypto::{self, Cipher};
use crate::error::Result;
use crate::mapping::{KeyComparison, Mapping};

use self::file::{read_into, read_into_async, replace_file, sync_parent, temp_path, READ_SLACK};

/// Which of the four serializer variants is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerKind {
    Plain,
    IgnoreCase,
    Encrypted,
    EncryptedIgnoreCase,
}

impl SerializerKind {
    pub fn is_encrypted(self) -> bool {
        matches!(self, SerializerKind::Encrypted | SerializerKind::EncryptedIgnoreCase)
    }

    pub fn comparison(self) -> KeyComparison {
        match self {
            SerializerKind::Plain | SerializerKind::Encrypted => KeyComparison::Ordinal,
            SerializerKind::IgnoreCase | SerializerKind::EncryptedIgnoreCase => {
                KeyComparison::OrdinalIgnoreCase
            }
        }
    }
}

/// Reads and writes the backing file for one store
#[derive(Debug)]
pub struct Serializer {
    path: PathBuf,
    tmp_path: PathBuf,
    comparison: KeyComparison,
    cipher: Option<Cipher>,
    sync_writes: bool,
    pool: &'static BufferPool,
}

impl Serializer {
    /// Build the serializer a config asks for.
    ///
    /// Inconsistent encryption settings fail here, before any I/O.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let cipher = match (config.has_encryption, config.encryption_key.as_deref()) {
            (true, Some(secret)) => Some(Cipher::from_secret(secret)?),
            _ => None,
        };

        Ok(Self::new(
            &config.path,
            KeyComparison::from_ignore_case(config.ignore_case),
            cipher,
            config.sync_writes,
        ))
    }

    pub fn new(
        path: impl Into<PathBuf>,
        comparison: KeyComparison,
        cipher: Option<Cipher>,
        sync_writes: bool,
    ) -> Self {
        let path = path.into();
        Self {
            tmp_path: temp_path(&path),
            path,
            comparison,
            cipher,
            sync_writes,
            pool: BufferPool::shared(),
        }
    }

    pub fn kind(&self) -> SerializerKind {
        match (self.cipher.is_some(), self.comparison) {
            (false, KeyComparison::Ordinal) => SerializerKind::Plain,
            (false, KeyComparison::OrdinalIgnoreCase) => SerializerKind::IgnoreCase,
            (true, KeyComparison::Ordinal) => SerializerKind::Encrypted,
            (true, KeyComparison::OrdinalIgnoreCase) => SerializerKind::EncryptedIgnoreCase,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn comparison(&self) -> KeyComparison {
        self.comparison
    }

    /// Size of the backing file, 0 if it does not exist
    pub fn backing_len(&self) -> Result<usize> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() as usize),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Async twin of [`backing_len`](Self::backing_len)
    pub async fn backing_len_async(&self) -> Result<usize> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len() as usize),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a `<path>.tmp` left behind by an interrupted write
    pub fn remove_stale_temp(&self) {
        if self.tmp_path.exists() {
            tracing::warn!(path = %self.tmp_path.display(), "Removing stale temp file");
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }

    // =========================================================================
    // Serialize
    // =========================================================================

    /// Write `mapping` to the backing file, replacing it atomically.
    ///
    /// `estimated_size` pre-sizes the buffer rental (backing-file bytes,
    /// including any encryption overhead). The rental grows if it is short.
    pub fn serialize(&self, mapping: &Mapping, estimated_size: usize) -> Result<()> {
        let mut plaintext = self.pool.rent(self.plaintext_estimate(estimated_size));
        codec::encode_into(mapping, &mut plaintext)?;

        replace_file(&self.path, &self.tmp_path, self.sync_writes, |file| {
            match &self.cipher {
                Some(cipher) => crypto::encrypt_write(file, plaintext.written(), cipher),
                None => {
                    std::io::Write::write_all(file, plaintext.written())?;
                    Ok(())
                }
            }
        })?;

        tracing::debug!(
            path = %self.path.display(),
            kind = ?self.kind(),
            entries = mapping.len(),
            bytes = plaintext.len(),
            "Serialized mapping"
        );
        Ok(())
    }

    /// Async twin of [`serialize`](Self::serialize).
    ///
    /// Cancellation while the temp file is being written removes it and
    /// leaves the backing file as it was. Once the rename starts the write
    /// is committed.
    pub async fn serialize_async(
        &self,
        mapping: &Mapping,
        estimated_size: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancel.check()?;

        let mut plaintext = self.pool.rent(self.plaintext_estimate(estimated_size));
        codec::encode_into(mapping, &mut plaintext)?;

        let written = cancel.run(self.write_temp_async(plaintext.written())).await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&self.tmp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        if self.sync_writes {
            let path = self.path.clone();
            let _ = tokio::task::spawn_blocking(move || sync_parent(&path)).await;
        }

        tracing::debug!(
            path = %self.path.display(),
            kind = ?self.kind(),
            entries = mapping.len(),
            bytes = plaintext.len(),
            "Serialized mapping (async)"
        );
        Ok(())
    }

    async fn write_temp_async(&self, plaintext: &[u8]) -> Result<()> {
        let raw = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)
            .await?;
        let mut file = tokio::io::BufWriter::new(raw);

        match &self.cipher {
            Some(cipher) => crypto::encrypt_write_async(&mut file, plaintext, cipher).await?,
            None => {
                file.write_all(plaintext).await?;
                file.flush().await?;
            }
        }

        let raw = file.into_inner();
        if self.sync_writes {
            raw.sync_all().await?;
        }
        Ok(())
    }

    // =========================================================================
    // Deserialize
    // =========================================================================

    /// Read the backing file into a mapping.
    ///
    /// A missing or empty file is an empty mapping. `estimated_size` is the
    /// expected file length and only sizes the rental.
    pub fn deserialize(&self, estimated_size: usize) -> Result<Mapping> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Mapping::new(self.comparison));
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = self.pool.rent(self.read_capacity(estimated_size));
        match &self.cipher {
            Some(cipher) => crypto::decrypt_read(BufReader::new(file), cipher, &mut buffer)?,
            None => read_into(file, &mut buffer)?,
        }

        let mapping = codec::decode(buffer.written(), self.comparison)?;
        tracing::debug!(
            path = %self.path.display(),
            kind = ?self.kind(),
            entries = mapping.len(),
            "Deserialized mapping"
        );
        Ok(mapping)
    }

    /// Async twin of [`deserialize`](Self::deserialize)
    pub async fn deserialize_async(
        &self,
        estimated_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Mapping> {
        cancel.check()?;

        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Mapping::new(self.comparison));
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = self.pool.rent(self.read_capacity(estimated_size));
        cancel
            .run(async {
                match &self.cipher {
                    Some(cipher) => {
                        let mut reader = tokio::io::BufReader::new(&mut file);
                        crypto::decrypt_read_async(&mut reader, cipher, &mut buffer).await
                    }
                    None => read_into_async(&mut file, &mut buffer).await,
                }
            })
            .await?;

        let mapping = codec::decode(buffer.written(), self.comparison)?;
        tracing::debug!(
            path = %self.path.display(),
            kind = ?self.kind(),
            entries = mapping.len(),
            "Deserialized mapping (async)"
        );
        Ok(mapping)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Plaintext bytes expected for a backing file of `estimated_size`
    fn plaintext_estimate(&self, estimated_size: usize) -> usize {
        if self.cipher.is_some() {
            crypto::plaintext_capacity(estimated_size)
        } else {
            estimated_size
        }
    }

    /// Rental size for a read: the plaintext plus room for the last read
    /// call (or the last sealed chunk, which is opened in place)
    fn read_capacity(&self, estimated_size: usize) -> usize {
        let slack = if self.cipher.is_some() {
            crypto::SEALED_CHUNK_LEN
        } else {
            READ_SLACK
        };
        self.plaintext_estimate(estimated_size) + slack
    }
}
