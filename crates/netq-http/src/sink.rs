//! Where a downloaded response body goes.

use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::HttpTransferError;

/// Destination for a response body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BodyTarget {
    /// Keep the body in memory; read it back with `HttpTransfer::body`.
    #[default]
    Memory,
    /// Write the body to a file, creating parent directories.
    File(PathBuf),
    /// Count the bytes and drop them.
    Discard,
}

pub(crate) enum BodyWriter {
    Memory(BytesMut),
    File { file: File, partial: PartialFile },
    Discard,
}

/// Removes the file it names when dropped, unless disarmed.
///
/// Covers a transfer future that is dropped mid-body.
pub(crate) struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed partial download");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove partial download");
            }
        }
    }
}

impl BodyWriter {
    pub(crate) async fn open(target: &BodyTarget) -> Result<Self, HttpTransferError> {
        match target {
            BodyTarget::Memory => Ok(Self::Memory(BytesMut::new())),
            BodyTarget::Discard => Ok(Self::Discard),
            BodyTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let file = File::create(path).await?;
                Ok(Self::File {
                    file,
                    partial: PartialFile {
                        path: path.clone(),
                        armed: true,
                    },
                })
            }
        }
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<(), HttpTransferError> {
        match self {
            Self::Memory(buffer) => buffer.extend_from_slice(chunk),
            Self::File { file, .. } => file.write_all(chunk).await?,
            Self::Discard => {}
        }
        Ok(())
    }

    /// Flush and hand back the in-memory body, if any.
    pub(crate) async fn finish(self) -> Result<Option<Bytes>, HttpTransferError> {
        match self {
            Self::Memory(buffer) => Ok(Some(buffer.freeze())),
            Self::File { mut file, mut partial } => {
                // A failed flush drops `partial`, removing the file.
                file.flush().await?;
                partial.disarm();
                tracing::debug!(path = %partial.path.display(), "Body written");
                Ok(None)
            }
            Self::Discard => Ok(None),
        }
    }

    /// Remove a partially written file after a failed or cancelled transfer.
    pub(crate) async fn abandon(self) {
        if let Self::File { file, mut partial } = self {
            drop(file);
            remove_partial(&partial.path).await;
            partial.disarm();
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %err, "Failed to remove partial download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_writer_collects_chunks() {
        let mut writer = BodyWriter::open(&BodyTarget::Memory).await.unwrap();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"world").await.unwrap();
        assert_eq!(writer.finish().await.unwrap().as_deref(), Some(&b"hello world"[..]));
    }

    #[tokio::test]
    async fn file_writer_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");

        let mut writer = BodyWriter::open(&BodyTarget::File(path.clone())).await.unwrap();
        writer.write(b"abc").await.unwrap();
        assert!(writer.finish().await.unwrap().is_none());

        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn abandoned_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.bin");

        let mut writer = BodyWriter::open(&BodyTarget::File(path.clone())).await.unwrap();
        writer.write(b"half").await.unwrap();
        writer.abandon().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropped_writer_removes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.bin");

        let mut writer = BodyWriter::open(&BodyTarget::File(path.clone())).await.unwrap();
        writer.write(b"part").await.unwrap();
        assert!(path.exists());
        drop(writer);

        assert!(!path.exists());
    }
}
