use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::resource::{AcquireError, ReleaseError, Resource, ResourceKind};

use super::{ChunkSink, SinkError, SinkHandle, SinkOptions};

/// A newly created file receiving the recording.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    pub fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSink for FileSink {
    async fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(&chunk).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().await.take().ok_or(SinkError::Closed)?;
        writer.flush().await?;
        writer.get_mut().sync_all().await?;
        tracing::info!(path = %self.path.display(), "Output file closed");
        Ok(())
    }

    async fn abort(&self, reason: &str) -> Result<(), SinkError> {
        let writer = self.writer.lock().await.take().ok_or(SinkError::Closed)?;
        drop(writer);
        tracing::warn!(path = %self.path.display(), reason, "Output file aborted");
        Ok(())
    }
}

/// Creates one output file per session.
#[derive(Debug, Default)]
pub struct FileSinkProvider;

#[async_trait]
impl Resource for FileSinkProvider {
    type Input = SinkOptions;
    type Handle = SinkHandle;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Sink
    }

    async fn acquire(
        &self,
        options: SinkOptions,
        cancel: CancellationToken,
    ) -> Result<SinkHandle, AcquireError> {
        let path = options
            .output_dir
            .join(options.file_name(chrono::Local::now()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        if cancel.is_cancelled() {
            drop(file);
            if let Err(err) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %err, "Failed to remove abandoned output file");
            }
            return Err(AcquireError::Cancelled);
        }

        tracing::info!(path = %path.display(), "Output file created");
        Ok(Arc::new(FileSink::new(path, file)))
    }

    async fn release(&self, sink: SinkHandle) -> Result<(), ReleaseError> {
        match sink.close().await {
            Ok(()) => Ok(()),
            Err(SinkError::Closed) => Err(ReleaseError::AlreadyClosed),
            Err(err) => Err(ReleaseError::Failed(err.to_string())),
        }
    }
}
