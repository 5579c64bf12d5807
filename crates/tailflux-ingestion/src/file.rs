use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tailflux_core::{HandoffSender, IngestionError, LogLine};
use tokio::fs::File as TokioFile;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default wait between reads once the end of the file is reached
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Follows a single file with tail -f behavior
///
/// The cursor starts at the end of the file as it is when [`FileTail::open`]
/// returns, so only content appended afterwards is ever emitted. New data is
/// discovered by polling; there is no rotation or truncation handling.
pub struct FileTail {
    path: PathBuf,
    reader: BufReader<TokioFile>,
    /// Byte offset of the next unread byte
    position: u64,
    poll_interval: Duration,
    /// Bytes of a line whose newline has not been written yet
    pending: Vec<u8>,
}

impl FileTail {
    /// Open `path` and position the cursor at its current end
    pub async fn open(
        path: impl AsRef<Path>,
        poll_interval: Duration,
    ) -> Result<Self, IngestionError> {
        let path = path.as_ref().to_path_buf();

        let mut file = TokioFile::open(&path).await.map_err(|e| IngestionError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        let position = file
            .seek(SeekFrom::End(0))
            .await
            .map_err(|e| IngestionError::Read {
                path: path.display().to_string(),
                source: e,
            })?;

        info!(path = %path.display(), position, "Following file from end");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            position,
            poll_interval,
            pending: Vec::new(),
        })
    }

    /// Path being followed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the next byte to be read
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Wait for the next complete line
    ///
    /// Returns `Ok(None)` once `cancel` fires. A trailing fragment without a
    /// newline is held until the rest of the line is appended.
    pub async fn next_line(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<LogLine>, IngestionError> {
        loop {
            let bytes_read = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|e| IngestionError::Read {
                    path: self.path.display().to_string(),
                    source: e,
                })?;
            self.position += bytes_read as u64;

            if self.pending.last() == Some(&b'\n') {
                self.pending.pop();
                if self.pending.last() == Some(&b'\r') {
                    self.pending.pop();
                }
                let content = std::mem::take(&mut self.pending);
                return Ok(Some(LogLine::new(content)));
            }

            // End of the data written so far
            tokio::select! {
                _ = cancel.cancelled() => {
                    if !self.pending.is_empty() {
                        debug!(
                            path = %self.path.display(),
                            bytes = self.pending.len(),
                            "Discarding incomplete trailing line"
                        );
                    }
                    return Ok(None);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Follow the file and hand every new line to the next stage
    ///
    /// Runs until cancelled. Returns the number of lines sent.
    pub async fn run(
        mut self,
        sender: HandoffSender<LogLine>,
        cancel: CancellationToken,
    ) -> Result<u64, IngestionError> {
        let mut lines_sent: u64 = 0;

        while let Some(line) = self.next_line(&cancel).await? {
            debug!(bytes = line.len(), position = self.position, "Read log line from file");

            tokio::select! {
                res = sender.send(line) => {
                    if res.is_err() {
                        warn!("Channel closed, stopping file reader");
                        return Err(IngestionError::ChannelClosed);
                    }
                }
                _ = cancel.cancelled() => break,
            }
            lines_sent += 1;
        }

        info!(path = %self.path.display(), lines = lines_sent, "File reader stopped");
        Ok(lines_sent)
    }
}
