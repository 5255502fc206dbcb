//! The consumer side of an enumeration.

use crate::error::{Error, Result};
use crate::protocol::KeyMetadata;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A lazy stream of [`KeyMetadata`] with a single terminal result.
///
/// Records arrive in the server's order. Once [`next`](Self::next) returns
/// `None` the producer has finished and [`finish`](Self::finish) reports
/// why. Dropping the stream aborts the producer and closes its socket.
#[derive(Debug)]
pub struct KeyStream {
    records: mpsc::Receiver<KeyMetadata>,
    terminal: oneshot::Receiver<Result<()>>,
    producer: JoinHandle<()>,
}

impl KeyStream {
    pub(crate) fn new(
        records: mpsc::Receiver<KeyMetadata>,
        terminal: oneshot::Receiver<Result<()>>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            records,
            terminal,
            producer,
        }
    }

    /// The next record, or `None` once the producer is done.
    pub async fn next(&mut self) -> Option<KeyMetadata> {
        self.records.recv().await
    }

    /// Records parsed but not yet taken by the consumer.
    pub fn buffered(&self) -> usize {
        self.records.len()
    }

    /// Discards any remaining records and returns the terminal result.
    ///
    /// `Ok(())` means the server sent `END`.
    pub async fn finish(mut self) -> Result<()> {
        while self.records.recv().await.is_some() {}
        self.terminal_result().await
    }

    /// Drains every record, failing with the terminal error if there was one.
    pub async fn collect(mut self) -> Result<Vec<KeyMetadata>> {
        let mut keys = Vec::new();
        while let Some(meta) = self.records.recv().await {
            keys.push(meta);
        }
        self.terminal_result().await?;
        Ok(keys)
    }

    async fn terminal_result(&mut self) -> Result<()> {
        match (&mut self.terminal).await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled(
                "enumeration ended without a result".to_string(),
            )),
        }
    }
}

impl Drop for KeyStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}
