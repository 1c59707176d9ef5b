//! Pausable row source
//!
//! A producer task pulls rows from the underlying cursor and forwards them
//! over a bounded channel. Before every cursor read it waits on a pause gate;
//! `SourceControl::pause`/`resume` flip the gate and are idempotent, so racing
//! completion events can call them freely.

pub mod sql;

pub use sql::{clip_row_from, clip_rows, connect};

use crate::models::ClipRow;
use cvb_common::Result;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Pause/resume capability over a running row source
#[derive(Debug, Clone)]
pub struct SourceControl {
    paused: Arc<watch::Sender<bool>>,
}

impl SourceControl {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    /// Stop reading from the cursor; returns whether the state changed
    pub fn pause(&self) -> bool {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Continue reading from the cursor; returns whether the state changed
    pub fn resume(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }
}

/// Receiving side of a spawned row source
pub struct RowSource {
    rows: mpsc::Receiver<Result<ClipRow>>,
    control: SourceControl,
    task: JoinHandle<()>,
}

impl RowSource {
    /// Spawn the producer task over any row stream
    ///
    /// `buffer` bounds the rows read ahead of the consumer.
    pub fn spawn<S>(rows: S, buffer: usize) -> Self
    where
        S: Stream<Item = Result<ClipRow>> + Send + 'static,
    {
        let control = SourceControl::new();
        let mut gate = control.paused.subscribe();
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let task = tokio::spawn(async move {
            let mut rows = std::pin::pin!(rows);
            loop {
                let open = gate.wait_for(|paused| !*paused).await.is_ok();
                if !open {
                    tracing::debug!("Row source control dropped, stopping producer");
                    break;
                }
                match rows.next().await {
                    Some(item) => {
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() || failed {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });

        Self {
            rows: rx,
            control,
            task,
        }
    }

    pub fn control(&self) -> SourceControl {
        self.control.clone()
    }

    /// Next row; `None` once the cursor is exhausted
    pub async fn recv(&mut self) -> Option<Result<ClipRow>> {
        self.rows.recv().await
    }
}

impl Drop for RowSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn rows(n: usize) -> Vec<Result<ClipRow>> {
        (0..n)
            .map(|i| {
                Ok(ClipRow {
                    id: i.to_string(),
                    ..Default::default()
                })
            })
            .collect()
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let control = SourceControl::new();
        assert!(!control.is_paused());
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.is_paused());
        assert!(control.resume());
        assert!(!control.resume());
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_rows_delivered_in_order() {
        let mut source = RowSource::spawn(futures::stream::iter(rows(5)), 2);
        let mut ids = Vec::new();
        while let Some(row) = source.recv().await {
            ids.push(row.unwrap().id);
        }
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_paused_source_stops_reading() {
        let mut source = RowSource::spawn(futures::stream::iter(rows(10)), 1);
        let control = source.control();

        let first = source.recv().await.unwrap().unwrap();
        assert_eq!(first.id, "0");
        control.pause();

        // At most the channel buffer and the row in hand can be read ahead
        let mut drained = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(50), source.recv()).await
        {
            drained += 1;
        }
        assert!(drained <= 2, "read {} rows while paused", drained);

        control.resume();
        let mut rest = 0;
        while source.recv().await.is_some() {
            rest += 1;
        }
        assert_eq!(1 + drained + rest, 10);
    }

    #[tokio::test]
    async fn test_error_ends_source() {
        let items = vec![
            Ok(ClipRow::default()),
            Err(cvb_common::Error::Internal("cursor broke".to_string())),
            Ok(ClipRow::default()),
        ];
        let mut source = RowSource::spawn(futures::stream::iter(items), 4);

        assert!(source.recv().await.unwrap().is_ok());
        assert!(source.recv().await.unwrap().is_err());
        assert!(source.recv().await.is_none());
    }
}
