use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use log::{debug, error};

use super::RecordSink;
use crate::error::{Result, WriteError};
use crate::record::OutputRecord;

/// Default number of records queued between the converter and the writing thread
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

/// Moves writing onto a dedicated thread behind a bounded queue
///
/// Records are handed to the inner sink in the order they were accepted. Once the inner
/// sink refuses a record or fails, the thread stops and later records are refused here;
/// the failure itself is returned by [`RecordSink::close`].
pub struct BufferedSink {
    sender: Option<SyncSender<OutputRecord>>,
    handle: Option<JoinHandle<Result<()>>>,
    closed: bool,
}
impl BufferedSink {
    /// Spawns the writing thread for `inner` with a queue of `capacity` records
    pub fn new<S>(inner: S, capacity: usize) -> Result<Self>
    where
        S: RecordSink + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let handle = thread::Builder::new()
            .name("record-sink".to_string())
            .spawn(move || drain(inner, &receiver))?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            closed: false,
        })
    }
}

fn drain<S: RecordSink>(mut inner: S, receiver: &Receiver<OutputRecord>) -> Result<()> {
    let mut n_records = 0usize;
    for record in receiver {
        if !inner.accept(&record)? {
            debug!("Inner sink refused record {n_records}, stopping the writer thread");
            break;
        }
        n_records += 1;
    }
    inner.close()
}

impl RecordSink for BufferedSink {
    fn accept(&mut self, record: &OutputRecord) -> Result<bool> {
        if self.closed {
            return Err(WriteError::SinkClosed.into());
        }
        let Some(sender) = &self.sender else {
            return Ok(false);
        };
        if sender.send(record.clone()).is_err() {
            // the writer thread is gone
            self.sender = None;
            return Ok(false);
        }
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sender = None;
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("record writer thread panicked"))?,
            None => Ok(()),
        }
    }
}
impl Drop for BufferedSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close buffered output: {e}");
        }
    }
}
