//! Background feedback writer
//!
//! Records are handed to a dedicated thread over a channel so persistence
//! never delays the next page. Failures are logged and dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::database::{FeedbackRecord, FeedbackStore};

enum WriterMessage {
    Record(Box<FeedbackRecord>),
    Shutdown,
}

/// Handle to the feedback writer thread
pub struct FeedbackWriter {
    sender: Sender<WriterMessage>,
    done: Receiver<usize>,
    handle: Option<JoinHandle<()>>,
}

impl FeedbackWriter {
    /// Start the writer thread, moving `store` into it
    pub fn spawn<S: FeedbackStore + 'static>(mut store: S) -> Self {
        let (sender, receiver) = unbounded::<WriterMessage>();
        let (done_tx, done) = unbounded();

        let handle = std::thread::spawn(move || {
            debug!("Feedback writer starting...");
            let mut written = 0;
            for message in receiver.iter() {
                match message {
                    WriterMessage::Record(record) => match store.append(&record) {
                        Ok(()) => written += 1,
                        Err(e) => warn!(
                            "Failed to record feedback for page {}: {:#}",
                            record.page_index, e
                        ),
                    },
                    WriterMessage::Shutdown => break,
                }
            }
            let _ = done_tx.send(written);
            debug!("Feedback writer exiting after {} record(s)", written);
        });

        Self {
            sender,
            done,
            handle: Some(handle),
        }
    }

    /// Queue a record; never blocks
    pub fn submit(&self, record: FeedbackRecord) {
        let page_index = record.page_index;
        if self.sender.send(WriterMessage::Record(Box::new(record))).is_err() {
            warn!("Feedback writer is gone; page {} not recorded", page_index);
        }
    }

    /// Flush queued records, waiting at most `timeout`
    ///
    /// Returns the number of records written, or `None` when the writer
    /// did not finish in time and was left detached.
    pub fn shutdown(mut self, timeout: Duration) -> Option<usize> {
        let _ = self.sender.send(WriterMessage::Shutdown);
        match self.done.recv_timeout(timeout) {
            Ok(written) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                info!("Feedback writer flushed {} record(s)", written);
                Some(written)
            }
            Err(_) => {
                warn!("Feedback writer did not finish within {:?}; detaching", timeout);
                self.handle.take();
                None
            }
        }
    }
}

impl Drop for FeedbackWriter {
    fn drop(&mut self) {
        // Signal the thread; it drains what is queued and exits on its own
        let _ = self.sender.send(WriterMessage::Shutdown);
    }
}
