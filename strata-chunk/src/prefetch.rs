use std::panic::resume_unwind;
use std::thread::JoinHandle;

use strata_error::{StrataResult, strata_bail, strata_err};

/// Largest number of items a [`PrefetchIterator`] may hold ahead of its consumer.
pub const MAX_PREFETCH_DEPTH: usize = 2;

/// Runs an iterator on a background thread, keeping at most `depth` items ready ahead of the
/// consumer.
///
/// Wrapping an [`crate::ExportIterator`] overlaps the read of tile n+1 with the consumption of
/// tile n. Dropping the prefetcher disconnects the channel, which stops the producer after its
/// current item.
pub struct PrefetchIterator<T> {
    rx: Option<flume::Receiver<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> PrefetchIterator<T> {
    pub fn spawn<I>(iter: I, depth: usize) -> StrataResult<Self>
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        if depth == 0 || depth > MAX_PREFETCH_DEPTH {
            strata_bail!(
                "prefetch depth must be within 1..={}, got {}",
                MAX_PREFETCH_DEPTH,
                depth
            );
        }

        let (tx, rx) = flume::bounded(depth);
        let thread = std::thread::Builder::new()
            .name("strata-prefetch".to_string())
            .spawn(move || {
                for item in iter {
                    if tx.send(item).is_err() {
                        log::trace!("prefetch consumer hung up");
                        return;
                    }
                }
            })
            .map_err(|e| strata_err!("failed to spawn prefetch thread: {}", e))?;

        Ok(Self {
            rx: Some(rx),
            thread: Some(thread),
        })
    }
}

impl<T> Iterator for PrefetchIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.rx.as_ref()?.recv().ok();
        if item.is_none() {
            // The producer is done, surface a panic from it if there was one.
            self.rx = None;
            if let Some(thread) = self.thread.take() {
                thread.join().unwrap_or_else(|err| resume_unwind(err));
            }
        }
        item
    }
}

impl<T> Drop for PrefetchIterator<T> {
    fn drop(&mut self) {
        drop(self.rx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("prefetch thread panicked");
            }
        }
    }
}
