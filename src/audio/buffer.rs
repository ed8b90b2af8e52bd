use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

/// Append-only sample buffer for one source track.
///
/// Chunks are stored in arrival order and never reordered. The buffer is
/// mutable only while the owning session is recording; `finish()` consumes it
/// into the final contiguous sample vector.
#[derive(Debug, Default)]
pub struct TrackBuffer {
    chunks: Vec<Vec<f32>>,
    total_samples: usize,
}

impl TrackBuffer {
    pub fn append(&mut self, chunk: &[f32]) {
        self.total_samples += chunk.len();
        self.chunks.push(chunk.to_vec());
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate all chunks in arrival order.
    pub fn finish(self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.total_samples);
        for chunk in self.chunks {
            samples.extend_from_slice(&chunk);
        }
        samples
    }
}

/// Handle through which an audio callback writes into a [`TrackBuffer`].
///
/// The callback side never blocks: it appends under a `try_lock`, and a
/// contended lock counts the chunk as dropped instead of stalling the audio
/// thread. The coordinating side uses the same lock for drain and finalize.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<TrackBuffer>>,
    dropped: Arc<AtomicU64>,
    /// Mirrors the buffer's sample count so status polls never contend with
    /// the callback's lock.
    total: Arc<AtomicUsize>,
    first_arrival: Arc<OnceLock<Instant>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk from the audio callback context.
    ///
    /// Must stay cheap: one copy under a short-held lock, no I/O.
    pub fn push_from_callback(&self, chunk: &[f32]) {
        match self.inner.try_lock() {
            Ok(mut buffer) => {
                let _ = self.first_arrival.set(Instant::now());
                buffer.append(chunk);
                self.total.fetch_add(chunk.len(), Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Chunks lost to callback overruns. Reported, never hidden.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn total_samples(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples() == 0
    }

    /// Arrival time of the first chunk, if any audio has been captured.
    pub fn first_arrival(&self) -> Option<Instant> {
        self.first_arrival.get().copied()
    }

    /// Swap the accumulated buffer out, leaving this handle empty.
    ///
    /// Called on the coordinating context once all writers are stopped, to
    /// finalize (stop) or discard (cancel) the captured audio.
    pub fn take(&self) -> TrackBuffer {
        let buffer = match self.inner.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        self.total.store(0, Ordering::Relaxed);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contended_lock_counts_drop_instead_of_blocking() {
        let buffer = SharedBuffer::new();
        let writer = buffer.clone();

        // Hold the lock the way a control operation would mid-drain, then
        // push from the callback path: the chunk must be counted as dropped,
        // never silently lost and never blocked on.
        let guard = buffer.inner.lock().unwrap();
        writer.push_from_callback(&[0.1, 0.2]);
        drop(guard);

        assert_eq!(buffer.dropped_chunks(), 1);
        assert_eq!(buffer.total_samples(), 0);

        writer.push_from_callback(&[0.3]);
        assert_eq!(buffer.dropped_chunks(), 1);
        assert_eq!(buffer.total_samples(), 1);
    }
}
