//! Compressed-size advisory for rendered pages.
//!
//! A page that fits in the first TCP round trip (about 14 KB on the wire)
//! renders noticeably faster, so every written document is gzipped and its
//! compressed size reported. Pages above the threshold are flagged.
//!
//! Compression runs off the build thread: [`AdvisoryCollector::submit`]
//! hands the bytes to the rayon pool and returns immediately, and
//! [`AdvisoryCollector::drain`] waits for every submitted result and returns
//! them in submission order, whatever order the tasks finished in.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};

/// Default advisory threshold in bytes of gzipped output.
pub const DEFAULT_THRESHOLD: usize = 14 * 1024;

/// Compressed size of one written page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeAdvisory {
    /// Output-relative path of the page.
    pub path: String,
    /// Size of the page after gzip, in bytes.
    pub compressed_bytes: usize,
    /// Threshold the page was measured against.
    pub threshold: usize,
}

impl SizeAdvisory {
    pub fn over_threshold(&self) -> bool {
        self.compressed_bytes > self.threshold
    }
}

/// Collects advisories from concurrent gzip tasks.
///
/// A threshold of 0 disables the advisory: `submit` becomes a no-op and
/// `drain` returns nothing.
pub struct AdvisoryCollector {
    threshold: usize,
    submitted: usize,
    tx: Sender<(usize, SizeAdvisory)>,
    rx: Receiver<(usize, SizeAdvisory)>,
}

impl AdvisoryCollector {
    pub fn new(threshold: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            threshold,
            submitted: 0,
            tx,
            rx,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// Queue `bytes` (the page written to `path`) for measurement.
    pub fn submit(&mut self, path: &str, bytes: Vec<u8>) {
        if !self.is_enabled() {
            return;
        }
        let seq = self.submitted;
        self.submitted += 1;

        let tx = self.tx.clone();
        let path = path.to_string();
        let threshold = self.threshold;
        rayon::spawn(move || {
            let advisory = SizeAdvisory {
                path,
                compressed_bytes: gzip_len(&bytes),
                threshold,
            };
            // The receiver only goes away once drain has what it needs.
            let _ = tx.send((seq, advisory));
        });
    }

    /// Wait for every submitted measurement and return them in submission
    /// order.
    pub fn drain(self) -> Vec<SizeAdvisory> {
        let Self {
            submitted, tx, rx, ..
        } = self;
        drop(tx);

        let mut results: Vec<(usize, SizeAdvisory)> = rx.iter().take(submitted).collect();
        results.sort_by_key(|(seq, _)| *seq);
        results.into_iter().map(|(_, advisory)| advisory).collect()
    }
}

/// Gzipped length of `bytes` at the default compression level.
pub fn gzip_len(bytes: &[u8]) -> usize {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    match encoder.write_all(bytes).and_then(|_| encoder.finish()) {
        Ok(compressed) => compressed.len(),
        Err(_) => bytes.len(),
    }
}
