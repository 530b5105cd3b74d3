//! Sample fan-out to connected clients
//!
//! Each block is encoded once into a reusable buffer and the same bytes are
//! sent to every client that was writable in the last poll. Clients that are
//! not writable simply miss the block; nothing is queued per client, so a
//! slow reader can never hold up acquisition.

use crate::core::types::WireFormat;
use crate::streaming::mux::ConnectionMux;
use crate::streaming::protocol::encode_samples;

/// Typical legacy block: 1024 complex samples as bytes
const INITIAL_BUFFER_CAPACITY: usize = 2048;

/// Per-block delivery counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Clients that received the whole block
    pub delivered: usize,
    /// Clients torn down because the send failed
    pub dropped: usize,
    /// Encoded block size in bytes
    pub bytes: usize,
}

/// Encodes sample blocks and writes them to writable clients
pub struct Broadcaster {
    format: WireFormat,
    buffer: Vec<u8>,
    blocks_sent: u64,
}

impl Broadcaster {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            blocks_sent: 0,
        }
    }

    /// Blocks delivered to at least one client
    pub fn blocks_sent(&self) -> u64 {
        self.blocks_sent
    }

    /// Send one block of interleaved samples to every writable client
    pub fn broadcast(&mut self, mux: &mut ConnectionMux, samples: &[f32]) -> BroadcastStats {
        let targets = mux.writable();
        let mut stats = BroadcastStats::default();
        if targets.is_empty() {
            return stats;
        }

        encode_samples(samples, self.format, &mut self.buffer);
        stats.bytes = self.buffer.len();

        for id in targets {
            if mux.write(id, &self.buffer) {
                stats.delivered += 1;
            } else {
                stats.dropped += 1;
            }
        }

        if stats.delivered > 0 {
            self.blocks_sent += 1;
            if self.blocks_sent % 1000 == 0 {
                log::debug!(
                    "Broadcast {} blocks ({} bytes each, {} clients)",
                    self.blocks_sent,
                    stats.bytes,
                    stats.delivered
                );
            }
        }

        stats
    }
}
