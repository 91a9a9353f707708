//! Checksum utilities for chunk verification
//!
//! Every uploaded chunk carries a 64-bit FNV-1a digest of its raw bytes in the
//! `X-Checksum` header. The server recomputes it and rejects the chunk with
//! `BAD_CHECKSUM` on mismatch.

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Incremental FNV-1a hasher
#[derive(Debug, Clone, Copy)]
pub struct ChunkHasher {
    state: u64,
}

impl ChunkHasher {
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Feed more bytes into the digest
    pub fn update(&mut self, data: &[u8]) {
        for byte in data {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Raw 64-bit digest
    pub fn finish(&self) -> u64 {
        self.state
    }

    /// Digest rendered as 16 lowercase hex digits
    pub fn finish_hex(&self) -> String {
        format!("{:016x}", self.state)
    }
}

impl Default for ChunkHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the raw FNV-1a digest of a byte slice
pub fn fnv1a64(data: &[u8]) -> u64 {
    let mut hasher = ChunkHasher::new();
    hasher.update(data);
    hasher.finish()
}

/// Compute the wire checksum of a chunk (16 lowercase hex digits)
pub fn chunk_checksum(data: &[u8]) -> String {
    let mut hasher = ChunkHasher::new();
    hasher.update(data);
    hasher.finish_hex()
}
