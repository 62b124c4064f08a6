// Cache module
// Keeps the byte chunks a latency-costly source has already fetched.
// Overlapping and adjacent chunks are merged on insert, so any loaded range is
// served from a single contiguous buffer.

use bytes::{Bytes, BytesMut};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
struct Chunk {
    offset: u64,
    data: Bytes,
}

impl Chunk {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Thread-safe store of loaded byte chunks, kept sorted and disjoint.
/// Uses Arc<RwLock<>> so clones share one store.
pub struct ChunkCache {
    chunks: Arc<RwLock<Vec<Chunk>>>,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Store `data` as the bytes at `offset`.
    /// Newly inserted bytes win over previously stored bytes where they overlap.
    pub fn insert(&self, offset: u64, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let incoming = Chunk { offset, data };
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);

        let (touching, mut kept): (Vec<Chunk>, Vec<Chunk>) = chunks
            .drain(..)
            .partition(|chunk| chunk.offset <= incoming.end() && incoming.offset <= chunk.end());

        let merged = if touching.is_empty() {
            incoming
        } else {
            let start = touching.iter().map(|c| c.offset).fold(incoming.offset, u64::min);
            let end = touching.iter().map(Chunk::end).fold(incoming.end(), u64::max);
            let mut buffer = BytesMut::zeroed((end - start) as usize);
            for chunk in touching.iter().chain(std::iter::once(&incoming)) {
                let at = (chunk.offset - start) as usize;
                buffer[at..at + chunk.data.len()].copy_from_slice(&chunk.data);
            }
            Chunk {
                offset: start,
                data: buffer.freeze(),
            }
        };

        kept.push(merged);
        kept.sort_by_key(|chunk| chunk.offset);
        *chunks = kept;
    }

    /// The `length` bytes at `offset`, if one loaded chunk holds all of them.
    pub fn get(&self, offset: u64, length: u64) -> Option<Bytes> {
        if length == 0 {
            return Some(Bytes::new());
        }
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let end = offset.checked_add(length)?;
        chunks
            .iter()
            .find(|chunk| chunk.offset <= offset && end <= chunk.end())
            .map(|chunk| {
                let at = (offset - chunk.offset) as usize;
                chunk.data.slice(at..at + length as usize)
            })
    }

    /// Check whether a range is loaded.
    pub fn contains(&self, offset: u64, length: u64) -> bool {
        self.get(offset, length).is_some()
    }

    /// Number of disjoint chunks held.
    pub fn len(&self) -> usize {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes held across chunks.
    pub fn loaded_bytes(&self) -> u64 {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        chunks.iter().map(|chunk| chunk.data.len() as u64).sum()
    }

    pub fn clear(&self) {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.clear();
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ChunkCache {
    /// Clone the ChunkCache, sharing the same underlying chunks.
    fn clone(&self) -> Self {
        Self {
            chunks: Arc::clone(&self.chunks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_insert_and_get() {
        let cache = ChunkCache::new();
        cache.insert(10, Bytes::from_static(b"abcdef"));
        assert_eq!(cache.get(12, 3).unwrap(), Bytes::from_static(b"cde"));
        assert_eq!(cache.get(10, 6).unwrap(), Bytes::from_static(b"abcdef"));
    }

    #[test]
    fn test_cache_miss() {
        let cache = ChunkCache::new();
        assert!(cache.get(0, 1).is_none());
        cache.insert(10, Bytes::from_static(b"abc"));
        assert!(cache.get(9, 2).is_none());
        assert!(cache.get(12, 2).is_none());
    }

    #[test]
    fn test_adjacent_chunks_merge() {
        let cache = ChunkCache::new();
        cache.insert(0, Bytes::from_static(b"abc"));
        cache.insert(3, Bytes::from_static(b"def"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1, 4).unwrap(), Bytes::from_static(b"bcde"));
    }

    #[test]
    fn test_overlap_prefers_newest_bytes() {
        let cache = ChunkCache::new();
        cache.insert(0, Bytes::from_static(b"aaaa"));
        cache.insert(8, Bytes::from_static(b"cccc"));
        assert_eq!(cache.len(), 2);
        cache.insert(2, Bytes::from_static(b"bbbbbbb"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(0, 12).unwrap(), Bytes::from_static(b"aabbbbbbbccc"));
        assert_eq!(cache.loaded_bytes(), 12);
    }

    #[test]
    fn test_disjoint_chunks_stay_apart() {
        let cache = ChunkCache::new();
        cache.insert(100, Bytes::from_static(b"end"));
        cache.insert(0, Bytes::from_static(b"start"));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(0, 5));
        assert!(cache.contains(100, 3));
        assert!(!cache.contains(0, 103));
    }

    #[test]
    fn test_cache_operations() {
        let cache = ChunkCache::default();
        assert!(cache.is_empty());
        cache.insert(0, Bytes::new());
        assert!(cache.is_empty());
        assert!(cache.contains(5, 0));

        cache.insert(0, Bytes::from_static(b"x"));
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clone() {
        let cache = ChunkCache::new();
        cache.insert(0, Bytes::from_static(b"shared"));
        let cache2 = cache.clone();
        assert!(cache2.contains(0, 6));

        cache2.insert(6, Bytes::from_static(b"!"));
        assert!(cache.contains(0, 7)); // Shared state
    }
}
