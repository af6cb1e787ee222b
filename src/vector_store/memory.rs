//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{NewSegment, Segment, SegmentId, SegmentVisitor, VectorStore};
use crate::error::{PodsearchError, Result};
use crate::vector::Vector;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    next_id: SegmentId,
    segments: BTreeMap<SegmentId, Segment>,
}

/// In-memory vector store. Ids are assigned in insertion order.
#[derive(Default)]
pub struct MemoryVectorStore {
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| PodsearchError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| PodsearchError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_segment(&self, segment: &NewSegment) -> Result<SegmentId> {
        let mut inner = self.write()?;
        inner.next_id += 1;
        let id = inner.next_id;

        inner.segments.insert(
            id,
            Segment {
                id,
                episode_id: segment.episode_id,
                start_time: segment.start_time,
                end_time: segment.end_time,
                text: segment.text.clone(),
                vector: segment.vector.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn store(&self, segment_id: SegmentId, vector: &Vector) -> Result<()> {
        let mut inner = self.write()?;
        let segment = inner
            .segments
            .get_mut(&segment_id)
            .ok_or_else(|| PodsearchError::NotFound(format!("Segment {}", segment_id)))?;

        if segment.vector.is_some() {
            return Err(PodsearchError::VectorStore(format!(
                "Segment {} already has a vector",
                segment_id
            )));
        }
        segment.vector = Some(vector.clone());
        Ok(())
    }

    async fn load(&self, segment_id: SegmentId) -> Result<Option<Vector>> {
        let inner = self.read()?;
        inner
            .segments
            .get(&segment_id)
            .map(|s| s.vector.clone())
            .ok_or_else(|| PodsearchError::NotFound(format!("Segment {}", segment_id)))
    }

    async fn scan_all(&self, visitor: &mut SegmentVisitor<'_>) -> Result<usize> {
        let inner = self.read()?;
        for segment in inner.segments.values() {
            visitor(segment.clone())?;
        }
        Ok(inner.segments.len())
    }

    async fn segments_for_episode(&self, episode_id: i64) -> Result<Vec<Segment>> {
        let inner = self.read()?;
        Ok(inner
            .segments
            .values()
            .filter(|s| s.episode_id == episode_id)
            .cloned()
            .collect())
    }

    async fn delete_by_episode(&self, episode_id: i64) -> Result<usize> {
        let mut inner = self.write()?;
        let initial_len = inner.segments.len();
        inner.segments.retain(|_, s| s.episode_id != episode_id);
        Ok(initial_len - inner.segments.len())
    }

    async fn segment_count(&self) -> Result<usize> {
        Ok(self.read()?.segments.len())
    }
}
