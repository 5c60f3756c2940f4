use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use craftsync_common::ChunkPos;
use craftsync_kernel::{Chunk, ChunkLookup, SerializedChunk};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use crate::loader::ChunkLoader;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk {0} not found")]
    NotFound(ChunkPos),
    #[error("loading chunk {pos} failed: {message}")]
    Loader { pos: ChunkPos, message: String },
}

type LoadResult = Result<Arc<Chunk>, ChunkError>;
type InFlight = Arc<OnceCell<LoadResult>>;

#[derive(Default)]
struct Inner {
    resident: HashMap<ChunkPos, Arc<Chunk>>,
    in_flight: HashMap<ChunkPos, InFlight>,
    loads: u64,
}

/// Resident chunks of one world, filled on demand by a [`ChunkLoader`].
///
/// Misses are single-flight: every caller that asks for a position while its
/// load is pending awaits the same cell and receives the same result.
pub struct ChunkStore {
    loader: Arc<dyn ChunkLoader>,
    inner: Mutex<Inner>,
}

impl ChunkStore {
    /// An empty store that fills misses from `loader`.
    pub fn new(loader: Arc<dyn ChunkLoader>) -> Self {
        Self {
            loader,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Map key and wire identifier for a position.
    pub fn id_for(pos: ChunkPos) -> String {
        pos.id()
    }

    /// Whether the chunk at `pos` is resident. Pending loads do not count.
    pub fn has(&self, pos: ChunkPos) -> bool {
        self.lock().resident.contains_key(&pos)
    }

    /// Resident chunk at `pos`, without loading.
    pub fn cached(&self, pos: ChunkPos) -> Option<Arc<Chunk>> {
        self.lock().resident.get(&pos).cloned()
    }

    /// Resident chunk at `pos`, loading it on a miss.
    pub async fn get(&self, pos: ChunkPos) -> Result<Arc<Chunk>, ChunkError> {
        let cell = {
            let mut inner = self.lock();
            if let Some(chunk) = inner.resident.get(&pos) {
                tracing::trace!(%pos, "chunk cache hit");
                return Ok(chunk.clone());
            }
            inner.in_flight.entry(pos).or_default().clone()
        };

        let result = cell
            .get_or_init(|| async {
                tracing::debug!(%pos, "loading chunk");
                let loaded = self.loader.load(pos).await;
                let mut inner = self.lock();
                inner.loads += 1;
                match loaded {
                    Ok(chunk) if chunk.position() != pos => Err(ChunkError::Loader {
                        pos,
                        message: format!("loader returned chunk {}", chunk.position()),
                    }),
                    // A put that raced the load wins; the loaded copy is dropped.
                    Ok(chunk) => Ok(inner
                        .resident
                        .entry(pos)
                        .or_insert_with(|| Arc::new(chunk))
                        .clone()),
                    Err(e) => {
                        tracing::warn!(%pos, error = %e, "chunk load failed");
                        Err(e)
                    }
                }
            })
            .await
            .clone();

        let mut inner = self.lock();
        if inner
            .in_flight
            .get(&pos)
            .is_some_and(|c| Arc::ptr_eq(c, &cell))
        {
            inner.in_flight.remove(&pos);
        }
        result
    }

    /// Make `chunk` authoritative at its own position.
    pub fn put(&self, chunk: Chunk) -> Arc<Chunk> {
        let chunk = Arc::new(chunk);
        self.lock().resident.insert(chunk.position(), chunk.clone());
        chunk
    }

    /// Mutate a resident chunk in place. Returns `None` if it is not resident.
    ///
    /// Readers holding an older `Arc` keep their snapshot.
    pub fn update<R>(&self, pos: ChunkPos, f: impl FnOnce(&mut Chunk) -> R) -> Option<R> {
        let mut inner = self.lock();
        let chunk = inner.resident.get_mut(&pos)?;
        Some(f(Arc::make_mut(chunk)))
    }

    /// Load every position concurrently. Returns the positions that failed.
    pub async fn preload(
        self: &Arc<Self>,
        positions: impl IntoIterator<Item = ChunkPos>,
    ) -> Vec<(ChunkPos, ChunkError)> {
        let mut tasks = JoinSet::new();
        for pos in positions {
            let store = Arc::clone(self);
            tasks.spawn(async move { (pos, store.get(pos).await) });
        }
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((pos, Err(e))) => failed.push((pos, e)),
                Err(e) => tracing::warn!(error = %e, "chunk preload task failed"),
            }
        }
        failed
    }

    /// Number of resident chunks.
    pub fn len(&self) -> usize {
        self.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().resident.is_empty()
    }

    /// Number of loader calls that have completed.
    pub fn load_count(&self) -> u64 {
        self.lock().loads
    }

    /// Serialized copies of every resident chunk, ordered by position.
    pub fn serialize_all(&self) -> Vec<SerializedChunk> {
        let inner = self.lock();
        let mut positions: Vec<&ChunkPos> = inner.resident.keys().collect();
        positions.sort();
        positions
            .into_iter()
            .filter_map(|p| inner.resident.get(p))
            .map(|c| c.serialize())
            .collect()
    }
}

impl ChunkLookup for ChunkStore {
    fn serialized(&self, pos: ChunkPos) -> Option<SerializedChunk> {
        self.cached(pos).map(|c| c.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FlatTerrainLoader, LoadFuture};
    use craftsync_common::{BlockData, BlockType, InnerChunkPos};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Yields once before producing a chunk so concurrent callers overlap.
    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ChunkLoader for CountingLoader {
        fn load(&self, pos: ChunkPos) -> LoadFuture<'_> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Chunk::new(pos))
            })
        }
    }

    struct MissingLoader;

    impl ChunkLoader for MissingLoader {
        fn load(&self, pos: ChunkPos) -> LoadFuture<'_> {
            Box::pin(async move { Err(ChunkError::NotFound(pos)) })
        }
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_load() {
        let loader = Arc::new(CountingLoader::default());
        let store = ChunkStore::new(loader.clone());
        let pos = ChunkPos::new(4, 4);

        let (a, b) = tokio::join!(store.get(pos), store.get(pos));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load_count(), 1);

        let c = store.get(pos).await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_failure_reaches_every_waiter() {
        let store = ChunkStore::new(Arc::new(MissingLoader));
        let pos = ChunkPos::new(0, 1);
        let (a, b) = tokio::join!(store.get(pos), store.get(pos));
        assert_eq!(a.unwrap_err(), ChunkError::NotFound(pos));
        assert_eq!(b.unwrap_err(), ChunkError::NotFound(pos));
        assert!(!store.has(pos));
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn put_overwrites_resident_chunk() {
        let store = ChunkStore::new(Arc::new(FlatTerrainLoader::new(2)));
        let pos = ChunkPos::new(1, 1);
        store.get(pos).await.unwrap();

        let mut replacement = Chunk::new(pos);
        replacement.set_block(InnerChunkPos::new(0, 0, 0), BlockType::Gold, BlockData::None);
        store.put(replacement.clone());
        assert_eq!(store.get(pos).await.unwrap().as_ref(), &replacement);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_mutates_only_resident_chunks() {
        let store = ChunkStore::new(Arc::new(FlatTerrainLoader::new(2)));
        let pos = ChunkPos::new(0, 0);
        let at = InnerChunkPos::new(2, 5, 2);
        assert!(store.update(pos, |c| c.remove_block(at)).is_none());

        let before = store.get(pos).await.unwrap();
        store.update(pos, |c| c.set_block(at, BlockType::Wood, BlockData::None));
        assert_eq!(before.block(at), BlockType::Void);
        assert_eq!(store.cached(pos).unwrap().block(at), BlockType::Wood);
        assert_eq!(
            store.serialized(pos).unwrap().blocks[at.index()],
            BlockType::Wood
        );
    }

    #[tokio::test]
    async fn preload_loads_the_square() {
        let store = Arc::new(ChunkStore::new(Arc::new(FlatTerrainLoader::new(1))));
        let failed = store.preload(ChunkPos::new(0, 0).square_around(2)).await;
        assert!(failed.is_empty());
        assert_eq!(store.len(), 16);
        assert!(store.has(ChunkPos::new(-2, 1)));
        assert_eq!(store.serialize_all().len(), 16);
    }

    #[test]
    fn id_is_deterministic() {
        assert_eq!(ChunkStore::id_for(ChunkPos::new(-5, 7)), "-5,7");
    }
}
