//! Chunked columnar storage for one unmanaged component type (§4.2).
//!
//! A column is a vector of boxed, lazily-allocated chunks rather than a vector of chunks, so that
//! growing the outer vector on a new chunk never moves already-allocated chunk memory, and
//! `span()` can hand out a slice whose address is stable for the chunk's lifetime.
//!
//! Each chunk is `Vec<Option<T>>` rather than an unsafe `MaybeUninit`-backed buffer that skips
//! initialising unused slots: safe, at the cost of one discriminant per slot. An unwritten
//! slot is `None`; callers still must gate reads by `component_mask` per §3 — `read`/`read_mut`
//! panic on a `None` slot rather than silently returning a stale or default value.

/// One fixed-capacity chunk of slots for a single component type.
struct Chunk<T> {
    slots: Vec<Option<T>>,
    version: u64,
}

impl<T> Chunk<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, version: 0 }
    }
}

/// A chunked column of `T`, indexed directly by entity index (`index / capacity` selects the
/// chunk, `index % capacity` the offset within it).
pub struct ChunkedColumn<T> {
    capacity: usize,
    chunks: Vec<Option<Box<Chunk<T>>>>,
}

impl<T> ChunkedColumn<T> {
    /// A new, empty column. No chunks are allocated until first write.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk capacity must be non-zero");
        Self {
            capacity,
            chunks: Vec::new(),
        }
    }

    #[inline]
    fn locate(&self, slot: usize) -> (usize, usize) {
        (slot / self.capacity, slot % self.capacity)
    }

    /// Lazily allocate the chunk at `chunk_idx`, extending the chunk vector if needed. A no-op
    /// if the chunk is already allocated.
    pub fn ensure_chunk_allocated(&mut self, chunk_idx: usize) {
        if chunk_idx >= self.chunks.len() {
            self.chunks.resize_with(chunk_idx + 1, || None);
        }
        if self.chunks[chunk_idx].is_none() {
            self.chunks[chunk_idx] = Some(Box::new(Chunk::new(self.capacity)));
        }
    }

    /// Write `value` to `slot`, allocating its chunk if necessary, and bump that chunk's
    /// version.
    pub fn write(&mut self, slot: usize, value: T) {
        let (chunk_idx, offset) = self.locate(slot);
        self.ensure_chunk_allocated(chunk_idx);
        let chunk = self.chunks[chunk_idx].as_mut().unwrap();
        chunk.slots[offset] = Some(value);
        chunk.version += 1;
    }

    /// Clear `slot`'s value (used by `remove_component`), bumping the chunk version. A no-op if
    /// the chunk was never allocated.
    pub fn clear(&mut self, slot: usize) {
        let (chunk_idx, offset) = self.locate(slot);
        if let Some(Some(chunk)) = self.chunks.get_mut(chunk_idx) {
            chunk.slots[offset] = None;
            chunk.version += 1;
        }
    }

    /// Read `slot`'s value without checking presence.
    ///
    /// # Panics
    /// Panics if the slot's chunk was never allocated or the slot holds no value. Callers must
    /// gate on `component_mask` first, per §3.
    pub fn read(&self, slot: usize) -> &T {
        let (chunk_idx, offset) = self.locate(slot);
        self.chunks
            .get(chunk_idx)
            .and_then(|c| c.as_ref())
            .and_then(|chunk| chunk.slots[offset].as_ref())
            .expect("read of an unset column slot; caller must gate by component_mask")
    }

    /// Mutably read `slot`'s value without checking presence, bumping the chunk version.
    ///
    /// # Panics
    /// Same conditions as [`read`](Self::read).
    pub fn read_mut(&mut self, slot: usize) -> &mut T {
        let (chunk_idx, offset) = self.locate(slot);
        let chunk = self.chunks[chunk_idx]
            .as_mut()
            .expect("read_mut of an unallocated chunk; caller must gate by component_mask");
        chunk.version += 1;
        chunk.slots[offset]
            .as_mut()
            .expect("read_mut of an unset column slot; caller must gate by component_mask")
    }

    /// The chunk at `chunk_idx` as a slice of slots, or `None` if never allocated. Slot `i`
    /// holding `None` means no entity has ever written that offset (or it was removed); the
    /// caller still must gate presence by `component_mask`.
    pub fn span(&self, chunk_idx: usize) -> Option<&[Option<T>]> {
        self.chunks
            .get(chunk_idx)
            .and_then(|c| c.as_deref())
            .map(|chunk| chunk.slots.as_slice())
    }

    /// The monotonic version counter for `chunk_idx`, or 0 if never allocated (so an unsynced
    /// destination compares as strictly behind any source that has ever been written).
    pub fn version(&self, chunk_idx: usize) -> u64 {
        self.chunks
            .get(chunk_idx)
            .and_then(|c| c.as_ref())
            .map(|chunk| chunk.version)
            .unwrap_or(0)
    }

    /// How many chunk slots this column's outer vector currently has allocated (including
    /// not-yet-committed `None` entries).
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Slots per chunk.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> ChunkedColumn<T> {
    /// Overwrite `chunk_idx` in `self` from the same chunk in `source`, but only if the
    /// source's version is strictly ahead — the per-chunk dirty check behind `sync_from` (§3).
    /// A no-op if `source` never allocated that chunk.
    pub fn sync_chunk_from(&mut self, source: &ChunkedColumn<T>, chunk_idx: usize) {
        let Some(source_chunk) = source.chunks.get(chunk_idx).and_then(|c| c.as_ref()) else {
            return;
        };
        if self.version(chunk_idx) >= source_chunk.version {
            return;
        }
        self.ensure_chunk_allocated(chunk_idx);
        let dest = self.chunks[chunk_idx].as_mut().unwrap();
        dest.slots.clone_from(&source_chunk.slots);
        dest.version = source_chunk.version;
    }
}

/// Type-erased interface over a [`ChunkedColumn<T>`], so the repository can hold one column per
/// registered component type without naming `T` at every call site, via the same downcast-via-
/// `Any` shape used for event streams.
pub trait ErasedColumn: Send + Sync {
    /// Copy every chunk from `source` into `self` that is strictly newer there, via
    /// [`ChunkedColumn::sync_chunk_from`]. A no-op if `source` is not the same concrete `T`.
    fn sync_all_chunks_from(&mut self, source: &dyn ErasedColumn);

    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T: 'static + Send + Sync + Clone> ErasedColumn for ChunkedColumn<T> {
    fn sync_all_chunks_from(&mut self, source: &dyn ErasedColumn) {
        let Some(source) = source.as_any().downcast_ref::<ChunkedColumn<T>>() else {
            return;
        };
        let chunk_total = source.chunk_count().max(self.chunk_count());
        for chunk_idx in 0..chunk_total {
            self.sync_chunk_from(source, chunk_idx);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut column = ChunkedColumn::<u32>::new(4);
        column.write(0, 10);
        column.write(3, 30);

        assert_eq!(*column.read(0), 10);
        assert_eq!(*column.read(3), 30);
    }

    #[test]
    fn write_bumps_chunk_version() {
        let mut column = ChunkedColumn::<u32>::new(4);
        assert_eq!(column.version(0), 0);

        column.write(1, 1);
        assert_eq!(column.version(0), 1);

        column.write(2, 2);
        assert_eq!(column.version(0), 2);
    }

    #[test]
    fn slot_addresses_a_chunk_by_index_div_capacity() {
        let mut column = ChunkedColumn::<u32>::new(4);
        column.write(0, 100);
        column.write(5, 101);

        assert_eq!(*column.read(0), 100);
        assert_eq!(*column.read(5), 101);
        assert_eq!(column.chunk_count(), 2);
    }

    #[test]
    fn chunk_pointer_identity_survives_growth() {
        let mut column = ChunkedColumn::<u32>::new(4);
        column.write(0, 1);
        let before: *const [Option<u32>] = column.span(0).unwrap();

        // Growing to a far chunk must not move chunk 0's backing storage.
        column.write(4000, 2);
        let after: *const [Option<u32>] = column.span(0).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    #[should_panic(expected = "unset column slot")]
    fn read_of_unwritten_slot_panics() {
        let column = ChunkedColumn::<u32>::new(4);
        column.ensure_chunk_allocated(0);
        column.read(0);
    }

    #[test]
    fn clear_removes_value_and_bumps_version() {
        let mut column = ChunkedColumn::<u32>::new(4);
        column.write(0, 5);
        let version_before = column.version(0);

        column.clear(0);

        assert!(column.span(0).unwrap()[0].is_none());
        assert!(column.version(0) > version_before);
    }

    #[test]
    fn sync_chunk_from_copies_only_when_strictly_newer() {
        let mut source = ChunkedColumn::<u32>::new(4);
        source.write(0, 1);

        let mut dest = ChunkedColumn::<u32>::new(4);
        dest.sync_chunk_from(&source, 0);
        assert_eq!(*dest.read(0), 1);
        assert_eq!(dest.version(0), source.version(0));

        // No further writes on the source: re-syncing is a no-op, and dest's own subsequent
        // write must not be clobbered by a stale source.
        dest.write(0, 99);
        dest.sync_chunk_from(&source, 0);
        assert_eq!(*dest.read(0), 99);
    }

    #[test]
    fn erased_sync_copies_every_dirty_chunk() {
        let mut source = ChunkedColumn::<u32>::new(4);
        source.write(0, 1);
        source.write(5, 2);

        let mut dest = ChunkedColumn::<u32>::new(4);
        dest.sync_all_chunks_from(&source as &dyn ErasedColumn);

        assert_eq!(*dest.read(0), 1);
        assert_eq!(*dest.read(5), 2);
    }

    #[test]
    fn sync_chunk_from_absent_source_chunk_is_a_no_op() {
        let source = ChunkedColumn::<u32>::new(4);
        let mut dest = ChunkedColumn::<u32>::new(4);
        dest.write(0, 7);

        dest.sync_chunk_from(&source, 0);

        assert_eq!(*dest.read(0), 7);
    }
}
