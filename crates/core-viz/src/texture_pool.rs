use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use core_stream::SliceImage;

/// Identifies a texture uploaded into a `TexturePool`. Opaque outside this
/// crate; a `Drawable` holds these instead of raw pixel data between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

/// Owns uploaded texture images, reference-counted by id, so more than one
/// `Drawable` can share the same slice image (e.g. a voxel filter and its
/// downstream annotation both referencing the same colour-mapped raster)
/// without re-uploading it. Not a process-wide singleton: the caller owns
/// one and threads it through whichever drawables need it, the same way
/// `AnalysisState` owns its abort flag rather than reaching for a static.
#[derive(Default)]
pub struct TexturePool {
    next_id: AtomicU64,
    slots: Mutex<HashMap<TextureId, Arc<SliceImage>>>,
}

impl TexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `image`, returning a fresh id. Always allocates a new slot;
    /// callers that want to share an existing upload should hold onto the
    /// `TextureId` they already have instead of re-inserting.
    pub fn insert(&self, image: SliceImage) -> TextureId {
        let id = TextureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots.lock().expect("texture pool mutex poisoned").insert(id, Arc::new(image));
        id
    }

    pub fn get(&self, id: TextureId) -> Option<Arc<SliceImage>> {
        self.slots.lock().expect("texture pool mutex poisoned").get(&id).cloned()
    }

    /// How many `Arc` handles to this texture are outstanding, including the
    /// pool's own. `0` if the id is unknown (already fully released).
    pub fn ref_count(&self, id: TextureId) -> usize {
        self.slots.lock().expect("texture pool mutex poisoned").get(&id).map(Arc::strong_count).unwrap_or(0)
    }

    /// Drop the pool's own handle to `id`. Any `Arc<SliceImage>` a caller
    /// already cloned out via `get` keeps the data alive until it is
    /// dropped too; this only releases the pool's slot.
    pub fn release(&self, id: TextureId) {
        let removed = self.slots.lock().expect("texture pool mutex poisoned").remove(&id);
        if removed.is_some() {
            tracing::trace!(target: "viz.texture_pool", id = id.0, "released texture slot");
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("texture pool mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> SliceImage {
        SliceImage { width: 2, height: 2, rgba: vec![[0, 0, 0, 255]; 4] }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let pool = TexturePool::new();
        let id = pool.insert(image());
        assert_eq!(pool.get(id).unwrap().width, 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn release_drops_the_pool_slot() {
        let pool = TexturePool::new();
        let id = pool.insert(image());
        pool.release(id);
        assert!(pool.get(id).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn ref_count_reflects_outstanding_handles() {
        let pool = TexturePool::new();
        let id = pool.insert(image());
        assert_eq!(pool.ref_count(id), 1);
        let held = pool.get(id).unwrap();
        assert_eq!(pool.ref_count(id), 2);
        drop(held);
        assert_eq!(pool.ref_count(id), 1);
    }

    #[test]
    fn distinct_inserts_get_distinct_ids() {
        let pool = TexturePool::new();
        let a = pool.insert(image());
        let b = pool.insert(image());
        assert_ne!(a, b);
    }
}
