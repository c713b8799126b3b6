use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use super::face::{Face, FaceImages};

#[derive(Default)]
struct Inner {
    faces: HashMap<u32, Face>,
    generation: u64,
}

/// In-memory table of the faces known in the current session.
///
/// Pure storage: a miss is a normal outcome and nothing here does I/O.
/// Every [`reset`](FaceCache::reset) starts a new generation so that results
/// belonging to an earlier session can be recognised and dropped.
#[derive(Default)]
pub struct FaceCache {
    inner: RwLock<Inner>,
}

impl FaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, num: u32) -> Option<Face> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.faces.get(&num).cloned()
    }

    /// Stores `face`, replacing any previous entry for its number.
    ///
    /// Faces created for an earlier generation are ignored.
    pub fn put(&self, face: Face) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if face.generation() != inner.generation {
            log::debug!(
                "Ignoring face {} from generation {} (current {})",
                face.num(),
                face.generation(),
                inner.generation
            );
            return;
        }
        inner.faces.insert(face.num(), face);
    }

    /// Returns the entry for `num`, inserting a placeholder first if needed.
    pub fn get_or_insert_placeholder(&self, num: u32) -> Face {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let generation = inner.generation;
        inner
            .faces
            .entry(num)
            .or_insert_with(|| Face::placeholder(num, generation))
            .clone()
    }

    /// Attaches `images` to the entry `face` was taken from.
    ///
    /// # Returns
    /// * The updated snapshot, or `None` if the entry is gone, was redefined,
    ///   belongs to another generation or already has images.
    pub fn resolve(&self, face: &Face, images: Arc<FaceImages>, unknown: bool) -> Option<Face> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.faces.get_mut(&face.num())?;
        if !entry.same_identity(face) || entry.images().is_some() {
            return None;
        }
        *entry = entry.with_images(images, unknown);
        Some(entry.clone())
    }

    /// Forgets every face and starts a new generation.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.faces.clear();
        inner.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .faces
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
