use std::sync::{Arc, PoisonError, RwLock};

use super::face::{Face, FaceImages};

/// Receives the outcome of a face request.
pub trait FaceQueueListener: Send + Sync {
    fn face_loaded(&self, face: &Face, images: &Arc<FaceImages>);
    fn face_failed(&self, face: &Face);
}

/// The listeners of one queue.
///
/// Notifications iterate over a copy of the list, so listeners may register
/// further listeners or issue new requests while being notified.
#[derive(Default)]
pub struct FaceQueueListeners {
    listeners: RwLock<Vec<Arc<dyn FaceQueueListener>>>,
}

impl FaceQueueListeners {
    pub fn add(&self, listener: Arc<dyn FaceQueueListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn snapshot(&self) -> Vec<Arc<dyn FaceQueueListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fire_loaded(&self, face: &Face, images: &Arc<FaceImages>) {
        for listener in self.snapshot() {
            listener.face_loaded(face, images);
        }
    }

    pub fn fire_failed(&self, face: &Face) {
        for listener in self.snapshot() {
            listener.face_failed(face);
        }
    }
}
