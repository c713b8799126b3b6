use std::{
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use cf_core::constants::EMPTY_FACE;

use super::{
    askface_queue::AskfaceFaceQueue,
    decoder::{load_face_images, FaceDecoder, PngFaceDecoder},
    face::{DecodedImage, Face, FaceImages},
    face_cache::FaceCache,
    face_queue::FaceQueueListener,
    faces_queue::FacesQueue,
    image_cache::FileCache,
};
use crate::{network::AskfaceSender, settings::FaceSettings};

/// Notified when a face changes from unresolved to loaded or unknown.
pub trait FacesManagerListener: Send + Sync {
    fn face_updated(&self, face: &Face);
}

type ManagerListeners = Arc<RwLock<Vec<Arc<dyn FacesManagerListener>>>>;

/// Applies queue results to the face cache and notifies once per transition.
struct CacheUpdater {
    face_cache: Arc<FaceCache>,
    unknown_images: Arc<FaceImages>,
    listeners: ManagerListeners,
}

impl CacheUpdater {
    fn fire_updated(&self, face: &Face) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.face_updated(face);
        }
    }
}

impl FaceQueueListener for CacheUpdater {
    fn face_loaded(&self, face: &Face, images: &Arc<FaceImages>) {
        if let Some(updated) = self.face_cache.resolve(face, images.clone(), false) {
            self.fire_updated(&updated);
        }
    }

    fn face_failed(&self, face: &Face) {
        if let Some(updated) = self
            .face_cache
            .resolve(face, self.unknown_images.clone(), true)
        {
            self.fire_updated(&updated);
        }
    }
}

/// Entry point of the face pipeline.
///
/// Hands out faces by number without ever blocking: a face whose images are
/// not resident yet comes back as an unknown placeholder while the images are
/// loaded in the background. Listeners learn about the real images through
/// [`FacesManagerListener::face_updated`].
pub struct FacesManager {
    face_cache: Arc<FaceCache>,
    faces_queue: FacesQueue,
    empty_face: Face,
    unknown_images: Arc<FaceImages>,
    listeners: ManagerListeners,
}

impl FacesManager {
    /// Builds the complete pipeline described by `settings`.
    ///
    /// # Arguments
    /// * `settings` - Cache location, size limits and request concurrency.
    /// * `sender` - Connection used for askface commands.
    pub fn new(settings: &FaceSettings, sender: Arc<dyn AskfaceSender>) -> Self {
        let decoder: Arc<dyn FaceDecoder> = Arc::new(PngFaceDecoder);
        let askface = Arc::new(AskfaceFaceQueue::new(
            sender,
            decoder.clone(),
            settings.concurrent_askface_limit,
        ));
        let file_cache = Arc::new(FileCache::new(
            &settings.cache_dir,
            settings.max_cached_file_size,
        ));
        log::info!("Face cache directory: {}", settings.cache_dir.display());

        let unknown_images = match &settings.unknown_image {
            Some(path) => load_unknown_images(path, decoder.as_ref()),
            None => FaceImages::unknown(),
        };

        let faces_queue = FacesQueue::new(file_cache, decoder, askface);
        Self::with_queue(Arc::new(FaceCache::new()), faces_queue, Arc::new(unknown_images))
    }

    /// Builds a manager around pre-built parts.
    pub fn with_queue(
        face_cache: Arc<FaceCache>,
        faces_queue: FacesQueue,
        unknown_images: Arc<FaceImages>,
    ) -> Self {
        let listeners: ManagerListeners = Arc::new(RwLock::new(Vec::new()));
        faces_queue.add_listener(Arc::new(CacheUpdater {
            face_cache: face_cache.clone(),
            unknown_images: unknown_images.clone(),
            listeners: listeners.clone(),
        }));

        // Only images of the face's current definition go to disk.
        let current = face_cache.clone();
        faces_queue.set_write_back_check(Arc::new(move |face: &Face| {
            current
                .get(face.num())
                .is_some_and(|entry| entry.same_identity(face) && !entry.is_unknown())
        }));

        let empty_face = Face::new(EMPTY_FACE, "empty", 0, 0)
            .with_images(Arc::new(FaceImages::empty()), false);

        Self {
            face_cache,
            faces_queue,
            empty_face,
            unknown_images,
            listeners,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FacesManagerListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn FacesManagerListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Returns the face for `num`.
    ///
    /// Face 0 is the transparent empty face and never causes I/O. A face
    /// without resident images is requested and returned as an unknown
    /// placeholder.
    pub fn get_face(&self, num: u32) -> Face {
        if num == EMPTY_FACE {
            return self.empty_face.clone();
        }

        let face = self.face_cache.get_or_insert_placeholder(num);
        if face.images().is_some() {
            return face;
        }

        let placeholder = face.with_images(self.unknown_images.clone(), true);
        self.faces_queue.load_face(face);
        placeholder
    }

    /// Like [`get_face`](Self::get_face), but `None` for the empty face.
    pub fn get_face2(&self, num: u32) -> Option<Face> {
        if num == EMPTY_FACE {
            None
        } else {
            Some(self.get_face(num))
        }
    }

    pub fn get_original_image(&self, num: u32) -> DecodedImage {
        self.images_of(num).original().clone()
    }

    pub fn get_scaled_image(&self, num: u32) -> DecodedImage {
        self.images_of(num).scaled().clone()
    }

    pub fn get_magic_map_image(&self, num: u32) -> DecodedImage {
        self.images_of(num).magic_map().clone()
    }

    fn images_of(&self, num: u32) -> Arc<FaceImages> {
        self.get_face(num)
            .images()
            .cloned()
            .unwrap_or_else(|| self.unknown_images.clone())
    }

    /// Handles a `face2` definition from the server.
    ///
    /// The face is redefined unless the same name and checksum are already
    /// known. An unresolved previous definition is requested again under the
    /// new one so that waiting listeners still get their update.
    pub fn face_info_received(&self, num: u32, face_set: u8, checksum: u32, name: &str) {
        log::debug!("recv face2 face={num} set={face_set} checksum={checksum} name={name}");
        if num == EMPTY_FACE {
            return;
        }

        let previous = self.face_cache.get(num);
        if let Some(previous) = &previous {
            if previous.is_named() && previous.name() == name && previous.checksum() == checksum {
                return;
            }
        }

        let face = Face::new(num, name, checksum, self.face_cache.generation());
        self.face_cache.put(face.clone());

        let was_unresolved = previous.is_some_and(|p| p.images().is_none());
        if was_unresolved {
            self.faces_queue.load_face(face);
        }
    }

    /// Handles an `image2` answer from the server.
    pub fn face_received(&self, num: u32, face_set: u8, data: &[u8]) {
        self.faces_queue.face_received(num, face_set, data);
    }

    /// Forgets every face and all pending requests, e.g. when connecting to
    /// another server.
    pub fn reset(&self) {
        log::info!("Resetting faces");
        self.face_cache.reset();
        self.faces_queue.reset();
    }

    /// Waits until queued disk lookups and cache writes are done.
    pub fn flush_cache(&self) -> Result<(), String> {
        self.faces_queue.flush()
    }

    pub fn face_cache(&self) -> &Arc<FaceCache> {
        &self.face_cache
    }

    pub fn faces_queue(&self) -> &FacesQueue {
        &self.faces_queue
    }
}

fn load_unknown_images(path: &Path, decoder: &dyn FaceDecoder) -> FaceImages {
    match load_face_images(path, decoder) {
        Ok(images) => images,
        Err(e) => {
            log::warn!(
                "Cannot load unknown image {}: {e}; using built-in image",
                path.display()
            );
            FaceImages::unknown()
        }
    }
}
