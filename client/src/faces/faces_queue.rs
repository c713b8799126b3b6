//! Disk cache in front of the network queue.
//!
//! Every request is first looked up in the [`ImageCache`] on a dedicated
//! worker thread. Misses fall through to the [`AskfaceFaceQueue`]; images the
//! server sends are written back to the cache on the same worker.

use std::{
    collections::HashMap,
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError, RwLock},
    thread::{self, JoinHandle},
};

use super::{
    askface_queue::AskfaceFaceQueue,
    decoder::FaceDecoder,
    face::{Face, FaceImages},
    face_queue::{FaceQueueListener, FaceQueueListeners},
    image_cache::ImageCache,
};

/// A unit of work for the cache worker.
enum CacheJob {
    /// Look up the face stored under `num` in the pending table.
    Load { num: u32, generation: u64 },
    /// Store encoded image data received from the server.
    Save {
        name: String,
        checksum: u32,
        data: Vec<u8>,
    },
    /// Acknowledge once every earlier job ran.
    Flush(mpsc::Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct DiskState {
    /// Faces with a queued disk lookup. Holds the latest snapshot per number.
    pending_loads: HashMap<u32, Face>,
    generation: u64,
}

/// Decides whether a face loaded from the network is still current and may
/// be written to the disk cache.
pub type WriteBackCheck = Arc<dyn Fn(&Face) -> bool + Send + Sync>;

struct Shared {
    listeners: FaceQueueListeners,
    state: Mutex<DiskState>,
    tx: Mutex<mpsc::Sender<CacheJob>>,
    write_back_check: RwLock<Option<WriteBackCheck>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, DiskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    fn may_write_back(&self, face: &Face) -> bool {
        let check = self
            .write_back_check
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        check.is_none_or(|check| check(face))
    }

    fn send(&self, job: CacheJob) -> bool {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.send(job) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send job to face cache worker: {e}");
                false
            }
        }
    }
}

/// Forwards network results upward and writes successful ones to the cache.
struct NetworkResults {
    shared: Arc<Shared>,
}

impl FaceQueueListener for NetworkResults {
    fn face_loaded(&self, face: &Face, images: &Arc<FaceImages>) {
        self.shared.listeners.fire_loaded(face, images);

        // Placeholder names are only valid within one session.
        if !face.is_named() {
            return;
        }
        if !self.shared.may_write_back(face) {
            log::debug!(
                "Not caching image for face {} ({}): definition changed",
                face.num(),
                face.name()
            );
            return;
        }
        if let Some(data) = images.source() {
            self.shared.send(CacheJob::Save {
                name: face.name().to_string(),
                checksum: face.checksum(),
                data: data.to_vec(),
            });
        }
    }

    fn face_failed(&self, face: &Face) {
        self.shared.listeners.fire_failed(face);
    }
}

/// Loads faces from the disk cache, falling back to the server.
pub struct FacesQueue {
    askface: Arc<AskfaceFaceQueue>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FacesQueue {
    /// Starts the cache worker thread.
    ///
    /// # Arguments
    /// * `cache` - Store for encoded images.
    /// * `decoder` - Decoder for cached data.
    /// * `askface` - Network queue used on cache misses.
    pub fn new(
        cache: Arc<dyn ImageCache>,
        decoder: Arc<dyn FaceDecoder>,
        askface: Arc<AskfaceFaceQueue>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            listeners: FaceQueueListeners::default(),
            state: Mutex::new(DiskState::default()),
            tx: Mutex::new(tx),
            write_back_check: RwLock::new(None),
        });

        askface.add_listener(Arc::new(NetworkResults {
            shared: shared.clone(),
        }));

        let worker = CacheWorker {
            cache,
            decoder,
            askface: askface.clone(),
            shared: shared.clone(),
        };
        let handle = thread::Builder::new()
            .name("face-cache".to_string())
            .spawn(move || worker.run(rx))
            .expect("Failed to spawn face cache worker thread");

        log::info!("Face cache worker started");

        Self {
            askface,
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FaceQueueListener>) {
        self.shared.listeners.add(listener);
    }

    /// Installs the check consulted before an image received from the server
    /// is written to the disk cache. Listeners run before the check.
    pub fn set_write_back_check(&self, check: WriteBackCheck) {
        *self
            .shared
            .write_back_check
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(check);
    }

    /// The network queue behind the disk cache.
    pub fn askface_queue(&self) -> &Arc<AskfaceFaceQueue> {
        &self.askface
    }

    /// Requests the images of `face`.
    ///
    /// Unnamed faces and faces already waiting for the server skip the disk
    /// lookup. A second request while a lookup is queued only replaces the
    /// snapshot the lookup will use.
    pub fn load_face(&self, face: Face) {
        if !face.is_named() || self.askface.is_pending(face.num()) {
            self.askface.load_face(face);
            return;
        }

        let num = face.num();
        let generation = {
            let mut state = self.shared.lock_state();
            if state.pending_loads.insert(num, face).is_some() {
                return;
            }
            state.generation
        };

        if !self.shared.send(CacheJob::Load { num, generation }) {
            let face = self.shared.lock_state().pending_loads.remove(&num);
            if let Some(face) = face {
                self.askface.load_face(face);
            }
        }
    }

    /// Handles an `image2` answer from the server.
    pub fn face_received(&self, num: u32, face_set: u8, data: &[u8]) {
        self.askface.face_received(num, face_set, data);
    }

    /// Drops all pending work. Disk lookups queued before the call are
    /// skipped; the disk cache itself is kept.
    pub fn reset(&self) {
        self.askface.reset();
        let mut state = self.shared.lock_state();
        state.pending_loads.clear();
        state.generation += 1;
    }

    /// Blocks until the worker has processed every job queued so far.
    ///
    /// # Returns
    /// * `Ok(())` once the flush is acknowledged.
    /// * `Err` if the worker has already exited.
    pub fn flush(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = mpsc::channel();
        if !self.shared.send(CacheJob::Flush(ack_tx)) {
            return Err("Face cache flush: worker not running".to_string());
        }
        ack_rx
            .recv()
            .map_err(|_| "Face cache flush: channel closed".to_string())
    }

    /// Stops the worker thread after it finished the queued jobs.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.shared.send(CacheJob::Shutdown);
            if let Err(e) = handle.join() {
                log::error!("Face cache worker panicked: {e:?}");
            }
        }
    }
}

impl Drop for FacesQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CacheWorker {
    cache: Arc<dyn ImageCache>,
    decoder: Arc<dyn FaceDecoder>,
    askface: Arc<AskfaceFaceQueue>,
    shared: Arc<Shared>,
}

impl CacheWorker {
    fn run(self, rx: mpsc::Receiver<CacheJob>) {
        while let Ok(job) = rx.recv() {
            match job {
                CacheJob::Load { num, generation } => self.load(num, generation),
                CacheJob::Save {
                    name,
                    checksum,
                    data,
                } => self.cache.save(&name, checksum, &data),
                CacheJob::Flush(ack) => {
                    let _ = ack.send(());
                }
                CacheJob::Shutdown => {
                    log::info!("Face cache worker shutting down");
                    break;
                }
            }
        }
    }

    fn load(&self, num: u32, generation: u64) {
        let face = {
            let mut state = self.shared.lock_state();
            if state.generation != generation {
                log::debug!("Skipping stale disk lookup for face {num}");
                return;
            }
            state.pending_loads.remove(&num)
        };
        let Some(face) = face else {
            return;
        };

        let data = self.cache.load(face.name(), face.checksum());

        // A reset may have happened during the lookup.
        if !self.shared.is_current(generation) {
            log::debug!("Dropping disk lookup for face {num} finished after reset");
            return;
        }

        let Some(data) = data else {
            self.askface.load_face(face);
            return;
        };

        match self.decoder.decode(&data) {
            Ok(images) => {
                log::debug!("Face {num} ({}) loaded from disk cache", face.name());
                self.shared.listeners.fire_loaded(&face, &Arc::new(images));
            }
            Err(e) => {
                log::warn!(
                    "Ignoring corrupt cached image for face {num} ({}): {e}",
                    face.name()
                );
                self.askface.load_face(face);
            }
        }
    }
}
