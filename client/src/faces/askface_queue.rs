use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use cf_core::constants::MAX_FACE_NUM;

use super::{
    decoder::FaceDecoder,
    face::Face,
    face_queue::{FaceQueueListener, FaceQueueListeners},
};
use crate::network::AskfaceSender;

#[derive(Default)]
struct PendingState {
    /// Every requested face that has not been answered yet.
    pending_faces: HashMap<u32, Face>,
    /// The subset of `pending_faces` with an askface on the wire.
    pending_askfaces: HashSet<u32>,
    /// The keys of `pending_faces`, most recently requested first.
    pending_faces_queue: VecDeque<u32>,
}

impl PendingState {
    /// Marks queued faces as in flight until `limit` is reached and returns
    /// the numbers to send, in queue order.
    fn next_askfaces(&mut self, limit: usize) -> Vec<u32> {
        let mut to_send = Vec::new();
        for &num in &self.pending_faces_queue {
            if self.pending_askfaces.len() >= limit {
                break;
            }
            if self.pending_askfaces.insert(num) {
                to_send.push(num);
            }
        }
        to_send
    }

    fn move_to_front(&mut self, num: u32) {
        if let Some(pos) = self.pending_faces_queue.iter().position(|&n| n == num) {
            self.pending_faces_queue.remove(pos);
        }
        self.pending_faces_queue.push_front(num);
    }
}

/// Requests faces from the server with "askface" commands.
///
/// At most `concurrent_limit` requests await an answer at any time; further
/// requests wait in a queue that serves the most recently requested face
/// first. Requests are never cancelled.
pub struct AskfaceFaceQueue {
    sender: Arc<dyn AskfaceSender>,
    decoder: Arc<dyn FaceDecoder>,
    concurrent_limit: usize,
    state: Mutex<PendingState>,
    listeners: FaceQueueListeners,
}

impl AskfaceFaceQueue {
    /// # Arguments
    /// * `sender` - Connection used to send askface commands.
    /// * `decoder` - Decoder applied to the received image data.
    /// * `concurrent_limit` - Maximum number of unanswered askface commands; at least 1.
    pub fn new(
        sender: Arc<dyn AskfaceSender>,
        decoder: Arc<dyn FaceDecoder>,
        concurrent_limit: usize,
    ) -> Self {
        Self {
            sender,
            decoder,
            concurrent_limit: concurrent_limit.max(1),
            state: Mutex::new(PendingState::default()),
            listeners: FaceQueueListeners::default(),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn FaceQueueListener>) {
        self.listeners.add(listener);
    }

    fn lock_state(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests the image of `face`.
    ///
    /// Invalid face numbers fail immediately without network traffic. A face
    /// that is already pending only moves to the front of the queue.
    pub fn load_face(&self, face: Face) {
        let num = face.num();
        if num == 0 || num > MAX_FACE_NUM {
            log::warn!("Not requesting invalid face number {num}");
            self.listeners.fire_failed(&face);
            return;
        }

        let to_send = {
            let mut state = self.lock_state();
            if state.pending_faces.insert(num, face).is_some() {
                state.move_to_front(num);
                return;
            }
            state.pending_faces_queue.push_front(num);
            state.next_askfaces(self.concurrent_limit)
        };
        self.send_askfaces(&to_send);
    }

    fn send_askfaces(&self, nums: &[u32]) {
        for &num in nums {
            log::debug!("send askface face={num}");
            self.sender.send_askface(num);
        }
    }

    /// Handles the server's answer to an askface command.
    ///
    /// # Arguments
    /// * `num` - The face number.
    /// * `face_set` - The face set the image belongs to; only logged.
    /// * `data` - The encoded image.
    pub fn face_received(&self, num: u32, face_set: u8, data: &[u8]) {
        let (face, to_send) = {
            let mut state = self.lock_state();
            let face = if state.pending_askfaces.remove(&num) {
                state.pending_faces_queue.retain(|&n| n != num);
                state.pending_faces.remove(&num)
            } else {
                None
            };
            (face, state.next_askfaces(self.concurrent_limit))
        };

        self.send_askfaces(&to_send);

        match face {
            Some(face) => {
                log::debug!(
                    "recv image2 face={num} set={face_set} len={}",
                    data.len()
                );
                self.process_face_data(&face, data);
            }
            None => log::warn!("Received unexpected image for face {num}"),
        }
    }

    fn process_face_data(&self, face: &Face, data: &[u8]) {
        match self.decoder.decode(data) {
            Ok(images) => self.listeners.fire_loaded(face, &Arc::new(images)),
            Err(e) => {
                log::warn!("Invalid image data for face {}: {e}", face.num());
                self.listeners.fire_failed(face);
            }
        }
    }

    /// Forgets all pending requests. Answers to requests sent before the
    /// reset are treated as unexpected.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.pending_faces.clear();
        state.pending_askfaces.clear();
        state.pending_faces_queue.clear();
    }

    pub fn is_pending(&self, num: u32) -> bool {
        self.lock_state().pending_faces.contains_key(&num)
    }

    /// Number of askface commands awaiting an answer.
    pub fn in_flight_count(&self) -> usize {
        self.lock_state().pending_askfaces.len()
    }

    /// Number of requests not yet sent to the server.
    pub fn queued_count(&self) -> usize {
        let state = self.lock_state();
        state.pending_faces.len() - state.pending_askfaces.len()
    }

    /// Pending face numbers in queue order, most recently requested first.
    pub fn queue_order(&self) -> Vec<u32> {
        self.lock_state().pending_faces_queue.iter().copied().collect()
    }
}
