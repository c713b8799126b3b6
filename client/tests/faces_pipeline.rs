use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossfire_client::faces::decoder::encode_png;
use crossfire_client::faces::{
    DecodedImage, Face, FacesManager, FacesManagerListener, FileCache, ImageCache,
};
use crossfire_client::network::client_commands::FramedAskfaceSender;
use crossfire_client::network::server_commands::{
    dispatch_server_command, read_frame, ServerCommand,
};
use crossfire_client::network::AskfaceSender;
use crossfire_client::settings::FaceSettings;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{pid}_{nanos}"))
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<u32>>,
}

impl RecordingSender {
    fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }
}

impl AskfaceSender for RecordingSender {
    fn send_askface(&self, face_num: u32) {
        self.sent.lock().unwrap().push(face_num);
    }
}

#[derive(Default)]
struct RecordingListener {
    updated: Mutex<Vec<Face>>,
}

impl RecordingListener {
    fn updated_nums(&self) -> Vec<u32> {
        self.updated.lock().unwrap().iter().map(Face::num).collect()
    }
}

impl FacesManagerListener for RecordingListener {
    fn face_updated(&self, face: &Face) {
        self.updated.lock().unwrap().push(face.clone());
    }
}

fn settings(dir: &Path) -> FaceSettings {
    FaceSettings {
        cache_dir: dir.join("cache"),
        max_cached_file_size: 64 * 1024,
        concurrent_askface_limit: 8,
        unknown_image: None,
    }
}

fn png(size: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode_png(&DecodedImage::filled(size, size, rgba)).unwrap()
}

fn image2_packet(face: u32, data: &[u8]) -> Vec<u8> {
    let mut packet = b"image2 ".to_vec();
    packet.extend_from_slice(&face.to_be_bytes());
    packet.push(0);
    packet.extend_from_slice(&(data.len() as u32).to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

fn face2_packet(face: u16, checksum: u32, name: &str) -> Vec<u8> {
    let mut packet = b"face2 ".to_vec();
    packet.extend_from_slice(&face.to_be_bytes());
    packet.push(0);
    packet.extend_from_slice(&checksum.to_be_bytes());
    packet.extend_from_slice(name.as_bytes());
    packet
}

fn dispatch(manager: &FacesManager, packet: &[u8]) {
    let command = ServerCommand::parse(packet).unwrap();
    assert!(dispatch_server_command(&command, manager));
}

#[test]
fn ninth_request_is_sent_when_first_answer_arrives() {
    let dir = unique_temp_dir("faces_pipeline_ninth");
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    for num in 101..=109 {
        assert!(manager.get_face(num).is_unknown());
    }
    let sent = sender.sent();
    assert_eq!(sent.len(), 8);
    assert!(!sent.contains(&109));

    dispatch(&manager, &image2_packet(101, &png(64, [0, 255, 0, 255])));

    assert_eq!(sender.sent().len(), 9);
    assert_eq!(sender.sent().last(), Some(&109));
    assert_eq!(listener.updated_nums(), vec![101]);
    assert!(!manager.get_face(101).is_unknown());
    assert_eq!(manager.get_scaled_image(101).width(), 128);
    assert_eq!(manager.get_magic_map_image(101).width(), 8);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn burst_keeps_eight_requests_in_flight() {
    let dir = unique_temp_dir("faces_pipeline_burst");
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());

    for num in 1..=20 {
        manager.get_face(num);
    }
    let askface = manager.faces_queue().askface_queue();
    assert_eq!(askface.in_flight_count(), 8);
    assert_eq!(askface.queued_count(), 12);
    assert_eq!(sender.sent().len(), 8);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn invalid_face_numbers_never_reach_the_server() {
    let dir = unique_temp_dir("faces_pipeline_invalid");
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    let face = manager.get_face(70_000);
    assert!(face.is_unknown());
    assert!(sender.sent().is_empty());
    assert_eq!(listener.updated_nums(), vec![70_000]);
    assert!(manager.get_face(70_000).is_unknown());
    assert!(sender.sent().is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn named_face_is_fetched_once_then_served_from_disk() {
    let dir = unique_temp_dir("faces_pipeline_disk");
    let data = png(32, [10, 20, 30, 255]);

    {
        let sender = Arc::new(RecordingSender::default());
        let manager = FacesManager::new(&settings(&dir), sender.clone());

        dispatch(&manager, &face2_packet(12, 4242, "orc.111"));
        manager.get_face(12);
        manager.flush_cache().unwrap();
        assert_eq!(sender.sent(), vec![12]);

        dispatch(&manager, &image2_packet(12, &data));
        manager.flush_cache().unwrap();

        let cache = FileCache::new(dir.join("cache"), 64 * 1024);
        assert_eq!(cache.load("orc.111", 4242), Some(data.clone()));
    }

    // A new session with the same definition finds the image on disk.
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    dispatch(&manager, &face2_packet(30, 4242, "orc.111"));
    assert!(manager.get_face(30).is_unknown());
    manager.flush_cache().unwrap();

    assert!(sender.sent().is_empty());
    assert_eq!(listener.updated_nums(), vec![30]);
    assert_eq!(manager.get_original_image(30).width(), 32);

    // A different checksum is a different entry.
    dispatch(&manager, &face2_packet(31, 4243, "orc.111"));
    manager.get_face(31);
    manager.flush_cache().unwrap();
    assert_eq!(sender.sent(), vec![31]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn reset_makes_resolved_face_unknown_again() {
    let dir = unique_temp_dir("faces_pipeline_reset");
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    manager.get_face(5);
    dispatch(&manager, &image2_packet(5, &png(16, [1, 1, 1, 255])));
    assert!(!manager.get_face(5).is_unknown());

    manager.reset();
    assert!(manager.get_face(5).is_unknown());
    assert_eq!(sender.sent(), vec![5, 5]);

    // The answer completes the request issued after the reset.
    dispatch(&manager, &image2_packet(5, &png(16, [2, 2, 2, 255])));
    assert_eq!(listener.updated_nums(), vec![5, 5]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_face_is_not_requested() {
    let dir = unique_temp_dir("faces_pipeline_empty");
    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(&settings(&dir), sender.clone());

    let face = manager.get_face(0);
    assert!(!face.is_unknown());
    assert!(manager.get_face2(0).is_none());
    manager.flush_cache().unwrap();
    assert!(sender.sent().is_empty());
    assert!(!dir.join("cache").exists());
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn askface_requests_are_framed_on_the_wire() {
    let dir = unique_temp_dir("faces_pipeline_wire");
    let buffer = SharedBuffer::default();
    let sender = Arc::new(FramedAskfaceSender::new(buffer.clone()));
    let manager = FacesManager::new(&settings(&dir), sender);

    manager.get_face(7);
    manager.get_face(300);

    let written = buffer.0.lock().unwrap().clone();
    let mut stream = written.as_slice();
    assert_eq!(read_frame(&mut stream).unwrap(), b"askface 7");
    assert_eq!(read_frame(&mut stream).unwrap(), b"askface 300");
    assert!(stream.is_empty());

    let _ = fs::remove_dir_all(&dir);
}

/// Hands askface numbers to a server thread and tracks unanswered commands.
struct ChannelSender {
    tx: Mutex<mpsc::Sender<u32>>,
    outstanding: AtomicUsize,
    max_outstanding: AtomicUsize,
}

impl ChannelSender {
    fn new(tx: mpsc::Sender<u32>) -> Self {
        Self {
            tx: Mutex::new(tx),
            outstanding: AtomicUsize::new(0),
            max_outstanding: AtomicUsize::new(0),
        }
    }
}

impl AskfaceSender for ChannelSender {
    fn send_askface(&self, face_num: u32) {
        let outstanding = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_outstanding.fetch_max(outstanding, Ordering::SeqCst);
        let _ = self.tx.lock().unwrap().send(face_num);
    }
}

#[test]
fn concurrent_requests_and_answers_respect_the_limit() {
    let dir = unique_temp_dir("faces_pipeline_threads");
    let (tx, rx) = mpsc::channel();
    let sender = Arc::new(ChannelSender::new(tx));
    let manager = Arc::new(FacesManager::new(&settings(&dir), sender.clone()));
    let listener = Arc::new(RecordingListener::default());
    manager.add_listener(listener.clone());

    let data = png(8, [5, 6, 7, 255]);
    let stop = Arc::new(AtomicBool::new(false));
    let server = {
        let manager = manager.clone();
        let sender = sender.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                if let Ok(num) = rx.recv_timeout(Duration::from_millis(10)) {
                    sender.outstanding.fetch_sub(1, Ordering::SeqCst);
                    manager.face_received(num, 0, &data);
                }
            }
        })
    };

    let getters: Vec<_> = (0..4)
        .map(|i| {
            let manager = manager.clone();
            thread::spawn(move || {
                for num in 1..=100u32 {
                    // Each thread walks the faces from a different start.
                    manager.get_face((num + i * 25 - 1) % 100 + 1);
                }
            })
        })
        .collect();
    for getter in getters {
        getter.join().unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while listener.updated_nums().len() < 100 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    stop.store(true, Ordering::SeqCst);
    server.join().unwrap();

    let mut updated = listener.updated_nums();
    updated.sort_unstable();
    assert_eq!(updated, (1..=100).collect::<Vec<_>>());
    assert!(sender.max_outstanding.load(Ordering::SeqCst) <= 8);
    assert!(manager.faces_queue().askface_queue().in_flight_count() <= 8);
    for num in 1..=100 {
        assert_eq!(manager.get_original_image(num).width(), 8);
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn concurrent_save_and_load_never_see_partial_files() {
    let dir = unique_temp_dir("faces_pipeline_file_race");
    let cache = Arc::new(FileCache::new(&dir, 64 * 1024));
    let small = vec![1u8; 1000];
    let large = vec![2u8; 20_000];

    let writers: Vec<_> = [small.clone(), large.clone()]
        .into_iter()
        .map(|payload| {
            let cache = cache.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    cache.save("troll.111", 77, &payload);
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let (small, large) = (small.clone(), large.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(data) = cache.load("troll.111", 77) {
                        assert!(data == small || data == large, "partial read of {} bytes", data.len());
                    }
                }
            })
        })
        .collect();
    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let last = cache.load("troll.111", 77).unwrap();
    assert!(last == small || last == large);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unknown_image_override_is_used_for_placeholders() {
    let dir = unique_temp_dir("faces_pipeline_unknown_image");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("unknown.png");
    fs::write(&path, png(16, [200, 0, 0, 255])).unwrap();

    let sender = Arc::new(RecordingSender::default());
    let manager = FacesManager::new(
        &FaceSettings {
            unknown_image: Some(path),
            ..settings(&dir)
        },
        sender.clone(),
    );

    let face = manager.get_face(70_000);
    assert!(face.is_unknown());
    assert_eq!(face.images().unwrap().original().width(), 16);
    assert_eq!(manager.get_original_image(5).width(), 16);
    assert_eq!(manager.get_scaled_image(5).width(), 32);
    assert_eq!(sender.sent(), vec![5]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unreadable_unknown_image_falls_back_to_built_in() {
    let dir = unique_temp_dir("faces_pipeline_bad_unknown_image");
    fs::create_dir_all(&dir).unwrap();
    let corrupt = dir.join("corrupt.png");
    fs::write(&corrupt, b"not a png").unwrap();

    for path in [dir.join("missing.png"), corrupt] {
        let manager = FacesManager::new(
            &FaceSettings {
                unknown_image: Some(path),
                ..settings(&dir)
            },
            Arc::new(RecordingSender::default()),
        );
        let face = manager.get_face(70_000);
        assert!(face.is_unknown());
        assert_eq!(face.images().unwrap().original().width(), 64);
    }

    let _ = fs::remove_dir_all(&dir);
}
