// SPDX-License-Identifier: MPL-2.0

//! Streaming orchestrator
//!
//! Owns the recording lifecycle: processor threads pull camera frames from
//! the unprocessed queue, run the transform, and hand them to writer
//! threads (one per output shard) that serialize them to disk. Shutdown
//! drains both queues so frames in flight are never lost, then commits
//! every shard and flushes the audio side-channel as a WAVE file.

use crate::audio::{write_wav, AudioInterface};
use crate::buffer::{RawBufferPool, RawImageBuffer};
use crate::config::StreamSettings;
use crate::constants::{
    PROCESS_DEQUEUE_TIMEOUT, SOUND_CHANNEL_COUNT, SOUND_SAMPLE_RATE_HZ, WRITE_DEQUEUE_TIMEOUT,
};
use crate::container::ContainerWriter;
use crate::errors::TransformError;
use crate::metadata::CameraMetadata;
use crate::queue::FrameQueue;
use crate::transform::Transformer;
use std::fs::File;
use std::io::BufWriter;
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Everything `start` needs beyond the crop/bin settings
pub struct StartOptions {
    /// Pre-opened writable descriptors, one container shard each
    pub video_fds: Vec<OwnedFd>,
    /// Pre-opened writable descriptor for the audio WAVE file
    pub audio_fd: Option<OwnedFd>,
    /// Audio capture layer; started at 48 kHz stereo, pulled once on stop
    pub audio: Option<Arc<dyn AudioInterface>>,
    /// Compress frame payloads with BNZP16
    pub compression: bool,
    /// Processor thread count; clamped to at least 1
    pub process_threads: usize,
    /// Sensor description written into every shard header
    pub camera_metadata: CameraMetadata,
}

/// State shared between the control surface and the worker threads
struct Shared {
    running: AtomicBool,
    unprocessed: FrameQueue<RawImageBuffer>,
    ready: FrameQueue<RawImageBuffer>,
    pool: Arc<RawBufferPool>,
    accepted_frames: AtomicU64,
    written_frames: AtomicU64,
    written_bytes: AtomicU64,
    dropped_frames: AtomicU64,
    /// Processor threads still inside their consume loop; writers gate
    /// their final drain on this reaching zero
    processors_active: AtomicUsize,
    /// Keeps processor threads idle without stopping them; exercises the
    /// writer-side drain path
    processor_hold: AtomicBool,
}

/// Real-time RAW frame streamer
pub struct RawBufferStreamer {
    shared: Arc<Shared>,
    settings: Mutex<StreamSettings>,
    start_time: Mutex<Option<Instant>>,
    process_threads: Mutex<Vec<JoinHandle<()>>>,
    writer_threads: Mutex<Vec<JoinHandle<()>>>,
    audio: Mutex<Option<Arc<dyn AudioInterface>>>,
    audio_fd: Mutex<Option<OwnedFd>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl RawBufferStreamer {
    /// Create a streamer over an injected buffer pool
    pub fn new(pool: Arc<RawBufferPool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                unprocessed: FrameQueue::new(),
                ready: FrameQueue::new(),
                pool,
                accepted_frames: AtomicU64::new(0),
                written_frames: AtomicU64::new(0),
                written_bytes: AtomicU64::new(0),
                dropped_frames: AtomicU64::new(0),
                processors_active: AtomicUsize::new(0),
                processor_hold: AtomicBool::new(false),
            }),
            settings: Mutex::new(StreamSettings::default()),
            start_time: Mutex::new(None),
            process_threads: Mutex::new(Vec::new()),
            writer_threads: Mutex::new(Vec::new()),
            audio: Mutex::new(None),
            audio_fd: Mutex::new(None),
        }
    }

    /// Set the crop percentages. Ignored while a recording is running.
    pub fn set_crop_amount(&self, width_pct: u32, height_pct: u32) {
        if self.is_running() {
            return;
        }
        let mut settings = lock(&self.settings);
        settings.crop_width_pct = width_pct.min(100);
        settings.crop_height_pct = height_pct.min(100);
    }

    /// Enable or disable 2x2 binning. Ignored while a recording is running.
    pub fn set_bin(&self, bin: bool) {
        if self.is_running() {
            return;
        }
        lock(&self.settings).bin = bin;
    }

    /// Apply crop and bin from a settings struct. Ignored while running.
    pub fn apply_settings(&self, settings: &StreamSettings) {
        let clamped = settings.clamped();
        self.set_crop_amount(clamped.crop_width_pct, clamped.crop_height_pct);
        self.set_bin(clamped.bin);
    }

    /// Spin up the pipeline. An empty fd set logs and leaves the streamer
    /// stopped; a running streamer is stopped and restarted.
    pub fn start(&self, options: StartOptions) {
        self.stop();

        if options.video_fds.is_empty() {
            warn!("No output file descriptors, streamer not started");
            return;
        }

        let shared = &self.shared;
        shared.accepted_frames.store(0, Ordering::Relaxed);
        shared.written_frames.store(0, Ordering::Relaxed);
        shared.written_bytes.store(0, Ordering::Relaxed);
        shared.dropped_frames.store(0, Ordering::Relaxed);
        *lock(&self.start_time) = Some(Instant::now());

        let settings = *lock(&self.settings);
        let transformer = Transformer::new(
            settings.crop_width_pct,
            settings.crop_height_pct,
            settings.bin,
            options.compression,
        );

        let process_threads = options.process_threads.max(1);
        shared.running.store(true, Ordering::SeqCst);
        shared.processors_active.store(process_threads, Ordering::SeqCst);

        if let (Some(audio), Some(fd)) = (options.audio, options.audio_fd) {
            audio.start(SOUND_SAMPLE_RATE_HZ, SOUND_CHANNEL_COUNT);
            *lock(&self.audio) = Some(audio);
            *lock(&self.audio_fd) = Some(fd);
        }

        let shard_count = options.video_fds.len() as u16;
        info!(
            shards = shard_count,
            processors = process_threads,
            compression = options.compression,
            bin = settings.bin,
            "Streamer starting"
        );

        let mut writers = lock(&self.writer_threads);
        for (index, fd) in options.video_fds.into_iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            let camera = options.camera_metadata.clone();
            let file = File::from(fd);
            writers.push(std::thread::spawn(move || {
                write_loop(shared, transformer, file, camera, index as u16, shard_count);
            }));
        }
        drop(writers);

        let mut processors = lock(&self.process_threads);
        for _ in 0..process_threads {
            let shared = Arc::clone(&self.shared);
            processors.push(std::thread::spawn(move || {
                process_loop(shared, transformer);
            }));
        }
    }

    /// Submit a frame from the camera layer
    pub fn add(&self, buffer: RawImageBuffer) {
        self.shared.unprocessed.enqueue(buffer);
        self.shared.accepted_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop the pipeline: flush audio, drain both queues through the
    /// writer threads, commit every shard
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(audio) = lock(&self.audio).take() {
            audio.stop();
            let samples = audio.take_samples();
            if let Some(fd) = lock(&self.audio_fd).take() {
                let file = File::from(fd);
                match write_wav(
                    BufWriter::new(file),
                    &samples,
                    audio.sample_rate(),
                    audio.channels(),
                ) {
                    Ok(()) => info!(samples = samples.len(), "Audio track written"),
                    Err(e) => warn!(error = %e, "Failed to write audio track"),
                }
            }
        }

        for handle in lock(&self.process_threads).drain(..) {
            if let Err(e) = handle.join() {
                warn!("Processor thread panicked: {:?}", e);
            }
        }
        for handle in lock(&self.writer_threads).drain(..) {
            if let Err(e) = handle.join() {
                warn!("Writer thread panicked: {:?}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Accepted frames per second since `start`
    pub fn estimate_fps(&self) -> f32 {
        let started = *lock(&self.start_time);
        match started {
            Some(at) => {
                let elapsed = at.elapsed().as_secs_f32();
                self.shared.accepted_frames.load(Ordering::Relaxed) as f32 / (1e-5 + elapsed)
            }
            None => 0.0,
        }
    }

    /// Payload bytes persisted across all shards
    pub fn written_bytes(&self) -> u64 {
        self.shared.written_bytes.load(Ordering::Relaxed)
    }

    /// Frames persisted across all shards
    pub fn written_frames(&self) -> u64 {
        self.shared.written_frames.load(Ordering::Relaxed)
    }

    /// Frames submitted through `add`
    pub fn accepted_frames(&self) -> u64 {
        self.shared.accepted_frames.load(Ordering::Relaxed)
    }

    /// Frames abandoned because their transform failed
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Keep processor threads idle without stopping them, forcing frames
    /// to drain through the writer threads on stop.
    #[doc(hidden)]
    pub fn set_processor_hold(&self, hold: bool) {
        self.shared.processor_hold.store(hold, Ordering::SeqCst);
    }
}

impl Drop for RawBufferStreamer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process_loop(shared: Arc<Shared>, transformer: Transformer) {
    debug!("Processor thread started");
    while shared.running.load(Ordering::Acquire) {
        if shared.processor_hold.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }
        if let Some(mut buffer) = shared.unprocessed.dequeue_timeout(PROCESS_DEQUEUE_TIMEOUT) {
            match transformer.process(&mut buffer) {
                Ok(()) => shared.ready.enqueue(buffer),
                Err(TransformError::UnsupportedFormat(msg)) => {
                    warn!(%msg, "Forwarding frame untransformed");
                    shared.ready.enqueue(buffer);
                }
                Err(e) => {
                    warn!(error = %e, "Dropping frame");
                    shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    shared.pool.recycle(buffer);
                }
            }
        }
    }
    shared.processors_active.fetch_sub(1, Ordering::AcqRel);
    debug!("Processor thread exiting");
}

fn write_loop(
    shared: Arc<Shared>,
    transformer: Transformer,
    file: File,
    camera: CameraMetadata,
    shard_index: u16,
    shard_count: u16,
) {
    raise_writer_priority();

    let mut container = match ContainerWriter::create(file, &camera, shard_index, shard_count) {
        Ok(container) => container,
        Err(e) => {
            error!(shard = shard_index, error = %e, "Failed to open container shard");
            return;
        }
    };

    while shared.running.load(Ordering::Acquire) {
        if let Some(buffer) = shared.ready.dequeue_timeout(WRITE_DEQUEUE_TIMEOUT) {
            persist(&shared, &mut container, buffer);
        }
    }

    // Drain protocol. Keep servicing the ready queue until every processor
    // has left its loop; a frame mid-transform can still arrive there.
    while shared.processors_active.load(Ordering::Acquire) > 0 {
        if let Some(buffer) = shared.ready.dequeue_timeout(Duration::from_millis(5)) {
            persist(&shared, &mut container, buffer);
        }
    }
    while let Some(buffer) = shared.ready.try_dequeue() {
        persist(&shared, &mut container, buffer);
    }
    // Frames the processors never reached: transform here in the writer
    while let Some(mut buffer) = shared.unprocessed.try_dequeue() {
        match transformer.process(&mut buffer) {
            Ok(()) => persist(&shared, &mut container, buffer),
            Err(TransformError::UnsupportedFormat(_)) => {
                persist(&shared, &mut container, buffer)
            }
            Err(e) => {
                warn!(error = %e, "Dropping frame during drain");
                shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
                shared.pool.recycle(buffer);
            }
        }
    }

    if let Err(e) = container.commit() {
        error!(shard = shard_index, error = %e, "Shard commit failed");
    }
    debug!(shard = shard_index, "Writer thread exiting");
}

fn persist(shared: &Shared, container: &mut ContainerWriter, mut buffer: RawImageBuffer) {
    match container.add(&mut buffer, true) {
        Ok(0) => {} // skipped by the container's format check
        Ok(bytes) => {
            shared.written_bytes.fetch_add(bytes, Ordering::Relaxed);
            shared.written_frames.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            warn!(error = %e, "Failed to append frame"); // shard went dead
        }
    }
    shared.pool.recycle(buffer);
}

/// Request the highest real-time priority the platform allows for the
/// calling writer thread. Denial only costs scheduling headroom, so the
/// failure is logged and ignored.
#[cfg(unix)]
fn raise_writer_priority() {
    unsafe {
        let priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        let param = libc::sched_param {
            sched_priority: if priority > 0 { priority } else { 0 },
        };
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc != 0 {
            debug!(rc, "Realtime priority unavailable for writer thread");
        }
    }
}

#[cfg(not(unix))]
fn raise_writer_priority() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fd_set_is_noop() {
        let streamer = RawBufferStreamer::new(Arc::new(RawBufferPool::new()));
        streamer.start(StartOptions {
            video_fds: Vec::new(),
            audio_fd: None,
            audio: None,
            compression: false,
            process_threads: 2,
            camera_metadata: CameraMetadata::default(),
        });
        assert!(!streamer.is_running());
        assert_eq!(streamer.estimate_fps(), 0.0);
    }

    #[test]
    fn test_settings_guarded_while_running() {
        let streamer = RawBufferStreamer::new(Arc::new(RawBufferPool::new()));
        streamer.set_crop_amount(10, 20);
        streamer.set_bin(true);
        {
            let settings = lock(&streamer.settings);
            assert_eq!(settings.crop_width_pct, 10);
            assert_eq!(settings.crop_height_pct, 20);
            assert!(settings.bin);
        }

        // Fake a running pipeline: setters must be ignored
        streamer.shared.running.store(true, Ordering::SeqCst);
        streamer.set_crop_amount(50, 50);
        streamer.set_bin(false);
        streamer.shared.running.store(false, Ordering::SeqCst);

        let settings = lock(&streamer.settings);
        assert_eq!(settings.crop_width_pct, 10);
        assert!(settings.bin);
    }

    #[test]
    fn test_crop_percentages_clamped() {
        let streamer = RawBufferStreamer::new(Arc::new(RawBufferPool::new()));
        streamer.set_crop_amount(500, 101);
        let settings = lock(&streamer.settings);
        assert_eq!(settings.crop_width_pct, 100);
        assert_eq!(settings.crop_height_pct, 100);
    }

    #[test]
    fn test_stop_without_start() {
        let streamer = RawBufferStreamer::new(Arc::new(RawBufferPool::new()));
        streamer.stop();
        assert!(!streamer.is_running());
        assert_eq!(streamer.written_bytes(), 0);
    }
}
