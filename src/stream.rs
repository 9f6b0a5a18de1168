//! Frame-ingest buffer with reconnection. A capture thread feeds a bounded, drop-oldest
//! buffer that the main pipeline thread drains; freshness beats completeness, so a slow
//! consumer sees the newest frames rather than a backlog.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::StreamError;
use crate::types::Frame;

/// The decoder itself — real video I/O, or a deterministic test double — kept behind a
/// trait so reconnection/buffering policy never depends on which one is in use.
pub trait VideoSource: Send {
    fn open(&mut self, url: &str) -> Result<(), StreamError>;
    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError>;
    fn release(&mut self);
}

pub struct OpenCvVideoSource {
    capture: Option<opencv::videoio::VideoCapture>,
    next_frame_number: u64,
}

impl Default for OpenCvVideoSource {
    fn default() -> Self {
        Self { capture: None, next_frame_number: 0 }
    }
}

impl VideoSource for OpenCvVideoSource {
    fn open(&mut self, url: &str) -> Result<(), StreamError> {
        use opencv::prelude::*;
        use opencv::videoio::{VideoCapture, CAP_FFMPEG};
        let cap = VideoCapture::from_file(url, CAP_FFMPEG)
            .map_err(|_| StreamError::OpenFailed { url: url.to_string() })?;
        if !cap.is_opened().unwrap_or(false) {
            return Err(StreamError::OpenFailed { url: url.to_string() });
        }
        self.capture = Some(cap);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        use opencv::core::Mat;
        use opencv::prelude::*;

        let cap = self.capture.as_mut().ok_or(StreamError::ReadFailed)?;
        let mut mat = Mat::default();
        let ok = cap.read(&mut mat).map_err(|_| StreamError::ReadFailed)?;
        if !ok || mat.empty() {
            return Ok(None);
        }

        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        let data = mat.data_bytes().map_err(|_| StreamError::ReadFailed)?.to_vec();

        let frame_number = self.next_frame_number;
        self.next_frame_number += 1;
        Ok(Some(Frame { frame_number, width, height, data }))
    }

    fn release(&mut self) {
        self.capture = None;
    }
}

/// Bounded, drop-oldest queue shared between the capture thread (producer) and the main
/// pipeline thread (consumer).
struct FrameBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<(u64, Frame)>>,
    not_empty: Condvar,
}

impl FrameBuffer {
    fn new(capacity: usize) -> Self {
        Self { capacity, queue: Mutex::new(VecDeque::with_capacity(capacity)), not_empty: Condvar::new() }
    }

    fn push(&self, frame_number: u64, frame: Frame) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back((frame_number, frame));
        self.not_empty.notify_one();
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<(u64, Frame)> {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            let (guard, _) = self.not_empty.wait_timeout(queue, timeout).unwrap();
            queue = guard;
        }
        queue.pop_front()
    }
}

pub struct StreamIngestConfig {
    pub primary_url: String,
    pub backup_url: Option<String>,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub buffer_size: usize,
}

const MAX_CONSECUTIVE_FAILURES: u32 = 30;

pub struct StreamIngest {
    config: StreamIngestConfig,
    buffer: Arc<FrameBuffer>,
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
    fps_bits: Arc<AtomicU64>, // f32 bits stored in the low 32 bits
    capture_thread: Option<JoinHandle<()>>,
}

impl StreamIngest {
    pub fn new(config: StreamIngestConfig) -> Self {
        Self {
            buffer: Arc::new(FrameBuffer::new(config.buffer_size)),
            config,
            stop_flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            fps_bits: Arc::new(AtomicU64::new(0)),
            capture_thread: None,
        }
    }

    /// Spawns the capture thread, which owns `source` exclusively for its lifetime.
    pub fn start(&mut self, mut source: Box<dyn VideoSource>) {
        let buffer = self.buffer.clone();
        let stop_flag = self.stop_flag.clone();
        let fps_bits = self.fps_bits.clone();
        let primary = self.config.primary_url.clone();
        let backup = self.config.backup_url.clone();
        let reconnect_delay = self.config.reconnect_delay;
        let max_attempts = self.config.max_reconnect_attempts;

        let handle = thread::spawn(move || {
            capture_loop(source.as_mut(), &primary, backup.as_deref(), reconnect_delay, max_attempts, &buffer, &stop_flag, &fps_bits);
        });
        self.capture_thread = Some(handle);
    }

    pub fn read(&self, timeout: Duration) -> Option<(u64, Frame)> {
        self.buffer.pop_timeout(timeout)
    }

    pub fn fps(&self) -> f32 {
        f32::from_bits(self.fps_bits.load(Ordering::Relaxed) as u32)
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Tries `url` up to `max_attempts` times, sleeping `delay` between attempts.
fn reconnect_one(source: &mut dyn VideoSource, url: &str, delay: Duration, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        match source.open(url) {
            Ok(()) => return true,
            Err(err) => {
                tracing::warn!(url, attempt, max_attempts, %err, "reconnect attempt failed");
                if attempt < max_attempts {
                    thread::sleep(delay);
                }
            }
        }
    }
    false
}

fn reconnect(
    source: &mut dyn VideoSource,
    primary: &str,
    backup: Option<&str>,
    delay: Duration,
    max_attempts: u32,
) -> Result<(), StreamError> {
    if reconnect_one(source, primary, delay, max_attempts) {
        return Ok(());
    }
    if let Some(backup_url) = backup {
        if reconnect_one(source, backup_url, delay, max_attempts) {
            return Ok(());
        }
    }
    Err(StreamError::Exhausted)
}

#[allow(clippy::too_many_arguments)]
fn capture_loop(
    source: &mut dyn VideoSource,
    primary: &str,
    backup: Option<&str>,
    delay: Duration,
    max_attempts: u32,
    buffer: &FrameBuffer,
    stop_flag: &std::sync::atomic::AtomicBool,
    fps_bits: &AtomicU64,
) {
    let mut connected = false;
    let mut consecutive_failures: u32 = 0;
    let mut last_frame_time = Instant::now();

    while !stop_flag.load(Ordering::SeqCst) {
        if !connected {
            match reconnect(source, primary, backup, delay, max_attempts) {
                Ok(()) => {
                    connected = true;
                    consecutive_failures = 0;
                }
                Err(err) => {
                    tracing::error!(%err, "stream ingest exhausted primary and backup endpoints");
                    return;
                }
            }
        }

        match source.read_frame() {
            Ok(Some(frame)) => {
                consecutive_failures = 0;
                let now = Instant::now();
                let dt = now.duration_since(last_frame_time).as_secs_f32();
                last_frame_time = now;
                if dt > 0.0 {
                    fps_bits.store((1.0 / dt).to_bits() as u64, Ordering::Relaxed);
                }
                let frame_number = frame.frame_number;
                buffer.push(frame_number, frame);
            }
            Ok(None) | Err(_) => {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::warn!("forcing reconnect after consecutive read failures");
                    source.release();
                    connected = false;
                    consecutive_failures = 0;
                }
            }
        }
    }
    source.release();
}
