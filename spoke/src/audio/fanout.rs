//! Audio stream fanout: one producer pulls fixed-length frames from a
//! capture device and distributes each to N subscribers plus a bounded
//! rolling buffer.
//!
//! A short-held lock guards a shared buffer/subscriber list:
//! snapshot-then-release-then-deliver, so the lock is never held across a
//! subscriber callback. Unlike a multi-participant output router, this
//! fanout multiplexes a single capture stream to N consumers (wake-word,
//! VAD, STT); delivery is synchronous and back-pressure is intentional, a
//! slow subscriber slows every subscriber rather than the producer
//! dropping frames.

use parking_lot::Mutex;
use shared::audio::{AudioFrame, RollingBuffer};
use shared::error::CoreError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A subscriber receives frames synchronously on the producer thread/task.
/// Implementations that need asynchrony must buffer internally (e.g. push
/// into an `mpsc` channel) rather than block here.
pub trait FrameSubscriber: Send + Sync {
    /// Stable identity used for idempotent subscribe/unsubscribe.
    fn id(&self) -> u64;
    fn on_frame(&self, frame: &AudioFrame);
}

/// A source of raw capture frames. The real implementation talks to an
/// audio I/O device, which lives outside this crate's scope; this trait is
/// the boundary a concrete backend plugs into.
pub trait CaptureDevice: Send {
    /// Blocks until the next frame is available, or returns an error if
    /// the underlying device failed. Returning `Ok(None)` signals a clean
    /// end of stream.
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CoreError>;
}

struct Inner {
    buffer: RollingBuffer,
    subscribers: Vec<Arc<dyn FrameSubscriber>>,
}

/// The fanout: owns the rolling buffer and subscriber list under one
/// mutex, and the producer thread handle once started.
pub struct AudioStreamFanout {
    inner: Mutex<Inner>,
    running: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    frames_produced: AtomicU64,
    producer: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl AudioStreamFanout {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: RollingBuffer::new(buffer_capacity),
                subscribers: Vec::new(),
            }),
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            frames_produced: AtomicU64::new(0),
            producer: Mutex::new(None),
        }
    }

    /// Idempotent by identity: subscribing the same id twice is a no-op.
    pub fn subscribe(&self, subscriber: Arc<dyn FrameSubscriber>) {
        let mut inner = self.inner.lock();
        if inner.subscribers.iter().any(|s| s.id() == subscriber.id()) {
            return;
        }
        inner.subscribers.push(subscriber);
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|s| s.id() != id);
    }

    pub fn get_buffer(&self, k: usize) -> Vec<i16> {
        self.inner.lock().buffer.last_k_concat(k)
    }

    pub fn clear_buffer(&self) {
        self.inner.lock().buffer.clear();
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    /// Opens the capture device and launches the single producer thread.
    /// Idempotent: calling `start` while already running is a no-op.
    pub fn start(self: &Arc<Self>, mut device: Box<dyn CaptureDevice>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let this = Arc::clone(self);
        let stop_requested = Arc::clone(&self.stop_requested);
        let running = Arc::clone(&self.running);

        let handle = std::thread::spawn(move || {
            info!("audio producer started");
            loop {
                if stop_requested.load(Ordering::SeqCst) {
                    break;
                }
                match device.read_frame() {
                    Ok(Some(frame)) => {
                        this.produce(frame);
                    }
                    Ok(None) => {
                        info!("capture device reached end of stream");
                        break;
                    }
                    Err(e) => {
                        if stop_requested.load(Ordering::SeqCst) {
                            // stop was requested concurrently: exit silently
                            break;
                        }
                        error!(error = %e, "capture read error, producer exiting");
                        break;
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            info!("audio producer stopped");
        });

        *self.producer.lock() = Some(handle);
    }

    /// Appends to the rolling buffer, snapshots subscribers, releases the
    /// lock, then delivers the frame to every subscriber in order.
    /// Subscriber panics/errors are caught and logged, never propagated.
    fn produce(&self, frame: AudioFrame) {
        let subscribers = {
            let mut inner = self.inner.lock();
            inner.buffer.push(frame.clone());
            inner.subscribers.clone()
        };

        self.frames_produced.fetch_add(1, Ordering::Relaxed);

        for subscriber in &subscribers {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_frame(&frame);
            }));
            if let Err(_panic) = result {
                warn!(subscriber_id = subscriber.id(), "subscriber panicked on frame, continuing");
            }
        }
    }

    /// Idempotent: closes the device and joins the producer task.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.producer.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CountingSubscriber {
        id: u64,
        received: StdMutex<Vec<Vec<i16>>>,
    }

    impl FrameSubscriber for CountingSubscriber {
        fn id(&self) -> u64 {
            self.id
        }
        fn on_frame(&self, frame: &AudioFrame) {
            self.received.lock().unwrap().push(frame.samples.clone());
        }
    }

    struct FiniteDevice {
        frames: std::vec::IntoIter<Vec<i16>>,
    }

    impl CaptureDevice for FiniteDevice {
        fn read_frame(&mut self) -> Result<Option<AudioFrame>, CoreError> {
            Ok(self.frames.next().map(AudioFrame::new))
        }
    }

    #[test]
    fn delivers_every_frame_to_every_subscriber_in_order() {
        let fanout = Arc::new(AudioStreamFanout::new(10));
        let sub1 = Arc::new(CountingSubscriber {
            id: 1,
            received: StdMutex::new(Vec::new()),
        });
        let sub2 = Arc::new(CountingSubscriber {
            id: 2,
            received: StdMutex::new(Vec::new()),
        });
        fanout.subscribe(sub1.clone());
        fanout.subscribe(sub2.clone());

        let device = Box::new(FiniteDevice {
            frames: vec![vec![1], vec![2], vec![3]].into_iter(),
        });
        fanout.start(device);
        fanout.stop();

        assert_eq!(*sub1.received.lock().unwrap(), vec![vec![1], vec![2], vec![3]]);
        assert_eq!(*sub2.received.lock().unwrap(), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn subscribe_is_idempotent_by_identity() {
        let fanout = AudioStreamFanout::new(10);
        let sub = Arc::new(CountingSubscriber {
            id: 7,
            received: StdMutex::new(Vec::new()),
        });
        fanout.subscribe(sub.clone());
        fanout.subscribe(sub.clone());
        assert_eq!(fanout.inner.lock().subscribers.len(), 1);
    }

    #[test]
    fn unsubscribe_removes_by_identity() {
        let fanout = AudioStreamFanout::new(10);
        let sub = Arc::new(CountingSubscriber {
            id: 3,
            received: StdMutex::new(Vec::new()),
        });
        fanout.subscribe(sub);
        fanout.unsubscribe(3);
        assert!(fanout.inner.lock().subscribers.is_empty());
    }

    #[test]
    fn start_stop_is_idempotent() {
        let fanout = Arc::new(AudioStreamFanout::new(10));
        let device = Box::new(FiniteDevice {
            frames: vec![vec![1]].into_iter(),
        });
        fanout.start(device);
        // second start before stop is a no-op, does not panic or deadlock
        let device2 = Box::new(FiniteDevice { frames: vec![].into_iter() });
        fanout.start(device2);
        fanout.stop();
        fanout.stop();
        assert!(!fanout.is_running());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_delivery_to_others() {
        struct PanicSubscriber;
        impl FrameSubscriber for PanicSubscriber {
            fn id(&self) -> u64 {
                99
            }
            fn on_frame(&self, _frame: &AudioFrame) {
                panic!("boom");
            }
        }

        let fanout = Arc::new(AudioStreamFanout::new(10));
        fanout.subscribe(Arc::new(PanicSubscriber));
        let sub = Arc::new(CountingSubscriber {
            id: 1,
            received: StdMutex::new(Vec::new()),
        });
        fanout.subscribe(sub.clone());

        let device = Box::new(FiniteDevice {
            frames: vec![vec![1], vec![2]].into_iter(),
        });
        fanout.start(device);
        fanout.stop();

        assert_eq!(sub.received.lock().unwrap().len(), 2);
    }

    #[test]
    fn get_buffer_reflects_rolling_window() {
        let fanout = Arc::new(AudioStreamFanout::new(2));
        let device = Box::new(FiniteDevice {
            frames: vec![vec![1], vec![2], vec![3]].into_iter(),
        });
        fanout.start(device);
        fanout.stop();
        assert_eq!(fanout.get_buffer(10), vec![2, 3]);
    }
}
