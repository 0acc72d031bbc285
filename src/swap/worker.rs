//! Background swap worker
//!
//! Runs the swap call off the UI thread. Submission never blocks: while a
//! swap is in flight further frames are skipped rather than queued.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use parking_lot::Mutex;

use super::{FaceSwapper, SwapError, SwapStatus};

/// Clears the in-flight flag when a job ends, even by unwinding
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Frame to be swapped
pub struct SwapJob {
    /// Source image supplying the face
    pub source: Arc<RgbImage>,
    /// Camera frame receiving the face
    pub frame: RgbImage,
    /// Camera frame number
    pub frame_number: u64,
    /// Display generation the frame belongs to
    pub generation: u64,
}

/// Finished swap
#[derive(Clone)]
pub struct SwapResult {
    pub image: Arc<RgbImage>,
    pub status: SwapStatus,
    pub frame_number: u64,
    pub generation: u64,
    /// Time spent inside the swap call
    pub elapsed: Duration,
}

/// Decides which finished swaps are still worth showing
///
/// Results from an earlier generation (camera restarted, swap toggled) and
/// results older than the one on screen are rejected.
#[derive(Debug, Default)]
pub struct ResultTracker {
    generation: u64,
    last_frame: Option<u64>,
}

impl ResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation to stamp on submitted jobs
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once a result of the current generation was accepted
    pub fn has_result(&self) -> bool {
        self.last_frame.is_some()
    }

    /// Start a new generation, invalidating everything in flight
    pub fn reset(&mut self) {
        self.generation += 1;
        self.last_frame = None;
    }

    /// Record `result` as shown if it is current and newer than the last one
    pub fn accept(&mut self, result: &SwapResult) -> bool {
        if result.generation != self.generation
            || self.last_frame.is_some_and(|last| result.frame_number <= last)
        {
            return false;
        }
        self.last_frame = Some(result.frame_number);
        true
    }
}

/// Swap worker thread
pub struct SwapWorker {
    swapper: Arc<FaceSwapper>,
    job_sender: Option<Sender<SwapJob>>,
    /// Set while a job is queued or running
    in_flight: Arc<AtomicBool>,
    latest_result: Arc<Mutex<Option<SwapResult>>>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl SwapWorker {
    pub fn new(swapper: Arc<FaceSwapper>) -> Result<Self, SwapError> {
        let (job_sender, job_receiver) = crossbeam_channel::bounded::<SwapJob>(1);
        let in_flight = Arc::new(AtomicBool::new(false));
        let latest_result = Arc::new(Mutex::new(None));

        let swapper_clone = swapper.clone();
        let in_flight_clone = in_flight.clone();
        let latest_result_clone = latest_result.clone();

        let thread_handle = std::thread::Builder::new()
            .name("face-swap".to_string())
            .spawn(move || {
                Self::worker_thread(job_receiver, swapper_clone, in_flight_clone, latest_result_clone);
            })
            .map_err(SwapError::ThreadSpawn)?;

        Ok(Self {
            swapper,
            job_sender: Some(job_sender),
            in_flight,
            latest_result,
            thread_handle: Some(thread_handle),
        })
    }

    fn worker_thread(
        job_receiver: Receiver<SwapJob>,
        swapper: Arc<FaceSwapper>,
        in_flight: Arc<AtomicBool>,
        latest_result: Arc<Mutex<Option<SwapResult>>>,
    ) {
        log::debug!("Swap worker started");

        while let Ok(job) = job_receiver.recv() {
            let _in_flight = InFlightGuard(&in_flight);
            let started = Instant::now();
            let SwapJob {
                source,
                frame,
                frame_number,
                generation,
            } = job;

            match panic::catch_unwind(AssertUnwindSafe(|| swapper.swap(&source, frame))) {
                Ok(output) => {
                    *latest_result.lock() = Some(SwapResult {
                        image: Arc::new(output.image),
                        status: output.status,
                        frame_number,
                        generation,
                        elapsed: started.elapsed(),
                    });
                }
                Err(_) => log::warn!("Swap of frame {} panicked, frame dropped", frame_number),
            }
        }

        log::debug!("Swap worker stopped");
    }

    pub fn swapper(&self) -> &FaceSwapper {
        &self.swapper
    }

    /// Hand a frame to the worker without blocking
    ///
    /// Returns false, dropping the job, when a swap is already in flight.
    pub fn try_submit(&self, job: SwapJob) -> bool {
        let Some(sender) = &self.job_sender else {
            return false;
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        if sender.try_send(job).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Most recent finished swap
    pub fn latest_result(&self) -> Option<SwapResult> {
        self.latest_result.lock().clone()
    }

    /// Forget the last result (e.g. after the camera stops)
    pub fn clear_result(&self) {
        *self.latest_result.lock() = None;
    }

    /// Stop the worker thread, waiting for a running swap to finish
    pub fn stop(&mut self) {
        // Dropping the sender ends the worker loop
        self.job_sender = None;

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SwapWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(frame_number: u64, generation: u64) -> SwapResult {
        SwapResult {
            image: Arc::new(RgbImage::new(1, 1)),
            status: SwapStatus::Swapped,
            frame_number,
            generation,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_tracker_accepts_newer_frames_only() {
        let mut tracker = ResultTracker::new();
        assert!(!tracker.has_result());
        assert!(tracker.accept(&result(5, 0)));
        assert!(!tracker.accept(&result(5, 0)));
        assert!(!tracker.accept(&result(3, 0)));
        assert!(tracker.accept(&result(6, 0)));
        assert!(tracker.has_result());
    }

    #[test]
    fn test_tracker_ignores_results_from_previous_session() {
        let mut tracker = ResultTracker::new();
        assert!(tracker.accept(&result(2990, 0)));

        // Camera restarted while frame 3000 of the old session was swapping
        tracker.reset();
        assert!(!tracker.has_result());
        assert!(!tracker.accept(&result(3000, 0)));

        let generation = tracker.generation();
        assert!(tracker.accept(&result(1, generation)));
        assert!(tracker.accept(&result(2, generation)));
    }
}
