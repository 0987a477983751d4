// src/frame_lib/worker.rs

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};

use glam::Vec2;

use crate::error::LightingError;
use crate::lighting_lib::light::LightId;
use crate::lighting_lib::shadow::{find_raycast_hits, RaycastInput, RaycastOutcome};

/// A deferred shadow pass for one light.
#[derive(Debug)]
pub struct RaycastJob {
    pub light: LightId,
    pub input: RaycastInput,
}

#[derive(Debug)]
pub struct RaycastResult {
    pub light: LightId,
    /// Light position the hits were computed around.
    pub origin: Vec2,
    pub outcome: Result<RaycastOutcome, LightingError>,
}

/// Background thread that runs shadow passes off the frame thread.
///
/// Jobs go through a bounded FIFO channel and at most one job per light is in
/// flight; a second submission for the same light is dropped until its
/// result has been drained. Queued jobs always complete.
pub struct RaycastWorker {
    request_tx: Option<SyncSender<RaycastJob>>,
    result_rx: Receiver<RaycastResult>,
    pending: HashSet<LightId>,
    worker: Option<JoinHandle<()>>,
}

impl RaycastWorker {
    pub fn spawn(capacity: usize) -> Result<Self, LightingError> {
        let (request_tx, request_rx) = mpsc::sync_channel::<RaycastJob>(capacity.max(1));
        let (result_tx, result_rx) = mpsc::channel::<RaycastResult>();

        let worker = thread::Builder::new()
            .name("sublight-raycast".into())
            .spawn(move || {
                while let Ok(job) = request_rx.recv() {
                    let result = RaycastResult {
                        light: job.light,
                        origin: job.input.origin,
                        outcome: find_raycast_hits(&job.input),
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                log::debug!("Raycast worker shutting down");
            })
            .map_err(|e| {
                log::error!("Failed to spawn raycast worker: {}", e);
                LightingError::Io(e)
            })?;
        log::debug!("Raycast worker started with queue capacity {}", capacity.max(1));

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            pending: HashSet::new(),
            worker: Some(worker),
        })
    }

    pub fn is_pending(&self, light: LightId) -> bool {
        self.pending.contains(&light)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queues `job`. Returns `Ok(false)` if the light already has a job in
    /// flight or the queue is full.
    pub fn submit(&mut self, job: RaycastJob) -> Result<bool, LightingError> {
        if self.pending.contains(&job.light) {
            return Ok(false);
        }
        let Some(tx) = &self.request_tx else {
            return Err(LightingError::WorkerUnavailable);
        };
        let light = job.light;
        match tx.try_send(job) {
            Ok(()) => {
                self.pending.insert(light);
                Ok(true)
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("Raycast queue full, light {} waits for a later frame", light);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Raycast worker has stopped");
                self.request_tx = None;
                Err(LightingError::WorkerUnavailable)
            }
        }
    }

    /// Collects every finished job without blocking.
    pub fn drain(&mut self) -> Vec<RaycastResult> {
        let mut results = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    self.pending.remove(&result.light);
                    results.push(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.pending.clear();
                    break;
                }
            }
        }
        results
    }

    /// Blocks until every queued job has finished and returns the results.
    pub fn wait_idle(&mut self) -> Vec<RaycastResult> {
        let mut results = Vec::new();
        while !self.pending.is_empty() {
            match self.result_rx.recv() {
                Ok(result) => {
                    self.pending.remove(&result.light);
                    results.push(result);
                }
                Err(_) => {
                    self.pending.clear();
                    break;
                }
            }
        }
        results
    }
}

impl Drop for RaycastWorker {
    fn drop(&mut self) {
        // closing the request channel ends the worker loop
        self.request_tx = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Raycast worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion_lib::occluder::Segment;

    fn job(light: LightId) -> RaycastJob {
        RaycastJob {
            light,
            input: RaycastInput {
                origin: Vec2::new(0.0, 200.0),
                bounds_offset: Vec2::ZERO,
                bounds_extent: 300.0,
                segments: vec![Segment::new(Vec2::new(-50.0, 10.0), Vec2::new(50.0, 10.0), None)],
            },
        }
    }

    #[test]
    fn second_submission_for_a_light_is_dropped() {
        let mut worker = RaycastWorker::spawn(8).unwrap();
        assert!(worker.submit(job(1)).unwrap());
        assert!(!worker.submit(job(1)).unwrap());
        assert!(worker.submit(job(2)).unwrap());
        assert_eq!(worker.pending_count(), 2);

        let results = worker.wait_idle();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.outcome.is_ok()));
        assert!(!worker.is_pending(1));
        assert!(worker.submit(job(1)).unwrap());
    }

    #[test]
    fn results_match_a_synchronous_pass() {
        let mut worker = RaycastWorker::spawn(1).unwrap();
        let expected = find_raycast_hits(&job(7).input).unwrap();
        worker.submit(job(7)).unwrap();
        let results = worker.wait_idle();
        assert_eq!(results[0].light, 7);
        assert_eq!(results[0].origin, Vec2::new(0.0, 200.0));
        assert_eq!(results[0].outcome.as_ref().unwrap(), &expected);
    }
}
