//! Runs voxel builds on a fixed pool of worker threads.
//!
//! Jobs are dispatched over a channel as soon as they are enqueued, each
//! carries a shared cancellation flag which a worker checks before and after
//! solving. Finished builds travel back over a bounded channel which the main
//! thread drains with [BuildScheduler::tick]:
//!
//! ```text
//!  main thread                 workers
//!  enqueue_build ──BuildJob──▶ recv ─▶ cancelled? ─▶ solve ─▶ cancelled?
//!                                                              │
//!  tick ◀───────────────────────────────────BuildDone──────────┘
//! ```
//!
//! A job cancelled while it is being solved still runs to the end of its
//! solve, the result is thrown away and its callback is never invoked.
//!

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::prelude::*;
use bevy::prelude::*;

/// Identifies a build, ids increase with each enqueued build
pub type JobId = u64;

/// Invoked on a worker thread when a build finishes without being cancelled
pub type BuildCompletedCallback = Box<dyn FnOnce(JobId, Arc<BuildOutput>) + Send>;

/// Jobs that may still complete and their cancellation flags
type ActiveJobs = Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>;

/// Sizing of the worker pool
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub struct BuildSchedulerSettings {
	/// Number of worker threads
	pub worker_threads: usize,
	/// Number of finished builds that may wait to be drained by a tick before
	/// workers block
	pub completion_capacity: usize,
}

impl Default for BuildSchedulerSettings {
	fn default() -> Self {
		BuildSchedulerSettings {
			worker_threads: 2,
			completion_capacity: 64,
		}
	}
}

impl BuildSchedulerSettings {
	/// Reject an empty pool or a zero sized completion queue
	pub fn validate(&self) -> Result<(), FlowFieldError> {
		if self.worker_threads == 0 {
			return Err(FlowFieldError::invalid_argument("worker_threads must be at least 1"));
		}
		if self.completion_capacity == 0 {
			return Err(FlowFieldError::invalid_argument("completion_capacity must be at least 1"));
		}
		Ok(())
	}
}

/// Handle to an enqueued build
#[derive(Clone, Debug)]
pub struct JobHandle {
	/// Id of the build
	id: JobId,
	/// Shared with the worker solving the build
	cancelled: Arc<AtomicBool>,
}

impl JobHandle {
	/// Get the id of the build
	pub fn get_id(&self) -> JobId {
		self.id
	}
	/// Request that the build is discarded
	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::Release);
	}
	/// Whether the build has been cancelled
	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}
}

/// A build that finished without being cancelled
#[derive(Clone, Debug)]
pub struct CompletedBuild {
	/// Id of the build
	pub job_id: JobId,
	/// What the build produced
	pub output: Arc<BuildOutput>,
}

/// Work handed to a worker
struct BuildJob {
	/// Id of the build
	id: JobId,
	/// Snapshot to solve
	input: BuildInput,
	/// Shared with the [JobHandle]
	cancelled: Arc<AtomicBool>,
	/// Invoked once the build has been handed back
	on_complete: Option<BuildCompletedCallback>,
}

/// Message from a worker once a build has been solved
struct BuildDone {
	/// Id of the build
	job_id: JobId,
	/// What the build produced
	output: Arc<BuildOutput>,
	/// Checked again when drained
	cancelled: Arc<AtomicBool>,
}

/// Lock the active job map, a poisoned lock still holds plain data
fn lock_active(active_jobs: &ActiveJobs) -> MutexGuard<'_, HashMap<JobId, Arc<AtomicBool>>> {
	active_jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dispatches builds to a pool of worker threads
pub struct BuildScheduler {
	/// Feeds jobs to the workers, taken when the scheduler is dropped
	job_sender: Option<Sender<BuildJob>>,
	/// Finished builds waiting for a tick
	completion_receiver: Receiver<BuildDone>,
	/// Jobs that may still complete
	active_jobs: ActiveJobs,
	/// Id of the next job
	next_job_id: AtomicU64,
	/// Worker threads
	workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for BuildScheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BuildScheduler")
			.field("workers", &self.workers.len())
			.field("active_jobs", &self.active_job_count())
			.finish()
	}
}

impl BuildScheduler {
	/// Create a new instance of [BuildScheduler] and spawn its workers
	pub fn new(settings: BuildSchedulerSettings) -> Result<Self, FlowFieldError> {
		settings.validate()?;
		let (job_sender, job_receiver) = unbounded::<BuildJob>();
		let (completion_sender, completion_receiver) = bounded::<BuildDone>(settings.completion_capacity);
		let active_jobs: ActiveJobs = Arc::new(Mutex::new(HashMap::new()));
		let mut workers = Vec::with_capacity(settings.worker_threads);
		for i in 0..settings.worker_threads {
			let job_receiver = job_receiver.clone();
			let completion_sender = completion_sender.clone();
			let active_jobs = Arc::clone(&active_jobs);
			let handle = std::thread::Builder::new()
				.name(format!("flowfield-worker-{}", i))
				.spawn(move || run_worker(job_receiver, completion_sender, active_jobs))?;
			workers.push(handle);
		}
		debug!("Spawned {} flowfield workers", workers.len());
		Ok(BuildScheduler {
			job_sender: Some(job_sender),
			completion_receiver,
			active_jobs,
			next_job_id: AtomicU64::new(1),
			workers,
		})
	}
	/// Record a build as active and hand it to the worker pool. The returned
	/// handle can cancel the build
	pub fn enqueue_build(
		&self,
		input: BuildInput,
		on_complete: Option<BuildCompletedCallback>,
	) -> JobHandle {
		let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
		let cancelled = Arc::new(AtomicBool::new(false));
		let handle = JobHandle {
			id,
			cancelled: Arc::clone(&cancelled),
		};
		lock_active(&self.active_jobs).insert(id, Arc::clone(&cancelled));
		let job = BuildJob {
			id,
			input,
			cancelled,
			on_complete,
		};
		let sent = match &self.job_sender {
			Some(sender) => sender.send(job).is_ok(),
			None => false,
		};
		if sent {
			trace!("Enqueued flowfield build {}", id);
		} else {
			warn!("Flowfield workers have shut down, build {} dropped", id);
			handle.cancel();
			lock_active(&self.active_jobs).remove(&id);
		}
		handle
	}
	/// Drain finished builds, those cancelled since they finished are dropped
	pub fn tick(&self) -> Vec<CompletedBuild> {
		let mut completed = Vec::new();
		while let Ok(done) = self.completion_receiver.try_recv() {
			lock_active(&self.active_jobs).remove(&done.job_id);
			if done.cancelled.load(Ordering::Acquire) {
				trace!("Dropped cancelled flowfield build {}", done.job_id);
				continue;
			}
			completed.push(CompletedBuild {
				job_id: done.job_id,
				output: done.output,
			});
		}
		completed
	}
	/// Cancel every build that has not yet been drained
	pub fn cancel_all(&self) {
		let active = lock_active(&self.active_jobs);
		for cancelled in active.values() {
			cancelled.store(true, Ordering::Release);
		}
		if !active.is_empty() {
			debug!("Cancelled {} flowfield builds", active.len());
		}
	}
	/// Number of builds that may still complete
	pub fn active_job_count(&self) -> usize {
		lock_active(&self.active_jobs).len()
	}
	/// Number of worker threads
	pub fn worker_count(&self) -> usize {
		self.workers.len()
	}
}

impl Drop for BuildScheduler {
	fn drop(&mut self) {
		self.cancel_all();
		// workers exit once the job channel closes
		self.job_sender.take();
		// unblock any worker waiting on a full completion queue
		drop(std::mem::replace(
			&mut self.completion_receiver,
			crossbeam_channel::never(),
		));
		for worker in self.workers.drain(..) {
			if worker.join().is_err() {
				error!("A flowfield worker panicked");
			}
		}
	}
}

/// Body of a worker thread, runs until the job channel closes
fn run_worker(
	job_receiver: Receiver<BuildJob>,
	completion_sender: Sender<BuildDone>,
	active_jobs: ActiveJobs,
) {
	while let Ok(job) = job_receiver.recv() {
		if job.cancelled.load(Ordering::Acquire) {
			lock_active(&active_jobs).remove(&job.id);
			continue;
		}
		let output = Arc::new(build_distance_and_flow(&job.input));
		if job.cancelled.load(Ordering::Acquire) {
			lock_active(&active_jobs).remove(&job.id);
			continue;
		}
		let done = BuildDone {
			job_id: job.id,
			output: Arc::clone(&output),
			cancelled: Arc::clone(&job.cancelled),
		};
		if completion_sender.send(done).is_err() {
			lock_active(&active_jobs).remove(&job.id);
			break;
		}
		if let Some(on_complete) = job.on_complete {
			if !job.cancelled.load(Ordering::Acquire) {
				on_complete(job.id, output);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::{Duration, Instant};
	/// A small bounded world with the target at its centre
	fn test_input(target: Vec3) -> BuildInput {
		let grid = VoxelGrid::new(VoxelSettings {
			voxel_size: 100.0,
			chunk_size: IVec3::new(8, 8, 1),
			grid_origin: Vec3::ZERO,
			world_bounds: Some(WorldBounds::new(Vec3::splat(-400.0), Vec3::new(400.0, 400.0, 0.0))),
		})
		.unwrap();
		grid.fill_build_input(target, AgentLayer::Ground)
	}
	/// Tick until `count` builds have surfaced or the scheduler is idle
	fn drain(scheduler: &BuildScheduler, count: usize) -> Vec<CompletedBuild> {
		let deadline = Instant::now() + Duration::from_secs(10);
		let mut completed = Vec::new();
		while Instant::now() < deadline {
			completed.extend(scheduler.tick());
			if completed.len() >= count && scheduler.active_job_count() == 0 {
				break;
			}
			if count == 0 && scheduler.active_job_count() == 0 {
				break;
			}
			std::thread::sleep(Duration::from_millis(1));
		}
		completed
	}
	#[test]
	fn reject_empty_pool() {
		let settings = BuildSchedulerSettings {
			worker_threads: 0,
			..default()
		};
		assert!(BuildScheduler::new(settings).is_err());
	}
	#[test]
	fn builds_complete_through_tick() {
		let scheduler = BuildScheduler::new(BuildSchedulerSettings::default()).unwrap();
		assert_eq!(2, scheduler.worker_count());
		let first = scheduler.enqueue_build(test_input(Vec3::ZERO), None);
		let second = scheduler.enqueue_build(test_input(Vec3::new(150.0, 0.0, 0.0)), None);
		assert!(second.get_id() > first.get_id());
		let completed = drain(&scheduler, 2);
		assert_eq!(2, completed.len());
		assert!(completed.iter().any(|c| c.job_id == first.get_id()));
		let second_output = completed
			.iter()
			.find(|c| c.job_id == second.get_id())
			.map(|c| Arc::clone(&c.output))
			.unwrap();
		assert_eq!(Vec3::new(150.0, 0.0, 0.0), second_output.target);
		assert_eq!(0, scheduler.active_job_count());
	}
	#[test]
	fn callback_receives_output() {
		let scheduler = BuildScheduler::new(BuildSchedulerSettings::default()).unwrap();
		let (sender, receiver) = crossbeam_channel::bounded(1);
		let handle = scheduler.enqueue_build(
			test_input(Vec3::ZERO),
			Some(Box::new(move |id: JobId, output: Arc<BuildOutput>| {
				let _ = sender.send((id, output.chunk_results.len()));
			})),
		);
		let (id, chunks) = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
		assert_eq!(handle.get_id(), id);
		assert!(chunks > 0);
		assert_eq!(1, drain(&scheduler, 1).len());
	}
	#[test]
	fn cancelled_builds_never_surface() {
		let settings = BuildSchedulerSettings {
			worker_threads: 1,
			..default()
		};
		let scheduler = BuildScheduler::new(settings).unwrap();
		// park the only worker inside the callback of the first build
		let (release, parked) = crossbeam_channel::bounded::<()>(0);
		let blocker = scheduler.enqueue_build(
			test_input(Vec3::ZERO),
			Some(Box::new(move |_: JobId, _: Arc<BuildOutput>| {
				let _ = parked.recv();
			})),
		);
		let invoked = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&invoked);
		let cancelled = scheduler.enqueue_build(
			test_input(Vec3::ZERO),
			Some(Box::new(move |_: JobId, _: Arc<BuildOutput>| {
				flag.store(true, Ordering::SeqCst)
			})),
		);
		cancelled.cancel();
		assert!(cancelled.is_cancelled());
		release.send(()).unwrap();
		let completed = drain(&scheduler, 1);
		assert_eq!(1, completed.len());
		assert_eq!(blocker.get_id(), completed[0].job_id);
		assert!(!invoked.load(Ordering::SeqCst));
		assert_eq!(0, scheduler.active_job_count());
	}
	#[test]
	fn cancel_all_discards_finished_builds() {
		let scheduler = BuildScheduler::new(BuildSchedulerSettings::default()).unwrap();
		let handle = scheduler.enqueue_build(test_input(Vec3::ZERO), None);
		// wait for the build to be solved without draining it
		let deadline = Instant::now() + Duration::from_secs(10);
		while scheduler.completion_receiver.is_empty() && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(1));
		}
		scheduler.cancel_all();
		assert!(handle.is_cancelled());
		assert!(scheduler.tick().is_empty());
		assert_eq!(0, scheduler.active_job_count());
	}
	#[test]
	fn drop_joins_workers() {
		let scheduler = BuildScheduler::new(BuildSchedulerSettings::default()).unwrap();
		for _ in 0..4 {
			scheduler.enqueue_build(test_input(Vec3::ZERO), None);
		}
		drop(scheduler);
	}
}
