//! Command queues and the grouped execution model.
//!
//! A [`Queue`] launches two kinds of work on the device it is bound to:
//!
//! - flat launches ([`Queue::parallel_for`]), one independent invocation per
//!   index, and
//! - grouped launches ([`Queue::nd_parallel_for`]) over an [`NdRange`], where
//!   each group first runs a setup step against a [`Handler`] (allocating its
//!   local memory) and then runs one worker per local index. Workers of a
//!   group can synchronize with [`NdItem::barrier`].
//!
//! Failures inside kernels are not returned by the launch itself. They are
//! recorded on the queue and surface from [`Queue::wait_and_throw`].
//!
//! [`HostQueue`] is an in-order queue that runs every group on host threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;

use crate::allocator::LocalAccessor;
use crate::device::DeviceInfo;
use crate::error::{ReduceError, Result};

/// Largest group [`HostQueue`] accepts. Each worker of a group runs on its
/// own thread.
pub const MAX_HOST_GROUP_SIZE: usize = 1024;

/// Global and per-group sizes of a grouped launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    global: usize,
    local: usize,
}

impl NdRange {
    /// Describe a launch of `global` workers in groups of `local`.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::InvalidNdRange`] if either size is zero or
    /// `global` is not a multiple of `local`.
    pub fn new(global: usize, local: usize) -> Result<Self> {
        if global == 0 || local == 0 || global % local != 0 {
            return Err(ReduceError::InvalidNdRange { global, local });
        }
        Ok(Self { global, local })
    }

    /// Total number of workers.
    pub fn global_size(&self) -> usize {
        self.global
    }

    /// Workers per group.
    pub fn group_size(&self) -> usize {
        self.local
    }

    /// Number of groups.
    pub fn num_groups(&self) -> usize {
        self.global / self.local
    }
}

/// Per-group setup context of a grouped launch.
///
/// Local memory allocated here is private to the group and is charged
/// against the device's local memory limit.
#[derive(Debug)]
pub struct Handler {
    group: usize,
    local_bytes: usize,
}

impl Handler {
    fn new(group: usize) -> Self {
        Self {
            group,
            local_bytes: 0,
        }
    }

    /// Index of the group being set up.
    pub fn group(&self) -> usize {
        self.group
    }

    /// Allocate `len` slots of group-local memory.
    pub fn local_accessor<T: Copy + Default>(&mut self, len: usize) -> LocalAccessor<T> {
        let local = LocalAccessor::new(len);
        self.local_bytes += local.size_in_bytes();
        local
    }

    /// Local memory allocated so far, in bytes.
    pub fn local_bytes(&self) -> usize {
        self.local_bytes
    }
}

/// Identity of one worker inside a grouped launch.
pub struct NdItem<'a> {
    global_id: usize,
    local_id: usize,
    group: usize,
    global_range: usize,
    local_range: usize,
    barrier: &'a GroupBarrier,
}

impl NdItem<'_> {
    /// Index of this worker across the whole launch.
    pub fn global_id(&self) -> usize {
        self.global_id
    }

    /// Index of this worker inside its group.
    pub fn local_id(&self) -> usize {
        self.local_id
    }

    /// Index of this worker's group.
    pub fn group(&self) -> usize {
        self.group
    }

    /// Total number of workers in the launch.
    pub fn global_range(&self) -> usize {
        self.global_range
    }

    /// Number of workers in this worker's group.
    pub fn local_range(&self) -> usize {
        self.local_range
    }

    /// Wait until every worker of the group has reached this barrier.
    ///
    /// Writes to local memory made before the barrier are visible to every
    /// worker of the group after it.
    pub fn barrier(&self) {
        self.barrier.wait();
    }
}

/// Panic payload used to unwind workers blocked on a poisoned barrier.
struct BarrierPoisoned;

struct BarrierState {
    arrived: usize,
    generation: u64,
    poisoned: bool,
}

/// Reusable rendezvous for the workers of one group.
///
/// If a worker fails, the barrier is poisoned and every worker waiting on it
/// (or arriving later) unwinds instead of blocking forever.
pub struct GroupBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl GroupBarrier {
    /// Create a barrier for `parties` workers.
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                poisoned: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Block until all parties have arrived.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        if state.poisoned {
            drop(state);
            panic::resume_unwind(Box::new(BarrierPoisoned));
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }

        while state.generation == generation && !state.poisoned {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            drop(state);
            panic::resume_unwind(Box::new(BarrierPoisoned));
        }
    }

    /// Release every waiter with a failure.
    pub fn poison(&self) {
        let mut state = self.state.lock();
        state.poisoned = true;
        self.cvar.notify_all();
    }
}

/// A command queue bound to exactly one device.
pub trait Queue: Sync {
    /// The device this queue submits to.
    fn device(&self) -> &DeviceInfo;

    /// Run `kernel(idx)` for every `idx` in `0..size`.
    ///
    /// # Errors
    ///
    /// Only submission problems are returned here; kernel failures surface
    /// from [`Queue::wait_and_throw`].
    fn parallel_for<K>(&self, name: &'static str, size: usize, kernel: K) -> Result<()>
    where
        K: Fn(usize) + Sync + Send;

    /// Run a grouped launch.
    ///
    /// `setup` runs once per group and builds the state that group's workers
    /// share; `kernel` then runs once per worker.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::OutOfLocalMemory`] if a group's setup allocates
    /// more local memory than the device provides, and
    /// [`ReduceError::InvalidNdRange`] if the queue cannot run groups of the
    /// requested size. Kernel failures surface from [`Queue::wait_and_throw`].
    fn nd_parallel_for<S, A, K>(
        &self,
        name: &'static str,
        range: NdRange,
        setup: A,
        kernel: K,
    ) -> Result<()>
    where
        A: Fn(&mut Handler) -> S + Sync,
        S: Sync,
        K: Fn(&S, &NdItem<'_>) + Sync;

    /// Block until all submitted work has finished and report the first
    /// failure recorded since the last call.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::KernelFailed`] if any kernel failed.
    fn wait_and_throw(&self) -> Result<()>;
}

/// In-order queue executing on the host.
///
/// Submissions run to completion before the submitting call returns, so
/// every launch observes all writes of the launches before it. Groups run in
/// parallel on the rayon pool; the workers of a group run on their own
/// threads so that barriers are real rendezvous points.
pub struct HostQueue {
    device: DeviceInfo,
    pending: Mutex<Vec<ReduceError>>,
}

impl HostQueue {
    /// Create a queue that executes on the host but reports `device`'s
    /// capabilities.
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            device,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Create a queue for the host CPU.
    pub fn host() -> Self {
        Self::new(DeviceInfo::host())
    }

    fn record(&self, err: ReduceError) {
        tracing::warn!(error = %err, "kernel failed");
        self.pending.lock().push(err);
    }

    fn skip_after_failure(&self, name: &'static str) -> bool {
        let failed = !self.pending.lock().is_empty();
        if failed {
            tracing::warn!(kernel = name, "skipping submission after an earlier kernel failure");
        }
        failed
    }

    fn run_group<S, K>(
        &self,
        range: &NdRange,
        group: usize,
        state: &S,
        kernel: &K,
    ) -> Option<String>
    where
        S: Sync,
        K: Fn(&S, &NdItem<'_>) + Sync,
    {
        let local_range = range.group_size();
        let barrier = GroupBarrier::new(local_range);
        let make_item = |local_id: usize| NdItem {
            global_id: group * local_range + local_id,
            local_id,
            group,
            global_range: range.global_size(),
            local_range,
            barrier: &barrier,
        };

        if local_range == 1 {
            return panic::catch_unwind(AssertUnwindSafe(|| kernel(state, &make_item(0))))
                .err()
                .map(panic_message);
        }

        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(local_range);
            let mut failure = None;
            for local_id in 0..local_range {
                let item = make_item(local_id);
                let spawned = thread::Builder::new().spawn_scoped(scope, move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel(state, &item)));
                    if outcome.is_err() {
                        item.barrier.poison();
                    }
                    outcome
                });
                match spawned {
                    Ok(worker) => workers.push(worker),
                    Err(err) => {
                        // Started workers would wait on the barrier forever.
                        barrier.poison();
                        failure = Some(format!("failed to start worker {local_id}: {err}"));
                        break;
                    }
                }
            }

            for worker in workers {
                if let Ok(Err(payload)) = worker.join() {
                    if failure.is_none() && !payload.is::<BarrierPoisoned>() {
                        failure = Some(panic_message(payload));
                    }
                }
            }
            failure
        })
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::host()
    }
}

impl Queue for HostQueue {
    fn device(&self) -> &DeviceInfo {
        &self.device
    }

    fn parallel_for<K>(&self, name: &'static str, size: usize, kernel: K) -> Result<()>
    where
        K: Fn(usize) + Sync + Send,
    {
        if self.skip_after_failure(name) {
            return Ok(());
        }
        tracing::debug!(kernel = name, size, "parallel_for");

        let outcome = (0..size).into_par_iter().try_for_each(|idx| {
            panic::catch_unwind(AssertUnwindSafe(|| kernel(idx))).map_err(panic_message)
        });
        if let Err(message) = outcome {
            self.record(ReduceError::KernelFailed {
                kernel: name,
                message,
            });
        }
        Ok(())
    }

    fn nd_parallel_for<S, A, K>(
        &self,
        name: &'static str,
        range: NdRange,
        setup: A,
        kernel: K,
    ) -> Result<()>
    where
        A: Fn(&mut Handler) -> S + Sync,
        S: Sync,
        K: Fn(&S, &NdItem<'_>) + Sync,
    {
        if self.skip_after_failure(name) {
            return Ok(());
        }
        if range.group_size() > MAX_HOST_GROUP_SIZE {
            tracing::warn!(
                kernel = name,
                group_size = range.group_size(),
                max = MAX_HOST_GROUP_SIZE,
                "group size exceeds the host worker limit"
            );
            return Err(ReduceError::InvalidNdRange {
                global: range.global_size(),
                local: range.group_size(),
            });
        }
        tracing::debug!(
            kernel = name,
            num_groups = range.num_groups(),
            group_size = range.group_size(),
            "nd_parallel_for"
        );

        let available = self.device.local_mem_size();
        let states = (0..range.num_groups())
            .map(|group| {
                let mut handler = Handler::new(group);
                let state = setup(&mut handler);
                if handler.local_bytes() > available {
                    return Err(ReduceError::OutOfLocalMemory {
                        requested: handler.local_bytes(),
                        available,
                    });
                }
                Ok(state)
            })
            .collect::<Result<Vec<S>>>()?;

        let failure = states
            .par_iter()
            .enumerate()
            .filter_map(|(group, state)| self.run_group(&range, group, state, &kernel))
            .find_any(|_| true);
        if let Some(message) = failure {
            self.record(ReduceError::KernelFailed {
                kernel: name,
                message,
            });
        }
        Ok(())
    }

    fn wait_and_throw(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.lock());
        match pending.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "kernel panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Buffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_nd_range_validation() {
        assert!(NdRange::new(64, 8).is_ok());
        assert_eq!(NdRange::new(64, 8).unwrap().num_groups(), 8);
        assert!(matches!(
            NdRange::new(0, 8),
            Err(ReduceError::InvalidNdRange { global: 0, local: 8 })
        ));
        assert!(NdRange::new(8, 0).is_err());
        assert!(NdRange::new(10, 4).is_err());
    }

    #[test]
    fn test_parallel_for_visits_every_index() {
        let queue = HostQueue::host();
        let out = Buffer::<usize>::new(1000);
        let rw = out.read_write();
        queue.parallel_for("square", 1000, |i| rw.set(i, i * i)).unwrap();
        queue.wait_and_throw().unwrap();
        assert!(out.to_vec().iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn test_nd_item_ids() {
        let queue = HostQueue::host();
        let range = NdRange::new(12, 4).unwrap();
        let out = Buffer::<usize>::new(12);
        let rw = out.read_write();
        queue
            .nd_parallel_for("ids", range, |_| (), |_, item| {
                assert_eq!(item.local_range(), 4);
                assert_eq!(item.global_range(), 12);
                assert_eq!(item.global_id(), item.group() * 4 + item.local_id());
                rw.set(item.global_id(), item.group() * 100 + item.local_id());
            })
            .unwrap();
        queue.wait_and_throw().unwrap();
        assert_eq!(out.to_vec(), vec![0, 1, 2, 3, 100, 101, 102, 103, 200, 201, 202, 203]);
    }

    #[test]
    fn test_barrier_orders_local_memory() {
        // Every worker writes its slot, then reads its neighbour's after the
        // barrier. Without the rendezvous some reads would see the seed.
        let queue = HostQueue::host();
        let range = NdRange::new(32, 8).unwrap();
        let out = Buffer::<usize>::new(32);
        let rw = out.read_write();
        queue
            .nd_parallel_for(
                "neighbour",
                range,
                |h| h.local_accessor::<usize>(8),
                |local, item| {
                    let lid = item.local_id();
                    local.set(lid, lid + 1);
                    item.barrier();
                    rw.set(item.global_id(), local.get((lid + 1) % 8));
                },
            )
            .unwrap();
        queue.wait_and_throw().unwrap();
        for (i, v) in out.to_vec().into_iter().enumerate() {
            assert_eq!(v, (i % 8 + 1) % 8 + 1);
        }
    }

    #[test]
    fn test_local_memory_is_group_private() {
        let queue = HostQueue::host();
        let range = NdRange::new(16, 4).unwrap();
        let setups = AtomicUsize::new(0);
        queue
            .nd_parallel_for(
                "private",
                range,
                |h| {
                    setups.fetch_add(1, Ordering::SeqCst);
                    let local = h.local_accessor::<usize>(1);
                    local.set(0, h.group());
                    local
                },
                |local, item| assert_eq!(local.get(0), item.group()),
            )
            .unwrap();
        queue.wait_and_throw().unwrap();
        assert_eq!(setups.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_out_of_local_memory() {
        let queue = HostQueue::new(DeviceInfo::host().with_local_mem_size(64));
        let range = NdRange::new(4, 4).unwrap();
        let result = queue.nd_parallel_for(
            "too_big",
            range,
            |h| h.local_accessor::<f64>(9),
            |_, _| {},
        );
        assert_eq!(
            result,
            Err(ReduceError::OutOfLocalMemory {
                requested: 72,
                available: 64
            })
        );
    }

    #[test]
    fn test_group_size_above_host_limit() {
        let queue = HostQueue::new(DeviceInfo::accelerator("wide", 1, 32768));
        let range = NdRange::new(32768, 32768).unwrap();
        let ran = AtomicUsize::new(0);
        let result = queue.nd_parallel_for(
            "too_wide",
            range,
            |h| h.local_accessor::<u8>(32768),
            |_, _| {
                ran.fetch_add(1, Ordering::Relaxed);
            },
        );
        assert_eq!(
            result,
            Err(ReduceError::InvalidNdRange {
                global: 32768,
                local: 32768
            })
        );
        assert_eq!(ran.load(Ordering::Relaxed), 0);

        // The largest accepted group still runs every worker.
        let range = NdRange::new(MAX_HOST_GROUP_SIZE, MAX_HOST_GROUP_SIZE).unwrap();
        queue
            .nd_parallel_for("widest", range, |_| (), |_, item| {
                item.barrier();
                ran.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        queue.wait_and_throw().unwrap();
        assert_eq!(ran.load(Ordering::Relaxed), MAX_HOST_GROUP_SIZE);
    }

    #[test]
    fn test_kernel_failure_surfaces_at_wait() {
        let queue = HostQueue::host();
        let out = Buffer::<f64>::new(4);
        let rw = out.read_write();
        // Index 4 is out of bounds.
        queue.parallel_for("oob", 5, |i| rw.set(i, 1.0)).unwrap();
        let err = queue.wait_and_throw().unwrap_err();
        assert!(matches!(err, ReduceError::KernelFailed { kernel: "oob", .. }));

        // The error is drained by the wait.
        queue.wait_and_throw().unwrap();
    }

    #[test]
    fn test_failed_worker_releases_its_group() {
        let queue = HostQueue::host();
        let range = NdRange::new(8, 4).unwrap();
        queue
            .nd_parallel_for("poisoned", range, |_| (), |_, item| {
                if item.local_id() == 2 {
                    panic!("worker 2 failed");
                }
                item.barrier();
                item.barrier();
            })
            .unwrap();
        let err = queue.wait_and_throw().unwrap_err();
        assert_eq!(
            err,
            ReduceError::KernelFailed {
                kernel: "poisoned",
                message: "worker 2 failed".into()
            }
        );
    }

    #[test]
    fn test_submissions_skipped_after_failure() {
        let queue = HostQueue::host();
        let out = Buffer::<u32>::new(1);
        let rw = out.read_write();
        queue.parallel_for("fails", 1, |_| panic!("boom")).unwrap();
        queue.parallel_for("skipped", 1, |i| rw.set(i, 9)).unwrap();
        assert!(queue.wait_and_throw().is_err());
        assert_eq!(out.to_vec(), vec![0]);
    }
}
