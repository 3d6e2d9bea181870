//! Host execution of kernels written against [`Block`].
//!
//! Every lane of a block runs on its own OS thread. Blocks of a launch run one
//! after another, and launches are serialised as on a single device stream, so
//! at most one block's lanes are alive at a time. The hardware guarantees that
//! kernels lean on are made explicit: `sync_threads` is a barrier over the whole
//! block and `sync_warp` a barrier over the 32 lanes of a warp.

use std::any::Any;
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;

use itertools::Itertools;
use kernel_tools::block::{Block, WARP_SIZE};
use log::debug;

use crate::error::LaunchError;

/// The largest block the simulator launches.
pub const MAX_BLOCK_DIM: usize = 1024;

const LANE_STACK_SIZE: usize = 256 * 1024;

static DEVICE: Mutex<()> = Mutex::new(());

/// Grid and block dimensions of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_dim: usize,
    pub block_dim: usize,
}

impl LaunchConfig {
    pub fn new(grid_dim: usize, block_dim: usize) -> Self {
        Self {
            grid_dim,
            block_dim,
        }
    }

    fn validate(&self) -> Result<(), LaunchError> {
        if self.grid_dim == 0 {
            return Err(LaunchError::EmptyGrid);
        }
        if self.block_dim == 0 || self.block_dim % WARP_SIZE != 0 || self.block_dim > MAX_BLOCK_DIM
        {
            return Err(LaunchError::InvalidBlockDim {
                block_dim: self.block_dim,
                max: MAX_BLOCK_DIM,
            });
        }
        Ok(())
    }
}

/// Block shared memory: allocated when a block starts, dropped when it exits.
///
/// Lanes access it through raw pointers; kernels keep writers and readers of a
/// slot apart with barriers.
pub struct SharedArray<T> {
    cells: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Send> Sync for SharedArray<T> {}

impl<T> SharedArray<T>
where
    T: Copy + Default,
{
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| UnsafeCell::new(T::default())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_mut_ptr(&self) -> *mut T {
        UnsafeCell::raw_get(self.cells.as_ptr())
    }
}

// Unwinds lanes released from a barrier whose block was torn down.
struct Aborted;

struct BarrierState {
    arrived: usize,
    generation: usize,
    aborted: bool,
}

/// A reusable barrier that releases every waiter when the block aborts.
struct LaneBarrier {
    count: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl LaneBarrier {
    fn new(count: usize) -> Self {
        Self {
            count,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            cvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait(&self) {
        let mut state = self.lock();
        if state.aborted {
            drop(state);
            panic::resume_unwind(Box::new(Aborted));
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.count {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return;
        }

        while state.generation == generation && !state.aborted {
            state = self.cvar.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        if state.generation == generation {
            drop(state);
            panic::resume_unwind(Box::new(Aborted));
        }
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.cvar.notify_all();
    }
}

/// One lane of a simulated block.
pub struct SimBlock<'a> {
    thread_idx: usize,
    block_idx: usize,
    block_dim: usize,
    grid_dim: usize,
    barrier: &'a LaneBarrier,
    warp_barrier: &'a LaneBarrier,
}

impl Block for SimBlock<'_> {
    fn thread_idx(&self) -> usize {
        self.thread_idx
    }

    fn block_idx(&self) -> usize {
        self.block_idx
    }

    fn block_dim(&self) -> usize {
        self.block_dim
    }

    fn grid_dim(&self) -> usize {
        self.grid_dim
    }

    fn sync_threads(&self) {
        self.barrier.wait()
    }

    fn sync_warp(&self) {
        self.warp_barrier.wait()
    }
}

/// Runs `kernel` on every lane of every block of the grid.
///
/// `make_shared` is called once per block to allocate that block's shared
/// memory.
pub fn launch<S, M, K>(config: LaunchConfig, make_shared: M, kernel: K) -> Result<(), LaunchError>
where
    S: Sync,
    M: Fn() -> S,
    K: Fn(&SimBlock<'_>, &S) + Sync,
{
    config.validate()?;
    let _device = DEVICE.lock().unwrap_or_else(|e| e.into_inner());
    debug!(
        "launching {} block(s) of {} lanes",
        config.grid_dim, config.block_dim
    );

    for block_idx in 0..config.grid_dim {
        let shared = make_shared();
        run_block(config, block_idx, &shared, &kernel)?;
    }
    Ok(())
}

fn run_block<S, K>(
    config: LaunchConfig,
    block_idx: usize,
    shared: &S,
    kernel: &K,
) -> Result<(), LaunchError>
where
    S: Sync,
    K: Fn(&SimBlock<'_>, &S) + Sync,
{
    let barrier = LaneBarrier::new(config.block_dim);
    let warp_barriers = (0..config.block_dim / WARP_SIZE)
        .map(|_| LaneBarrier::new(WARP_SIZE))
        .collect_vec();
    let abort = || {
        barrier.abort();
        warp_barriers.iter().for_each(LaneBarrier::abort);
    };

    thread::scope(|scope| {
        let mut lanes = Vec::with_capacity(config.block_dim);
        for thread_idx in 0..config.block_dim {
            let lane = SimBlock {
                thread_idx,
                block_idx,
                block_dim: config.block_dim,
                grid_dim: config.grid_dim,
                barrier: &barrier,
                warp_barrier: &warp_barriers[thread_idx / WARP_SIZE],
            };
            let spawned = thread::Builder::new()
                .name(format!("block{block_idx}-lane{thread_idx}"))
                .stack_size(LANE_STACK_SIZE)
                .spawn_scoped(scope, move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel(&lane, shared)));
                    if outcome.is_err() {
                        abort();
                    }
                    outcome
                });
            match spawned {
                Ok(handle) => lanes.push(handle),
                Err(source) => {
                    abort();
                    return Err(LaunchError::Spawn {
                        block_idx,
                        thread_idx,
                        source,
                    });
                }
            }
        }

        let mut released = false;
        let mut failure: Option<String> = None;
        for handle in lanes {
            if let Err(payload) = handle.join().unwrap_or_else(Err) {
                if payload.is::<Aborted>() {
                    released = true;
                } else if failure.is_none() {
                    failure = Some(panic_message(payload.as_ref()));
                }
            }
        }

        match failure {
            Some(message) => Err(LaunchError::BlockAborted { block_idx, message }),
            None if released => Err(LaunchError::BlockAborted {
                block_idx,
                message: "lanes released by an aborted barrier".to_string(),
            }),
            None => Ok(()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "lane panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{launch, LaunchConfig, SharedArray};
    use crate::error::LaunchError;
    use kernel_tools::block::{Block, DevPtr};

    #[test]
    fn lanes_see_their_indices() {
        let mut out = vec![0usize; 3 * 64];
        let dev_out = DevPtr::new(out.as_mut_ptr());
        launch(LaunchConfig::new(3, 64), || (), |block, _| unsafe {
            let i = block.block_idx() * block.block_dim() + block.thread_idx();
            *dev_out.as_mut_ptr().add(i) = block.warp() * 1000 + block.lane();
        })
        .unwrap();
        assert_eq!(out[0], 0);
        assert_eq!(out[31], 31);
        assert_eq!(out[32], 1000);
        assert_eq!(out[64 + 33], 1001);
    }

    #[test]
    fn barrier_orders_shared_memory() {
        let mut out = vec![0u32; 128];
        let dev_out = DevPtr::new(out.as_mut_ptr());
        launch(
            LaunchConfig::new(1, 128),
            || SharedArray::<u32>::new(128),
            |block, shared| unsafe {
                let t = block.thread_idx();
                *shared.as_mut_ptr().add(t) = t as u32;
                block.sync_threads();
                *dev_out.as_mut_ptr().add(t) = *shared.as_mut_ptr().add(127 - t);
            },
        )
        .unwrap();
        assert_eq!(out[0], 127);
        assert_eq!(out[127], 0);
    }

    #[test]
    fn rejects_bad_block_dim() {
        let result = launch(LaunchConfig::new(1, 48), || (), |_, _| {});
        assert!(matches!(
            result,
            Err(LaunchError::InvalidBlockDim { block_dim: 48, .. })
        ));
        let result = launch(LaunchConfig::new(0, 32), || (), |_, _| {});
        assert!(matches!(result, Err(LaunchError::EmptyGrid)));
    }

    #[test]
    fn panicking_lane_aborts_block() {
        let result = launch(LaunchConfig::new(1, 64), || (), |block, _| {
            if block.thread_idx() == 5 {
                panic!("lane five failed");
            }
            block.sync_threads();
            block.sync_warp();
        });
        match result {
            Err(LaunchError::BlockAborted { block_idx, message }) => {
                assert_eq!(block_idx, 0);
                assert_eq!(message, "lane five failed");
            }
            other => panic!("unexpected launch result: {other:?}"),
        }
    }
}
