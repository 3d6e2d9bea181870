/// The number of lanes that execute in lockstep on the device.
pub const WARP_SIZE: usize = 32;

/// The execution context of a single thread of a block.
///
/// Kernel bodies are written once against this trait so the same code runs on
/// the device and on the host simulator. Both barriers must be reached by every
/// thread they cover, so they may only be called from block-uniform
/// (`sync_threads`) or warp-uniform (`sync_warp`) control flow.
pub trait Block {
    fn thread_idx(&self) -> usize;

    fn block_idx(&self) -> usize;

    fn block_dim(&self) -> usize;

    fn grid_dim(&self) -> usize;

    /// Waits until every thread of the block has reached this point.
    fn sync_threads(&self);

    /// Waits until every lane of the calling thread's warp has reached this
    /// point.
    fn sync_warp(&self);

    #[inline(always)]
    fn lane(&self) -> usize {
        self.thread_idx() % WARP_SIZE
    }

    #[inline(always)]
    fn warp(&self) -> usize {
        self.thread_idx() / WARP_SIZE
    }
}

/// A pointer into device global memory that can be handed to every thread of a
/// launch.
///
/// Kernels are responsible for only writing disjoint locations between
/// barriers.
#[repr(transparent)]
#[derive(Debug)]
pub struct DevPtr<T>(*mut T);

impl<T> DevPtr<T> {
    pub fn new(ptr: *mut T) -> Self {
        Self(ptr)
    }

    pub fn null() -> Self {
        Self(core::ptr::null_mut())
    }

    #[inline(always)]
    pub fn as_mut_ptr(&self) -> *mut T {
        self.0
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const T {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl<T> Clone for DevPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevPtr<T> {}

unsafe impl<T: Send> Send for DevPtr<T> {}
unsafe impl<T: Send> Sync for DevPtr<T> {}

/// The thread of a block running on a CUDA device.
#[cfg(target_os = "cuda")]
pub struct CudaBlock;

#[cfg(target_os = "cuda")]
impl Block for CudaBlock {
    #[inline(always)]
    fn thread_idx(&self) -> usize {
        cuda_std::thread::thread_idx_x() as usize
    }

    #[inline(always)]
    fn block_idx(&self) -> usize {
        cuda_std::thread::block_idx_x() as usize
    }

    #[inline(always)]
    fn block_dim(&self) -> usize {
        cuda_std::thread::block_dim_x() as usize
    }

    #[inline(always)]
    fn grid_dim(&self) -> usize {
        cuda_std::thread::grid_dim_x() as usize
    }

    #[inline(always)]
    fn sync_threads(&self) {
        cuda_std::thread::sync_threads()
    }

    #[inline(always)]
    fn sync_warp(&self) {
        unsafe { cuda_std::warp::sync_warp(0xffff_ffff) }
    }
}
