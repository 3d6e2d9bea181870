#![cfg_attr(
    target_os = "cuda",
    no_std,
    feature(register_attr),
    register_attr(nvvm_internal)
)]

pub mod block;
pub mod multi_scan;
pub mod reduce;
pub mod sort_hist;
mod step;
pub mod warp_scan;
pub mod work;
