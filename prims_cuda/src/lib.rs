pub mod arch;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod error;
pub mod policy;
pub mod reduce;
pub mod scan;
pub mod sim;

pub use arch::{ArchProps, CudaArch};
pub use error::{LaunchError, PrimsError, Result};
pub use kernel_tools::reduce::{Max, Min, ReduceOp, Sum};
pub use policy::{ReducePolicy, ReducePolicyBuilder, ReduceProblem, ValidReducePolicy};
pub use reduce::{Device, LaunchPlan, ReduceEnactor};
pub use scan::{multi_scan, sort_hist, sort_hist_into};
