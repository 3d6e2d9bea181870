//! Composition of reduction kernel configurations.
//!
//! A logical reduction runs as an upsweep pass over many CTAs followed by a
//! single-CTA spine pass, or as one single-CTA pass when the input is small.
//! The tuning knobs of all three kernels are composed here from a flat
//! [`ReduceTuning`] and checked against the target architecture before any
//! kernel can be obtained.

mod kernel_policy;
mod problem;
mod reduce_policy;
mod tuning;

use std::fmt;

pub use kernel_policy::KernelPolicy;
pub use problem::{Element, ReduceProblem, SizeT};
pub use reduce_policy::{ReduceKernel, ReducePolicy, ReducePolicyBuilder, ValidReducePolicy};
pub use tuning::{ProblemSize, ReduceTuning};

/// The three kernels of a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    Upsweep,
    Spine,
    Single,
}

impl KernelVariant {
    /// The name the kernel is exported under.
    pub const fn symbol(self) -> &'static str {
        match self {
            KernelVariant::Upsweep => "reduce_upsweep",
            KernelVariant::Spine => "reduce_spine",
            KernelVariant::Single => "reduce_single",
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelVariant::Upsweep => write!(f, "upsweep"),
            KernelVariant::Spine => write!(f, "spine"),
            KernelVariant::Single => write!(f, "single"),
        }
    }
}

/// Cache operator applied to global loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadModifier {
    None,
    /// Cache at all levels.
    Ca,
    /// Cache in L2 only.
    Cg,
    /// Evict first.
    Cs,
    /// Don't cache; fetch again on every load.
    Cv,
    /// Read-only data cache.
    Ldg,
}

impl LoadModifier {
    pub const fn ptx(self) -> &'static str {
        match self {
            LoadModifier::None => "ld.global",
            LoadModifier::Ca => "ld.global.ca",
            LoadModifier::Cg => "ld.global.cg",
            LoadModifier::Cs => "ld.global.cs",
            LoadModifier::Cv => "ld.global.cv",
            LoadModifier::Ldg => "ld.global.nc",
        }
    }
}

/// Cache operator applied to global stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreModifier {
    None,
    /// Write back at all levels.
    Wb,
    /// Cache in L2 only.
    Cg,
    /// Evict first.
    Cs,
    /// Write through to system memory.
    Wt,
}

impl StoreModifier {
    pub const fn ptx(self) -> &'static str {
        match self {
            StoreModifier::None => "st.global",
            StoreModifier::Wb => "st.global.wb",
            StoreModifier::Cg => "st.global.cg",
            StoreModifier::Cs => "st.global.cs",
            StoreModifier::Wt => "st.global.wt",
        }
    }
}
