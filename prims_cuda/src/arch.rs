//! GPU generations and the per-SM resource limits policies are checked
//! against.

use std::fmt;

/// A CUDA compute capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CudaArch {
    Sm20,
    Sm30,
    Sm35,
    Sm50,
    Sm60,
    Sm70,
    Sm75,
    Sm80,
    Sm86,
    Sm89,
    Sm90,
}

/// Hardware limits of one streaming multiprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchProps {
    pub warp_threads: usize,
    pub max_threads_per_block: usize,
    pub max_threads_per_sm: usize,
    pub max_ctas_per_sm: usize,
    pub smem_bytes_per_sm: usize,
    pub max_smem_bytes_per_block: usize,
    pub regs_per_sm: usize,
    pub max_regs_per_thread: usize,
}

const KIB: usize = 1024;

impl CudaArch {
    pub const ALL: [CudaArch; 11] = [
        CudaArch::Sm20,
        CudaArch::Sm30,
        CudaArch::Sm35,
        CudaArch::Sm50,
        CudaArch::Sm60,
        CudaArch::Sm70,
        CudaArch::Sm75,
        CudaArch::Sm80,
        CudaArch::Sm86,
        CudaArch::Sm89,
        CudaArch::Sm90,
    ];

    /// The version number in `__CUDA_ARCH__` form, e.g. 350.
    pub const fn version(self) -> u32 {
        match self {
            CudaArch::Sm20 => 200,
            CudaArch::Sm30 => 300,
            CudaArch::Sm35 => 350,
            CudaArch::Sm50 => 500,
            CudaArch::Sm60 => 600,
            CudaArch::Sm70 => 700,
            CudaArch::Sm75 => 750,
            CudaArch::Sm80 => 800,
            CudaArch::Sm86 => 860,
            CudaArch::Sm89 => 890,
            CudaArch::Sm90 => 900,
        }
    }

    /// The newest generation not newer than `version`.
    pub fn from_version(version: u32) -> Option<Self> {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|arch| arch.version() <= version)
    }

    pub const fn props(self) -> ArchProps {
        let (max_threads_per_sm, max_ctas_per_sm, smem_kib_per_sm, regs_per_sm, max_regs) =
            match self {
                CudaArch::Sm20 => (1536, 8, 48, 32 * KIB, 63),
                CudaArch::Sm30 => (2048, 16, 48, 64 * KIB, 63),
                CudaArch::Sm35 => (2048, 16, 48, 64 * KIB, 255),
                CudaArch::Sm50 => (2048, 32, 64, 64 * KIB, 255),
                CudaArch::Sm60 => (2048, 32, 64, 64 * KIB, 255),
                CudaArch::Sm70 => (2048, 32, 96, 64 * KIB, 255),
                CudaArch::Sm75 => (1024, 16, 64, 64 * KIB, 255),
                CudaArch::Sm80 => (2048, 32, 164, 64 * KIB, 255),
                CudaArch::Sm86 => (1536, 16, 100, 64 * KIB, 255),
                CudaArch::Sm89 => (1536, 24, 100, 64 * KIB, 255),
                CudaArch::Sm90 => (2048, 32, 228, 64 * KIB, 255),
            };
        ArchProps {
            warp_threads: 32,
            max_threads_per_block: 1024,
            max_threads_per_sm,
            max_ctas_per_sm,
            smem_bytes_per_sm: smem_kib_per_sm * KIB,
            // Statically allocated shared memory is capped at 48 KiB per block.
            max_smem_bytes_per_block: 48 * KIB,
            regs_per_sm,
            max_regs_per_thread: max_regs,
        }
    }

    /// Whether loads can go through the read-only data cache (`ld.global.nc`).
    pub const fn has_ldg(self) -> bool {
        self.version() >= 350
    }
}

impl fmt::Display for CudaArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm_{}", self.version() / 10)
    }
}

#[cfg(test)]
mod tests {
    use super::CudaArch;

    #[test]
    fn version_lookup() {
        assert_eq!(CudaArch::from_version(350), Some(CudaArch::Sm35));
        assert_eq!(CudaArch::from_version(870), Some(CudaArch::Sm86));
        assert_eq!(CudaArch::from_version(130), None);
        assert_eq!(CudaArch::Sm89.to_string(), "sm_89");
    }

    #[test]
    fn ldg_starts_at_kepler_gk110() {
        assert!(!CudaArch::Sm30.has_ldg());
        assert!(CudaArch::Sm35.has_ldg());
    }
}
