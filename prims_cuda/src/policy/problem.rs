use std::any::type_name;
use std::marker::PhantomData;
use std::mem::size_of;

use kernel_tools::reduce::ReduceOp;

/// A value that can be reduced on the device.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T> Element for T where T: Copy + Default + Send + Sync + 'static {}

/// The integer type element counts are expressed in.
pub trait SizeT: Copy + Send + Sync + 'static {
    const NAME: &'static str;

    fn from_usize(n: usize) -> Option<Self>;

    fn to_usize(self) -> usize;
}

macro_rules! impl_size_t {
    ($($t:ty),*) => {
        $(
            impl SizeT for $t {
                const NAME: &'static str = stringify!($t);

                fn from_usize(n: usize) -> Option<Self> {
                    <$t>::try_from(n).ok()
                }

                fn to_usize(self) -> usize {
                    self as usize
                }
            }
        )*
    };
}

impl_size_t!(u32, u64, usize);

/// The type-level description of a reduction: element type `T`, size type `S`
/// and the operator.
#[derive(Debug, Clone, Copy)]
pub struct ReduceProblem<T, S, Op> {
    pub op: Op,
    types: PhantomData<fn() -> (T, S)>,
}

impl<T, S, Op> ReduceProblem<T, S, Op>
where
    T: Element,
    S: SizeT,
    Op: ReduceOp<T>,
{
    pub fn new(op: Op) -> Self {
        Self {
            op,
            types: PhantomData,
        }
    }

    pub fn element_bytes(&self) -> usize {
        size_of::<T>()
    }

    pub fn size_bytes(&self) -> usize {
        size_of::<S>()
    }

    pub fn element_type(&self) -> &'static str {
        type_name::<T>()
    }

    pub fn size_type(&self) -> &'static str {
        S::NAME
    }

    pub fn op_type(&self) -> &'static str {
        type_name::<Op>()
    }

    /// Converts an element count into the size type.
    pub fn size_of_input(&self, num_elements: usize) -> Option<S> {
        S::from_usize(num_elements)
    }
}
