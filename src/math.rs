use std::mem::size_of;

use num_traits::{PrimInt, Zero};

/// Commonly used bit arithmetic on integer primitives.
pub(crate) trait Log: PrimInt + Zero {
    /// The minimum number of bits required to store a positive integer in binary, or 0 for zero.
    ///
    /// For any `x >= 0` this equals `ceil(log2(x + 1))`, which is the
    /// field width the codestream uses to store a value known to be at
    /// most `x`.
    #[inline(always)]
    fn bit_len(self) -> u32 {
        (size_of::<Self>() * 8) as u32 - self.leading_zeros()
    }
}

impl Log for u32 {}

impl Log for usize {}
