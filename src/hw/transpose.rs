//! Square tile transposes used by the channel converter.
//!
//! A tile is `W` rows of `W` samples. The converter loads `W` channels by `W`
//! frames, transposes, and stores `W` frames by `W` channels (or the reverse).
//! Only moves happen here, so every width produces bit-identical output.

use crate::Sample;
use crate::error::{ErrorCode, PadError, Result};

pub const VECTOR_WIDTHS: &[usize] = &[8, 4, 2, 1];
pub const SCALAR_WIDTHS: &[usize] = &[1];

/// Descending list of tile widths tried by the converter. Always ends in 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransposePlan {
    widths: &'static [usize],
}

impl Default for TransposePlan {
    fn default() -> Self {
        Self::from_options(cfg!(feature = "scalar"))
    }
}

impl TransposePlan {
    pub const fn vector() -> Self {
        Self {
            widths: VECTOR_WIDTHS,
        }
    }

    pub const fn scalar() -> Self {
        Self {
            widths: SCALAR_WIDTHS,
        }
    }

    pub fn from_options(scalar: bool) -> Self {
        if scalar { Self::scalar() } else { Self::vector() }
    }

    /// Custom width list, e.g. `&[4, 1]` to keep tiles small.
    pub fn with_widths(widths: &'static [usize]) -> Result<Self> {
        let supported = widths.iter().all(|w| VECTOR_WIDTHS.contains(w));
        let descending = widths.windows(2).all(|p| p[0] > p[1]);
        if !supported || !descending || widths.last() != Some(&1) {
            return Err(PadError::soft(
                ErrorCode::InvalidBufferSize,
                format!("transpose widths {widths:?} must descend through 8, 4, 2, 1 and end in 1"),
            ));
        }
        Ok(Self { widths })
    }

    pub fn widths(&self) -> &'static [usize] {
        self.widths
    }

    pub fn is_scalar(&self) -> bool {
        self.widths == SCALAR_WIDTHS
    }
}

pub trait Tile: Copy {
    const WIDTH: usize;
    const ZERO: Self;
    fn row(&self, index: usize) -> &[Sample];
    fn row_mut(&mut self, index: usize) -> &mut [Sample];
    fn transpose(&mut self);
}

/// Swap the off-diagonal halves at every power-of-two level. After the pass
/// for bit `half`, rows and columns have exchanged that bit of their index.
fn butterfly<const W: usize>(m: &mut [[Sample; W]; W]) {
    let mut half = W / 2;
    while half > 0 {
        for row in 0..W {
            if row & half != 0 {
                continue;
            }
            for col in 0..W {
                if col & half == 0 {
                    continue;
                }
                let tmp = m[row][col];
                m[row][col] = m[row + half][col - half];
                m[row + half][col - half] = tmp;
            }
        }
        half /= 2;
    }
}

macro_rules! portable_tile {
    ($w:literal) => {
        impl Tile for [[Sample; $w]; $w] {
            const WIDTH: usize = $w;
            const ZERO: Self = [[0.0; $w]; $w];

            fn row(&self, index: usize) -> &[Sample] {
                &self[index]
            }

            fn row_mut(&mut self, index: usize) -> &mut [Sample] {
                &mut self[index]
            }

            #[inline]
            fn transpose(&mut self) {
                butterfly::<$w>(self);
            }
        }
    };
}

portable_tile!(8);
portable_tile!(4);

impl Tile for [[Sample; 2]; 2] {
    const WIDTH: usize = 2;
    const ZERO: Self = [[0.0; 2]; 2];

    fn row(&self, index: usize) -> &[Sample] {
        &self[index]
    }

    fn row_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self[index]
    }

    #[inline]
    fn transpose(&mut self) {
        #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
        {
            sse2::transpose2(self);
        }
        #[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
        {
            butterfly::<2>(self);
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
mod sse2 {
    use crate::Sample;
    use std::arch::x86_64::{_mm_loadu_pd, _mm_storeu_pd, _mm_unpackhi_pd, _mm_unpacklo_pd};

    #[inline]
    pub(super) fn transpose2(m: &mut [[Sample; 2]; 2]) {
        // SAFETY: sse2 is part of the x86_64 baseline and each row is exactly
        // two contiguous f64 values; unaligned loads and stores are used.
        unsafe {
            let r0 = _mm_loadu_pd(m[0].as_ptr());
            let r1 = _mm_loadu_pd(m[1].as_ptr());
            _mm_storeu_pd(m[0].as_mut_ptr(), _mm_unpacklo_pd(r0, r1));
            _mm_storeu_pd(m[1].as_mut_ptr(), _mm_unpackhi_pd(r0, r1));
        }
    }
}
