//! Marker trait for values that can live in a shared region.

/// A fixed-layout value that may be placed in memory shared with another
/// process.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` (or a primitive), contain no pointers,
/// references or handles, and accept the all-zero bit pattern as a valid
/// value. A freshly created region is zero-filled and handed out as `&T`
/// without further initialisation.
pub unsafe trait PlainData: Copy + 'static {}

macro_rules! impl_plain_data {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: primitive numeric type, zero is valid.
            unsafe impl PlainData for $ty {}
        )*
    };
}

impl_plain_data!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

// SAFETY: an array of plain values is itself plain.
unsafe impl<T: PlainData, const N: usize> PlainData for [T; N] {}
