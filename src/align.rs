/// Rounds `value` up to the next multiple of [`ALIGNMENT`](crate::ALIGNMENT).
///
/// Every block size and every payload address handed out by the allocator is
/// a multiple of this double-word boundary.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::ALIGNMENT - 1) & !($crate::ALIGNMENT - 1)
  };
}
