/// A type with a maximum value constant; the maximum doubles as the
/// "no value" sentinel in the stores.
pub trait Max {
    const MAX: Self;
}

impl Max for u8 {
    const MAX: u8 = u8::MAX;
}

impl Max for u16 {
    const MAX: u16 = u16::MAX;
}

impl Max for u32 {
    const MAX: u32 = u32::MAX;
}

impl Max for usize {
    const MAX: usize = usize::MAX;
}

/// Shorthand for the traits an arena index type must satisfy. Stores vend
/// values of these types to reference stored entries; choosing a narrow
/// width (u8/u16) keeps long-running forests small when the sample size
/// permits it.
pub trait Location:
    Copy + Max + std::cmp::PartialEq + TryFrom<usize> + std::marker::Send + Sync
{
}

impl Location for u8 {}
impl Location for u16 {}
impl Location for u32 {}
impl Location for usize {}
