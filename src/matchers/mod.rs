//! Chart formation matchers
//!
//! Each matcher scans the extrema sequence of a [`MatchContext`](crate::MatchContext) and
//! yields zero or more [`PatternCandidate`](crate::PatternCandidate)s with entry, target and
//! stop derived from the formation's geometry.
//!
//! # Families
//!
//! - **Reversal**: Head & Shoulders (and inverse), Double/Triple Top/Bottom, Rounding
//! - **Continuation**: Triangles, Flags/Pennants, Wedges, Channels, Rectangles
//! - **Broadening**: Broadening formation, Diamond Top/Bottom

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple matcher types.
macro_rules! impl_with_defaults {
  ($($matcher:ty),* $(,)?) => {
    $(impl $matcher {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod broadening;
pub mod continuation;
pub mod reversal;

#[cfg(test)]
pub(crate) mod testing;

// Re-export all matchers for convenience
pub use broadening::*;
pub use continuation::*;
pub use reversal::*;
