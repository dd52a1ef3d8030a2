//! Utilities for bp-lang.

mod join;
mod locatable;
mod location;

pub(crate) use join::Join;
pub use locatable::Locatable;
pub use location::{LineIndex, Location};
