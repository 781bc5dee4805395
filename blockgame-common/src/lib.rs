#[macro_use]
extern crate serde_derive;

pub mod aabb;
pub mod physics;
pub mod util;
pub mod world;

pub mod prelude {
    pub use super::util;

    pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
    pub use anyhow::{anyhow, bail};

    pub use nalgebra::{point, vector};
}

/// The three world axes, in the order the collision sweep tests them.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index into nalgebra points and vectors.
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub fn is_horizontal(self) -> bool {
        !matches!(self, Axis::Y)
    }
}
