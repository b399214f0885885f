pub mod enums;
pub mod tracker;

pub use enums::*;
pub use tracker::*;
