//! Core data model: arrays, associations, mesh objects and metadata

pub mod array;
pub mod association;
pub mod ghost;
pub mod meta;
pub mod multiblock;
pub mod object;

pub use array::*;
pub use association::*;
pub use ghost::*;
pub use meta::*;
pub use multiblock::*;
pub use object::*;
