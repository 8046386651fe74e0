pub mod array;
pub mod bounds;
pub mod errors;
pub mod search;

pub use array::*;
pub use bounds::*;
pub use errors::*;
pub use search::*;
