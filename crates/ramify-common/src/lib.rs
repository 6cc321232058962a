pub mod capacity;
pub mod error;
pub mod id;
pub mod model;
pub mod source_ref;

pub use capacity::*;
pub use error::*;
pub use id::*;
pub use model::*;
pub use source_ref::*;
