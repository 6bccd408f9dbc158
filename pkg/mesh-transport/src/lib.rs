pub mod errors;
pub mod frame;
pub mod link;

pub use errors::*;
pub use frame::*;
pub use link::*;
