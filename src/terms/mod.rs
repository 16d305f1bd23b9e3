pub mod entry;
pub mod index;

pub use entry::*;
pub use index::*;
