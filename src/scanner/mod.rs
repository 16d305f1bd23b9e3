pub mod unit;
pub mod change;
pub mod debounce;
pub mod document;
pub mod fetch;
pub mod content;

pub use unit::*;
pub use change::*;
pub use debounce::*;
pub use document::*;
pub use fetch::*;
pub use content::*;
