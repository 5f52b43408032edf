pub mod descriptor;
pub mod event;
pub mod format;
pub mod queue;

pub use descriptor::*;
pub use event::*;
pub use format::*;
pub use queue::*;
