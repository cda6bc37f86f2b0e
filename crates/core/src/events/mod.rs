pub mod event;
pub mod sink;

pub use event::*;
pub use sink::*;
