//! Version tracking and undo support.

pub mod caretaker;
pub mod storage;

pub use caretaker::{Caretaker, ChangeEvent, ChangeKind, Memento};
pub use storage::{Tracking, VersionStorage};
