pub mod task;
pub mod vm;

pub use task::{Task, TaskStatus, TaskType};
pub use vm::{Vm, VmStatus};
