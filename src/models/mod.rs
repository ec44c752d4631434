mod assigned_task;
mod task;
mod user;

pub use assigned_task::{AssignStatus, AssignedTask};
pub use task::{Frequency, LogAction, LogEntry, PersonalTask, Priority, TaskStatus};
pub use user::{User, UserRef};
