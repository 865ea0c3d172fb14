//! Task identity, lifecycle tracking and result handles.

mod handle;
mod record;
mod types;

pub(crate) use handle::ResultSender;
pub use handle::TaskHandle;
pub use record::{TaskInfo, TaskRecord};
pub use types::{PoolState, Priority, ShutdownMode, TaskId, TaskStatus};
