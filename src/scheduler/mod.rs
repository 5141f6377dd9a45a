pub mod pool;
pub mod poller;

pub use pool::CyclePool;
pub use poller::{CycleState, PollScheduler, SchedulerStats};
