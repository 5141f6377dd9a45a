pub mod cycle;
pub mod dispatch;

pub use cycle::{CycleReport, CycleRunner, Tracker, WindowConfig};
pub use dispatch::{BroadcastDispatcher, Dispatcher, LogDispatcher};
