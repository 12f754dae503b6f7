pub(crate) mod cadence;
pub mod daemon;
pub mod jobs;
pub mod window;

pub use jobs::{JobContext, JobKind, JobReport, Scheduler, WindowRun};
pub use window::{RunWindow, WindowPolicy, plan_window};
