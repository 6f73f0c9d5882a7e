// Application Layer - Fleet management, scaling loop, supervision

pub mod autoscaler;
pub mod fleet;
pub mod shutdown;
pub mod supervisor;

pub use autoscaler::{AutoScaler, ScaleAction, ScalePolicy};
pub use fleet::{Fleet, FleetSize, WorkerSnapshot};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use supervisor::{StopHandle, Supervisor, SupervisorState};
