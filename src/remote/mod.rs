//! Remote execution: transport sessions, scheduler adapters, workspace
//! layout and the job orchestrator.

pub mod handler;
pub mod paths;
pub mod retry;
pub mod scheduler;
pub mod session;

pub use handler::RemoteJobHandler;
pub use scheduler::{RemoteStatus, SchedulerAdapter, SchedulerKind};
pub use session::{CommandOutput, SshSession, TransportChannel};
