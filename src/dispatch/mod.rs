//! Timer-driven queue consumers.

mod dispatch_loop;
mod job;
mod periodic;
mod single_flight;

pub use dispatch_loop::{DispatchLoop, TickOutcome};
pub use job::{required_int, required_str, AckPolicy, JobError, JobHandler};
pub use periodic::spawn_periodic;
pub use single_flight::{SingleFlight, SingleFlightGuard};
