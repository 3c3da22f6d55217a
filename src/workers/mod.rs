//! Bounded execution of expensive external work.

mod process;
mod publish_dispatcher;
mod publish_pool;
mod render_pool;

pub use process::{
    ExitFuture, ProcessExit, ProcessLauncher, RenderError, RenderRequest, TokioProcessLauncher,
};
pub use publish_dispatcher::{PublishDispatcher, PublishTick};
pub use publish_pool::{PublishPool, PublishSlot};
pub use render_pool::{Admission, RenderPool};
