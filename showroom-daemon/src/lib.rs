//! Session daemon: holds the store token and the pending-image staging area
//! for one editing session, and funnels every publish through one queue.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_clear, request_pending, request_publish, request_stage, request_status, request_stop,
    request_unstage, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, run_with_session, start_blocking, PublishSummary, Session};
