pub mod attendee_ctx;
pub mod attendee_flow;
pub mod retry;

pub use attendee_ctx::AttendeeCtx;
pub use attendee_flow::{AttendeeFlow, ProcessResult};
pub use retry::RetryPolicy;
