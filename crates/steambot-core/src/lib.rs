//! Per-client concurrency primitives shared by every module: the
//! [`whiteboard`] (last-writer-wins typed store), the [`messageboard`]
//! (typed fan-out broadcast), cooperative [`waiter`] aggregation, and
//! [`cancel`]-aware suspension points.
//!
//! None of this is specific to Steam; it is the scheduling substrate the
//! rest of the workspace runs on, one instance per logged-in account.

pub mod cancel;
pub mod messageboard;
pub mod rate_limit;
pub mod waiter;
pub mod whiteboard;

pub use cancel::{CancelToken, Cancelled};
pub use messageboard::{Messageboard, MessageboardWaiter};
pub use rate_limit::RateLimiter;
pub use waiter::{ResultWaiter, Waiter, WaiterItem};
pub use whiteboard::{Whiteboard, WhiteboardWaiter};
