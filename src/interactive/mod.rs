//! Local execution: a long-lived worker thread that runs programs and may
//! block on a line of input, and the host that feeds it.
pub mod host;
pub mod io;
pub mod relay;
