//! Middleware shipped with micro-web.

mod log;

pub use log::{log, real_ip, DefaultErrorReporter, ErrorReporter, Log, PanicError, StatusTier};
