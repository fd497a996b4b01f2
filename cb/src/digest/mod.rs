//! Daily digest of completed and overdue tasks

mod builder;
mod sink;

pub use builder::{Digest, DigestBuilder, DigestError, DigestLine, DigestRun, format_time};
pub use sink::{LogSink, Notification, NotificationSink, NotifyError};
