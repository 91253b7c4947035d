pub mod dispatcher;
pub mod error;
pub mod sink;

pub use dispatcher::{AlertDispatcher, AlertEvent};
pub use error::AlertError;
pub use sink::{AlertSink, CommandSink, WebhookSink};
