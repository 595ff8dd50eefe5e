pub mod redpanda;
pub mod sink;

pub use redpanda::RedpandaSink;
pub use sink::{EventSink, OutboundEvent, PublishError};
