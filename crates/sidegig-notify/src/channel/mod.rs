mod backoff;
mod local;
pub(crate) mod subscriber;
mod types;

pub use backoff::Backoff;
pub use local::InProcessChannel;
pub use types::{
    ChangeOp, ChannelError, ChannelMessage, ChannelStream, ChannelTransport, RowChange, RowRef,
};
