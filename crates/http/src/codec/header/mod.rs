//! Response head encoding.
//!
//! - [`HeadEncoder`]: writes the status line and the header block of a
//!   [`ResponseHead`](crate::protocol::ResponseHead)

mod head_encoder;

pub(crate) use head_encoder::FastWrite;
pub use head_encoder::HeadEncoder;
