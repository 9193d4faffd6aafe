//! Protocol types shared by the codec and the connection.
//!
//! - **Messages** ([`Message`], [`PayloadItem`], [`PayloadSize`]): a head
//!   followed by body chunks, trailers and the end marker
//! - **Request** ([`RequestHead`], [`TraceIdentifier`]): the parsed head and
//!   the per-request identifier attached to it
//! - **Response** ([`ResponseHead`]): status and headers handed to the encoder
//! - **Bodies** ([`body`]): the request body pipe and streamed responses
//! - **Errors** ([`HttpError`], [`ParseError`], [`HeaderError`], [`SendError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;
pub use request::TraceIdentifier;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::Detail;
pub use error::HeaderError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
