//! Core HTTP protocol abstractions.
//!
//! - **Message Handling** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`]
//!   describe a message as a head followed by payload items
//! - **Request Processing** ([`request`]): [`RequestHeader`]
//! - **Response Processing** ([`response`]): [`ResponseHead`] and the no-body status rule
//! - **Response Bodies** ([`body`]): [`ResponseBody`], the lazy body applications return
//! - **Error Handling** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::status_has_no_body;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

mod body;
pub use body::ResponseBody;
