//! HTTP response header handling.
//!
//! The response head is the standard `http::Response` with an empty body placeholder,
//! plus the status rules shared by the chunking gate and the connection driver.

use http::{Response, StatusCode};

/// Type alias for HTTP response headers.
///
/// This type represents the header portion of an HTTP response, using
/// `http::Response<()>` with an empty body placeholder.
pub type ResponseHead = Response<()>;

/// Returns true for statuses that never carry a message body: 1xx, 204 and 304.
#[inline]
pub fn status_has_no_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
