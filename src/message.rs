//! Messages exchanged on the local bus.
//!
//! A [`Message`] carries an opaque payload plus a map of string headers. The
//! correlation token travels in the [`RESPONSE_ID_HEADER`] header; the
//! broker side keeps the same token in its native correlation field (see
//! [`crate::broker::BrokerMessage`]).

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::correlation::CorrelatableFrame;

/// Header holding the application-level correlation token.
pub const RESPONSE_ID_HEADER: &str = "responseId";

/// A message delivered through the local bus.
///
/// # Examples
///
/// ```
/// use busbridge::message::Message;
///
/// let message = Message::new("hello").with_response_id("abc-123");
/// assert_eq!(message.response_id(), Some("abc-123"));
/// assert_eq!(&message.payload()[..], b"hello");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    destination: String,
    payload: Bytes,
    headers: BTreeMap<String, String>,
}

impl Message {
    /// Create a message with the given payload and no headers.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            destination: String::new(),
            payload: payload.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Set the correlation token carried in the `responseId` header.
    #[must_use]
    pub fn with_response_id(mut self, token: impl Into<String>) -> Self {
        self.headers
            .insert(RESPONSE_ID_HEADER.to_owned(), token.into());
        self
    }

    /// Add an arbitrary header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace every header at once.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Destination the message was last sent to, empty before the first send.
    #[must_use]
    pub fn destination(&self) -> &str { &self.destination }

    pub(crate) fn set_destination(&mut self, destination: &str) {
        destination.clone_into(&mut self.destination);
    }

    /// Message payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Payload decoded as UTF-8, if valid.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> { std::str::from_utf8(&self.payload).ok() }

    /// All headers, including `responseId` when present.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> { &self.headers }

    /// Look up a single header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> { self.headers.get(name).map(String::as_str) }

    /// The correlation token, if the sender expects a reply.
    #[must_use]
    pub fn response_id(&self) -> Option<&str> { self.header(RESPONSE_ID_HEADER) }

    /// Split the message into payload and headers.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, BTreeMap<String, String>) { (self.payload, self.headers) }
}

impl CorrelatableFrame for Message {
    fn correlation_id(&self) -> Option<&str> { self.response_id() }

    fn set_correlation_id(&mut self, correlation_id: Option<String>) {
        match correlation_id {
            Some(token) => {
                self.headers.insert(RESPONSE_ID_HEADER.to_owned(), token);
            }
            None => {
                self.headers.remove(RESPONSE_ID_HEADER);
            }
        }
    }
}
