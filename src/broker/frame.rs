//! Wire frames exchanged between [`super::BrokerClient`] and
//! [`super::BrokerServer`].
//!
//! Frames are bincode-encoded with the standard configuration and carried
//! inside length-delimited packets.

use bincode::{
    Decode,
    Encode,
    config,
    decode_from_slice,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

use super::BrokerMessage;

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Frame {
    /// Client asks the broker to enqueue a message.
    Send {
        receipt: u64,
        message: BrokerMessage,
    },
    /// Client starts consuming a queue under `subscription`.
    Subscribe {
        receipt: u64,
        subscription: u64,
        queue: String,
    },
    /// Broker acknowledges the request numbered `receipt`.
    Receipt { receipt: u64 },
    /// Broker rejects the request numbered `receipt`.
    Error { receipt: u64, reason: String },
    /// Broker delivers a message to a subscription.
    Deliver {
        subscription: u64,
        message: BrokerMessage,
    },
    /// Client stops consuming under `subscription`.
    Unsubscribe { subscription: u64 },
    /// Client hands back a delivery nobody consumed; the broker requeues it.
    Release { message: BrokerMessage },
}

impl Frame {
    /// Encode the frame into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Decode a frame, rejecting trailing bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the bytes are not exactly one frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (frame, consumed) = decode_from_slice(bytes, config::standard())?;
        if consumed != bytes.len() {
            return Err(DecodeError::OtherString(format!(
                "{} trailing bytes after frame",
                bytes.len() - consumed
            )));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Frame::Receipt { receipt: 1 }
            .to_bytes()
            .expect("encode receipt");
        bytes.push(0);
        assert!(Frame::from_bytes(&bytes).is_err());
    }

    #[test]
    fn deliver_frame_keeps_correlation() {
        let frame = Frame::Deliver {
            subscription: 3,
            message: BrokerMessage::new("orders.REPLY", "HELLO").with_correlation_id("abc-123"),
        };
        let bytes = frame.to_bytes().expect("encode deliver");
        assert_eq!(Frame::from_bytes(&bytes).expect("decode deliver"), frame);
    }

    #[test]
    fn unsubscribe_is_distinct_from_receipt() {
        let bytes = Frame::Unsubscribe { subscription: 9 }
            .to_bytes()
            .expect("encode unsubscribe");
        assert_eq!(
            Frame::from_bytes(&bytes).expect("decode unsubscribe"),
            Frame::Unsubscribe { subscription: 9 }
        );
    }
}
