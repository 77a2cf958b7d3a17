//! Traits for working with correlation tokens on messages.
//!
//! `CorrelatableFrame` abstracts over the two message shapes the bridge
//! handles: local bus messages keep the token in a header, broker messages
//! in their native correlation field. The router copies tokens between the
//! two without knowing either representation.

/// Access and mutate correlation tokens on messages.
pub trait CorrelatableFrame {
    /// Return the correlation token associated with this message, if any.
    fn correlation_id(&self) -> Option<&str>;

    /// Set or clear the correlation token.
    fn set_correlation_id(&mut self, correlation_id: Option<String>);
}

/// Copy the correlation token from `source` to `target`.
///
/// A missing token on `source` is written as the empty token, never as an
/// absent one, so the field is present on every relayed message.
pub fn copy_correlation<S, T>(source: &S, target: &mut T)
where
    S: CorrelatableFrame + ?Sized,
    T: CorrelatableFrame + ?Sized,
{
    let token = source.correlation_id().unwrap_or_default().to_owned();
    target.set_correlation_id(Some(token));
}
