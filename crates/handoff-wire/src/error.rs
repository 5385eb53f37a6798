//! Error types for the wire layer.

/// Errors raised while *encoding* a frame.
///
/// Decoding doesn't use this type: a frame that can't be decoded is
/// simply `None`, so a malformed packet never becomes an error path the
/// caller has to special-case.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A string or blob exceeds the limit configured for its field.
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A required string field is empty or whitespace.
    #[error("{0} must not be blank")]
    BlankField(&'static str),

    /// The encoded frame would exceed the overall frame size limit.
    #[error("frame is {size} bytes, limit is {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// A message channel id outside the allowed length range.
    #[error("invalid channel id length {0}")]
    InvalidChannel(usize),

    /// A numeric field can't be represented (e.g. a negative TTL).
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}
