//! The unit of hand-off between the stream consumer and the log writer.

/// Time bucket id. Minutes since the Unix epoch with the default rotation
/// granularity.
pub type BucketId = u64;

/// One serialized record bound for the file of `bucket`.
///
/// `payload` is a complete line including its trailing `\n`. Buckets are
/// usually non-decreasing but may repeat or go backwards after a wall-clock
/// correction; the writer handles that without reordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteItem {
    pub bucket: BucketId,
    pub payload: Vec<u8>,
}

impl WriteItem {
    pub fn new(bucket: BucketId, payload: Vec<u8>) -> Self {
        Self { bucket, payload }
    }
}
