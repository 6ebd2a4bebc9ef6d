use crate::protocol::Frame;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a replicated mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Put,
    Delete,
}

impl MutationKind {
    /// Command name used when the mutation travels over the wire
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Delete => "del",
        }
    }
}

/// One logical PUT or DELETE event.
///
/// Produced once per successful mutating command on the primary, handed to the
/// mutation broadcast and consumed by whichever replica session drains it. The
/// store's write-ahead log records the same type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub key: Bytes,
    /// Always empty for `Delete`
    pub value: Bytes,
}

impl MutationRecord {
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            kind: MutationKind::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Bytes>) -> Self {
        Self {
            kind: MutationKind::Delete,
            key: key.into(),
            value: Bytes::new(),
        }
    }

    /// Encode as the multi-value reply streamed to replicas:
    /// `put key value` or `del key`.
    pub fn to_frame(&self) -> Frame {
        let name = Frame::Bulk(Bytes::from_static(self.kind.command_name().as_bytes()));
        match self.kind {
            MutationKind::Put => Frame::Array(vec![
                name,
                Frame::Bulk(self.key.clone()),
                Frame::Bulk(self.value.clone()),
            ]),
            MutationKind::Delete => Frame::Array(vec![name, Frame::Bulk(self.key.clone())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_frame_shape() {
        let frame = MutationRecord::put("k", "v").to_frame();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("put")),
                Frame::Bulk(Bytes::from("k")),
                Frame::Bulk(Bytes::from("v")),
            ])
        );
    }

    #[test]
    fn test_delete_has_empty_value() {
        let record = MutationRecord::delete("gone");
        assert!(record.value.is_empty());
        assert_eq!(
            record.to_frame(),
            Frame::Array(vec![
                Frame::Bulk(Bytes::from("del")),
                Frame::Bulk(Bytes::from("gone")),
            ])
        );
    }
}
