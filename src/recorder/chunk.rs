use serde::Serialize;

/// Which recorder produced a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// A discrete binary slice of captured media.
///
/// Produced by a recorder on each flush boundary. Chunks carry no sequence
/// number: order is the order of arrival at the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    kind: MediaKind,
    payload: Vec<u8>,
}

impl MediaChunk {
    pub fn new(kind: MediaKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
