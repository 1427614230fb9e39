use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{self, Debug};

use crate::id::{MessageId, RecordId, Timestamp, VersionId};

/// The named collections the conversation core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Messages,
    MessageVersions,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Messages => "messages",
            Collection::MessageVersions => "message_versions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error type for row encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode {collection} row: {reason}")]
    Encode {
        collection: Collection,
        reason: String,
    },
    #[error("failed to decode {collection} row {id}: {reason}")]
    Decode {
        collection: Collection,
        id: RecordId,
        reason: String,
    },
}

/// A typed row of a [`Collection`].
///
/// Rows are persisted as the CBOR encoding of their `Body` (every field but
/// the id). The id is the row key and is assigned by the store on insert.
pub trait Record: Debug + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Persisted fields.
    type Body: Serialize + DeserializeOwned + Send + Sync;

    /// Partial update accepted by [`crate::Table::update`].
    type Patch: Send;

    fn from_row(id: RecordId, body: Self::Body) -> Self;

    fn id(&self) -> RecordId;

    fn apply(body: &mut Self::Body, patch: Self::Patch);

    /// Serializes a body to CBOR bytes.
    fn encode(body: &Self::Body) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        ciborium::into_writer(body, &mut out).map_err(|e| CodecError::Encode {
            collection: Self::COLLECTION,
            reason: e.to_string(),
        })?;
        Ok(out)
    }

    /// Deserializes a body from CBOR bytes.
    fn decode(id: RecordId, data: &[u8]) -> Result<Self::Body, CodecError> {
        ciborium::from_reader(data).map_err(|e| CodecError::Decode {
            collection: Self::COLLECTION,
            id,
            reason: e.to_string(),
        })
    }
}

/// One node of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    /// `None` marks a root.
    pub parent_id: Option<MessageId>,
    /// Starts at 1 and increments on every edit.
    pub current_version: u32,
    pub created_at: Timestamp,
}

impl Message {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub content: String,
    pub parent_id: Option<MessageId>,
    pub current_version: u32,
    pub created_at: Timestamp,
}

/// Fields of a message that may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub current_version: Option<u32>,
}

impl Record for Message {
    const COLLECTION: Collection = Collection::Messages;
    type Body = MessageBody;
    type Patch = MessagePatch;

    fn from_row(id: RecordId, body: MessageBody) -> Self {
        Message {
            id,
            content: body.content,
            parent_id: body.parent_id,
            current_version: body.current_version,
            created_at: body.created_at,
        }
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn apply(body: &mut MessageBody, patch: MessagePatch) {
        if let Some(content) = patch.content {
            body.content = content;
        }
        if let Some(version) = patch.current_version {
            body.current_version = version;
        }
    }
}

/// An immutable snapshot of a message's content at some version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub id: VersionId,
    pub message_id: MessageId,
    pub content: String,
    pub version: u32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBody {
    pub message_id: MessageId,
    pub content: String,
    pub version: u32,
    pub created_at: Timestamp,
}

impl Record for VersionRecord {
    const COLLECTION: Collection = Collection::MessageVersions;
    type Body = VersionBody;
    // Ledger entries are never updated in place.
    type Patch = Infallible;

    fn from_row(id: RecordId, body: VersionBody) -> Self {
        VersionRecord {
            id,
            message_id: body.message_id,
            content: body.content,
            version: body.version,
            created_at: body.created_at,
        }
    }

    fn id(&self) -> RecordId {
        self.id
    }

    fn apply(_body: &mut VersionBody, patch: Infallible) {
        match patch {}
    }
}
