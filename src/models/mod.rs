//! Data models for papertray.
//!
//! This module contains the core data structures shared by the pipeline stages.

mod document;
mod entity;
mod events;
mod metadata;
mod tracked;

pub use document::{Document, DocumentId, NewDocument, StorageMode};
pub use entity::{
    Correspondent, EntityId, Matchable, MatchRule, MatchingAlgorithm, NewEntity, Tag,
};
pub use events::{ConsumptionEvent, EventMeta};
pub use metadata::{ExtractedMetadata, ResolvedMetadata};
pub use tracked::{FileIdentity, TrackState, TrackedFile};
