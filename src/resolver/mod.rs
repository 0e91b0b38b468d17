//! Digital twin resolution: associations, stories and device context.

pub mod client;
pub mod types;

// Re-export commonly used types
pub use client::{AssociationResolver, BlockingResolver};
pub use types::{
    extract_story_from_html, Associations, DeviceContext, DigitalTwin, NearestDevice,
    StatidRecord, Story, StoryOptions, StorySource, TwinOptions,
};
