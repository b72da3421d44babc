//! Wander Wheel Core Library
//!
//! Selection wheel animation and rendering, plus the discovery, rewards and
//! social logic that runs on top of a pluggable document/object backend.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod animation;
pub mod backend;
pub mod color;
pub mod discovery;
pub mod memory;
pub mod model;
pub mod render;
pub mod rewards;
pub mod social;
pub mod wheel;

pub use animation::{EasingType, Tween};
pub use backend::{BackendError, DocumentStore, Mutation, ObjectStore, Query, Snapshot, Subscription};
pub use color::{Color, Palette};
pub use discovery::{AdventureDay, DiscoveryError, DiscoveryService, ShakeDetector};
pub use memory::MemoryBackend;
pub use render::{DrawCommand, Frame, WheelCanvas, WheelLayout};
pub use rewards::{LevelProgress, RewardsError, RewardsService};
pub use social::{SocialError, SocialService};
pub use wheel::{SelectionWheel, SpinCompletion, SpinError, SpinOutcome, SpinResult, TickOutcome, WheelConfig};
