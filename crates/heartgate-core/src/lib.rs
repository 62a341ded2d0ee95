//! # Heartgate Core Library
//!
//! This library provides the core engine for a real-time group fitness
//! dashboard: heart-rate samples come in, rewards accrue, and access to
//! shared media is governed by whether the room keeps moving. All state
//! lives in a [`Session`] the caller owns and drives; there are no
//! background threads and no wall-clock reads inside the engines, so
//! every path is deterministic under test.
//!
//! ## Architecture
//!
//! - **Activity Monitor**: liveness tracking with two silence
//!   thresholds and a per-participant tick-grid presence mask
//! - **Treasure Box**: zone-based coin accrual with sub-unit remainder
//!   carry across samples and zone changes
//! - **Governance**: a phase state machine (Idle/Init/Green/Yellow/Red)
//!   gating media playback, with grace countdowns and timed challenges
//! - **Timeline**: gap-aware reconstruction of recorded series into
//!   render-ready chart paths
//!
//! ## Key Components
//!
//! - [`Session`]: lifecycle container wiring all engines together
//! - [`TreasureBox`]: reward accrual engine
//! - [`GovernanceEngine`]: playback gatekeeper
//! - [`SessionConfig`]: TOML/JSON configuration with permissive key
//!   normalization

pub mod activity;
pub mod config;
pub mod error;
pub mod events;
pub mod governance;
pub mod roster;
pub mod session;
pub mod timeline;
pub mod timing;
pub mod treasure;
pub mod zone;

pub use activity::ActivityMonitor;
pub use config::{
    ActivityConfig, ChallengeConfig, ChallengeSelection, GovernancePolicy, RequirementRule,
    RuleKeyword, SelectionType, SessionConfig, UserConfig,
};
pub use error::{ConfigError, CoreError, ValidationError};
pub use events::Event;
pub use governance::{
    ActiveChallenge, ChallengeOutcome, ChallengeStatus, GovernanceEngine, GovernancePhase,
    GovernanceState, NextChallengePreview, RequirementStatus,
};
pub use roster::{MediaDescriptor, Participant, SensorSample};
pub use session::Session;
pub use timeline::{
    map_segments, polish_segments, reconstruct, ChartPath, ChartSegment, MappingConfig,
    ReconstructInput, SegmentStatus, SeriesRow, SeriesStore,
};
pub use treasure::{RewardSummary, TreasureBox, UserReward};
pub use zone::{ZoneDefinition, ZoneSet};
