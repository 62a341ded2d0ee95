//! Normalized session configuration.
//!
//! External configuration arrives as loosely-typed JSON or TOML with
//! naming variants (`min_participants` vs `minParticipants`). That is
//! absorbed HERE, once, via serde aliases; everything past this module
//! works on a single validated schema and never branches on alternate
//! key spellings.
//!
//! Missing sections degrade rather than fail: no zones means zero
//! accrual, no policies means governance never engages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::zone::{ZoneDefinition, ZoneSet};

fn default_coin_time_unit_ms() -> u64 {
    60_000
}
fn default_grace_period_secs() -> u64 {
    30
}
fn default_weight() -> u32 {
    1
}
fn default_sweep_period_ms() -> u64 {
    3_000
}
fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_inactive_after_ms() -> u64 {
    10_000
}
fn default_remove_after_ms() -> u64 {
    60_000
}

/// A headcount requirement, either literal or proportional.
///
/// Proportions resolve against the number of active participants:
/// `all` = 100%, `most`/`majority` = ⌈50%⌉, `some` = ⌈30%⌉, `any` = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementRule {
    Count(u32),
    Keyword(RuleKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKeyword {
    All,
    #[serde(alias = "majority")]
    Most,
    Some,
    Any,
}

impl RequirementRule {
    /// Resolve to a literal headcount for `active` participants.
    pub fn required_count(&self, active: usize) -> usize {
        match self {
            RequirementRule::Count(n) => *n as usize,
            RequirementRule::Keyword(RuleKeyword::All) => active,
            RequirementRule::Keyword(RuleKeyword::Most) => active.div_ceil(2),
            RequirementRule::Keyword(RuleKeyword::Some) => (active * 3).div_ceil(10),
            RequirementRule::Keyword(RuleKeyword::Any) => 1,
        }
    }
}

/// How a challenge picks its next selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionType {
    Random,
    Cyclic,
    Weighted,
}

/// One selectable challenge target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSelection {
    /// Target zone id.
    pub zone: String,
    /// How many participants must reach it.
    pub rule: RequirementRule,
    /// Time allowed once the challenge fires.
    #[serde(alias = "timeLimitSeconds")]
    pub time_limit_seconds: u64,
    /// Draw weight for `SelectionType::Weighted`.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Static challenge configuration attached to a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    pub id: String,
    /// [min, max] seconds between a challenge ending and the next firing.
    #[serde(alias = "intervalRangeSeconds")]
    pub interval_range_seconds: [u64; 2],
    /// Challenges only schedule at or above this headcount.
    #[serde(default, alias = "minParticipants")]
    pub min_participants: u32,
    #[serde(alias = "selectionType")]
    pub selection_type: SelectionType,
    #[serde(default)]
    pub selections: Vec<ChallengeSelection>,
}

/// A governance policy: the base zone requirements plus its challenges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernancePolicy {
    pub id: String,
    pub name: String,
    /// Policy applies at or above this active-participant count.
    #[serde(default, alias = "minParticipants")]
    pub min_participants: u32,
    /// zone id -> rule; all entries must hold for phase Green.
    #[serde(default, alias = "baseRequirement")]
    pub base_requirement: BTreeMap<String, RequirementRule>,
    #[serde(default)]
    pub challenges: Vec<ChallengeConfig>,
}

/// A registered (non-guest) user and the sensor device assigned to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    #[serde(default, alias = "deviceId")]
    pub device_id: Option<String>,
}

/// Activity sweep thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// How often the liveness sweep runs.
    #[serde(default = "default_sweep_period_ms", alias = "sweepPeriodMs")]
    pub sweep_period_ms: u64,
    /// Silence before a participant is flagged inactive (state kept).
    #[serde(default = "default_inactive_after_ms", alias = "inactiveAfterMs")]
    pub inactive_after_ms: u64,
    /// Silence before their record is deleted outright.
    #[serde(default = "default_remove_after_ms", alias = "removeAfterMs")]
    pub remove_after_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sweep_period_ms: default_sweep_period_ms(),
            inactive_after_ms: default_inactive_after_ms(),
            remove_after_ms: default_remove_after_ms(),
        }
    }
}

/// Complete normalized configuration for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Milliseconds of in-zone time per coin payout.
    #[serde(default = "default_coin_time_unit_ms", alias = "coinTimeUnitMs")]
    pub coin_time_unit_ms: u64,
    /// Spacing of the shared timeline tick grid.
    #[serde(default = "default_tick_interval_ms", alias = "tickIntervalMs")]
    pub tick_interval_ms: u64,
    /// Ordered ascending by `min` after normalization.
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub policies: Vec<GovernancePolicy>,
    /// Media labels/types that governance applies to.
    #[serde(default, alias = "governedLabels")]
    pub governed_labels: Vec<String>,
    /// Seconds of grace after Green is lost before Red. Zero = no grace.
    #[serde(default = "default_grace_period_secs", alias = "gracePeriodSecs")]
    pub grace_period_secs: u64,
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coin_time_unit_ms: default_coin_time_unit_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            zones: Vec::new(),
            users: Vec::new(),
            policies: Vec::new(),
            governed_labels: Vec::new(),
            grace_period_secs: default_grace_period_secs(),
            activity: ActivityConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Build the validated zone set (sorted, strictly monotonic `min`).
    pub fn zone_set(&self) -> Result<ZoneSet, ConfigError> {
        ZoneSet::new(self.zones.clone()).map_err(|e| ConfigError::InvalidValue {
            key: "zones".to_string(),
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.zone_set()?;
        if self.coin_time_unit_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "coin_time_unit_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        for policy in &self.policies {
            for challenge in &policy.challenges {
                let [min, max] = challenge.interval_range_seconds;
                if min > max {
                    return Err(ConfigError::InvalidValue {
                        key: format!("policies.{}.challenges.{}", policy.id, challenge.id),
                        message: format!("interval range [{min}, {max}] is inverted"),
                    });
                }
            }
        }
        Ok(())
    }
}
