//! Witness consensus scoring.
//!
//! Maps a count of corroborating witnesses to a confidence percentage and a
//! coarse tier. The mapping is a step function over a [`ScoringPolicy`]:
//!
//! | Witnesses | Confidence | Tier   |
//! |-----------|------------|--------|
//! | >= 5      | 95         | high   |
//! | >= 3      | 85         | medium |
//! | >= 1      | 70         | medium |
//! | 0         | 50         | low    |
//!
//! Scoring is pure: the same inputs always give the same score, whether the
//! count was observed or synthesized.

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::types::ConsensusTier;

/// One step of the confidence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceStep {
    /// Minimum witness count for this step.
    pub min_nodes: u32,
    /// Confidence awarded.
    pub confidence: u8,
}

/// Thresholds for turning a witness count into a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringPolicy {
    /// Steps, highest `min_nodes` first.
    pub steps: Vec<ConfidenceStep>,
    /// Confidence when no step applies.
    pub floor_confidence: u8,
    /// Confidence at or above which the tier is high.
    pub high_tier: u8,
    /// Confidence at or above which the tier is medium.
    pub medium_tier: u8,
    /// Minimum confidence for a positive verdict.
    pub min_verified_confidence: u8,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            steps: vec![
                ConfidenceStep { min_nodes: 5, confidence: 95 },
                ConfidenceStep { min_nodes: 3, confidence: 85 },
                ConfidenceStep { min_nodes: 1, confidence: 70 },
            ],
            floor_confidence: 50,
            high_tier: 90,
            medium_tier: 70,
            min_verified_confidence: 70,
        }
    }
}

/// Output of the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusScore {
    /// Confidence 0-100.
    pub confidence_percent: u8,
    /// Bucket.
    pub tier: ConsensusTier,
    /// Verdict.
    pub verified: bool,
}

impl ScoringPolicy {
    /// Score a witness count.
    ///
    /// `location_match` is `None` when no location was claimed; a claimed
    /// location that the witnesses do not match blocks a positive verdict.
    #[must_use]
    pub fn score(&self, node_count: u32, location_match: Option<bool>) -> ConsensusScore {
        let confidence_percent = self
            .steps
            .iter()
            .find(|step| node_count >= step.min_nodes)
            .map_or(self.floor_confidence, |step| step.confidence);

        let tier = if confidence_percent >= self.high_tier {
            ConsensusTier::High
        } else if confidence_percent >= self.medium_tier {
            ConsensusTier::Medium
        } else {
            ConsensusTier::Low
        };

        let verified = node_count > 0
            && confidence_percent >= self.min_verified_confidence
            && location_match.unwrap_or(true);

        ConsensusScore {
            confidence_percent,
            tier,
            verified,
        }
    }

    /// Check that the table is well formed.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self
            .steps
            .windows(2)
            .any(|pair| pair[0].min_nodes <= pair[1].min_nodes)
        {
            return Err(VerifyError::config(
                "scoring steps must be ordered by strictly decreasing minNodes",
            ));
        }
        if self.steps.iter().any(|s| s.min_nodes == 0) {
            return Err(VerifyError::config("scoring step minNodes must be at least 1"));
        }
        let all = self
            .steps
            .iter()
            .map(|s| s.confidence)
            .chain([self.floor_confidence, self.high_tier, self.medium_tier, self.min_verified_confidence]);
        if all.into_iter().any(|c| c > 100) {
            return Err(VerifyError::config("confidence values must be within 0..=100"));
        }
        if self.medium_tier > self.high_tier {
            return Err(VerifyError::config("medium tier threshold exceeds high tier"));
        }
        Ok(())
    }
}

/// Score with the default policy.
#[must_use]
pub fn score(node_count: u32, location_match: Option<bool>) -> ConsensusScore {
    ScoringPolicy::default().score(node_count, location_match)
}
