//! Capability registry - the closed set of abilities agents can advertise.
//!
//! Dispatch is pure set containment: a task is routable to an agent iff the
//! task's required capabilities are a subset of the agent's advertised set.
//! No reflection, no runtime conformance checks.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete ability an agent may advertise and a task may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Plain prompt-in, text-out completion. Every model family has this.
    BasicCompletion,
    TextGeneration,
    CodeGeneration,
    CodeCompletion,
    Conversational,
    TextAnalysis,
    Summarization,
    Translation,
    QuestionAnswering,
    Planning,
    Reasoning,
    DataAnalysis,
    ImageGeneration,
    AudioTranscription,
}

impl Capability {
    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::BasicCompletion => "basic_completion",
            Capability::TextGeneration => "text_generation",
            Capability::CodeGeneration => "code_generation",
            Capability::CodeCompletion => "code_completion",
            Capability::Conversational => "conversational",
            Capability::TextAnalysis => "text_analysis",
            Capability::Summarization => "summarization",
            Capability::Translation => "translation",
            Capability::QuestionAnswering => "question_answering",
            Capability::Planning => "planning",
            Capability::Reasoning => "reasoning",
            Capability::DataAnalysis => "data_analysis",
            Capability::ImageGeneration => "image_generation",
            Capability::AudioTranscription => "audio_transcription",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unordered collection of capabilities with set semantics.
///
/// Backed by a `BTreeSet` so iteration order is deterministic in logs and
/// error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Check that every capability in `other` is present in `self`.
    pub fn contains_all(&self, other: &CapabilitySet) -> bool {
        other.0.is_subset(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(capabilities: [Capability; N]) -> Self {
        Self(capabilities.into_iter().collect())
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for capability in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(capability.as_str())?;
        }
        Ok(())
    }
}

/// Pure containment check used by the dispatcher and by agents before
/// accepting a task.
///
/// # Property
/// `is_supported(r, p) == r.iter().all(|c| p.contains(c))`; no side effects,
/// no failure modes.
pub fn is_supported(required: &CapabilitySet, provided: &CapabilitySet) -> bool {
    provided.contains_all(required)
}

/// First required capability missing from `provided`, in `Capability` order.
///
/// Used to name the offending capability in rejection errors. Returns `None`
/// when the requirement is fully covered.
pub fn first_missing(required: &CapabilitySet, provided: &CapabilitySet) -> Option<Capability> {
    required.iter().find(|c| !provided.contains(*c))
}
