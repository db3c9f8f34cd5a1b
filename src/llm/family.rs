//! Model family classification.
//!
//! A family is derived from the model identifier string whenever a model is
//! selected; it drives the default capability set and the recommended
//! sampling temperature. It is never stored independently of the identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, CapabilitySet};

/// Known model families, plus a catch-all for unrecognized identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    CodeLlama,
    Llama,
    Mistral,
    Mixtral,
    Phi,
    Gemma,
    /// Unrecognized family; carries the original model identifier.
    Other(String),
}

/// Detection tokens in match order. More specific tokens come first so that
/// e.g. "codellama:7b" is not claimed by the "llama" token.
const FAMILY_TOKENS: &[(&str, ModelFamily)] = &[
    ("codellama", ModelFamily::CodeLlama),
    ("mixtral", ModelFamily::Mixtral),
    ("mistral", ModelFamily::Mistral),
    ("llama", ModelFamily::Llama),
    ("phi", ModelFamily::Phi),
    ("gemma", ModelFamily::Gemma),
];

impl ModelFamily {
    /// Classify a model identifier.
    ///
    /// Case-insensitive substring match against the ordered token list;
    /// pure, total, and deterministic. Unknown identifiers map to
    /// `Other(name)` with the identifier preserved verbatim.
    pub fn from_model_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        for (token, family) in FAMILY_TOKENS {
            if lowered.contains(token) {
                return family.clone();
            }
        }
        ModelFamily::Other(name.to_string())
    }

    /// Recommended sampling temperature for this family.
    ///
    /// Code models run cold; Gemma likes a slightly hotter default; everything
    /// else uses the common 0.7.
    pub fn recommended_temperature(&self) -> f32 {
        match self {
            ModelFamily::CodeLlama => 0.3,
            ModelFamily::Gemma => 0.8,
            _ => 0.7,
        }
    }

    /// The capability set an agent advertises after selecting a model of
    /// this family.
    pub fn default_capabilities(&self) -> CapabilitySet {
        match self {
            ModelFamily::CodeLlama => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::CodeGeneration,
                Capability::CodeCompletion,
                Capability::TextAnalysis,
            ]),
            ModelFamily::Llama => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::Conversational,
                Capability::TextAnalysis,
            ]),
            ModelFamily::Mistral => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::TextGeneration,
                Capability::Summarization,
                Capability::Reasoning,
            ]),
            ModelFamily::Mixtral => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::TextGeneration,
                Capability::Reasoning,
                Capability::Translation,
            ]),
            ModelFamily::Phi => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::Reasoning,
                Capability::QuestionAnswering,
            ]),
            ModelFamily::Gemma => CapabilitySet::from([
                Capability::BasicCompletion,
                Capability::TextGeneration,
                Capability::Summarization,
            ]),
            ModelFamily::Other(_) => CapabilitySet::from([Capability::BasicCompletion]),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::CodeLlama => write!(f, "codellama"),
            ModelFamily::Llama => write!(f, "llama"),
            ModelFamily::Mistral => write!(f, "mistral"),
            ModelFamily::Mixtral => write!(f, "mixtral"),
            ModelFamily::Phi => write!(f, "phi"),
            ModelFamily::Gemma => write!(f, "gemma"),
            ModelFamily::Other(name) => write!(f, "other({name})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_tokens_win_over_general() {
        assert_eq!(
            ModelFamily::from_model_name("codellama:7b"),
            ModelFamily::CodeLlama
        );
        assert_eq!(
            ModelFamily::from_model_name("CodeLlama-34B-Instruct"),
            ModelFamily::CodeLlama
        );
        assert_eq!(ModelFamily::from_model_name("llama3:8b"), ModelFamily::Llama);
    }

    #[test]
    fn test_known_families() {
        assert_eq!(
            ModelFamily::from_model_name("mistral:latest"),
            ModelFamily::Mistral
        );
        assert_eq!(
            ModelFamily::from_model_name("mixtral:8x7b"),
            ModelFamily::Mixtral
        );
        assert_eq!(ModelFamily::from_model_name("phi3:mini"), ModelFamily::Phi);
        assert_eq!(ModelFamily::from_model_name("GEMMA2:9B"), ModelFamily::Gemma);
    }

    #[test]
    fn test_unknown_preserves_name() {
        assert_eq!(
            ModelFamily::from_model_name("qwen2:7b"),
            ModelFamily::Other("qwen2:7b".to_string())
        );
    }

    #[test]
    fn test_recommended_temperatures() {
        assert!((ModelFamily::CodeLlama.recommended_temperature() - 0.3).abs() < f32::EPSILON);
        assert!((ModelFamily::Llama.recommended_temperature() - 0.7).abs() < f32::EPSILON);
        assert!((ModelFamily::Gemma.recommended_temperature() - 0.8).abs() < f32::EPSILON);
        assert!(
            (ModelFamily::Other("x".into()).recommended_temperature() - 0.7).abs() < f32::EPSILON
        );
    }

    #[test]
    fn test_default_capability_tables() {
        let code = ModelFamily::CodeLlama.default_capabilities();
        assert!(code.contains(Capability::CodeGeneration));
        assert!(code.contains(Capability::CodeCompletion));
        assert!(!code.contains(Capability::Conversational));

        let chat = ModelFamily::Llama.default_capabilities();
        assert!(chat.contains(Capability::Conversational));
        assert!(!chat.contains(Capability::CodeGeneration));

        let fallback = ModelFamily::Other("qwen2".into()).default_capabilities();
        assert_eq!(fallback.len(), 1);
        assert!(fallback.contains(Capability::BasicCompletion));
    }
}
