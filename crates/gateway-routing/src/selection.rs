//! Provider selection heuristics.
//!
//! Two signals shape the candidate order: the resolved model name, which
//! points at the provider family that serves it, and for hybrid agents a
//! complexity score that picks between the local and cloud pools.

use gateway_core::{CompletionRequest, MessageRole};

const REASONING_MARKERS: &[&str] = &[
    "analyze",
    "synthesize",
    "evaluate",
    "compare",
    "reasoning",
    "step by step",
];

const CODE_MARKERS: &[&str] = &["code", "implement", "function", "algorithm"];

const LOCAL_MODEL_PREFIXES: &[&str] = &[
    "llama",
    "gemma",
    "mistral",
    "codellama",
    "phi",
    "qwen",
    "deepseek",
    "starcoder",
    "ollama/",
    "local/",
];

/// Provider ids that serve a model, most specific first.
///
/// Returns an empty slice when the model name says nothing about where it
/// runs.
#[must_use]
pub fn model_affinity(model: &str) -> &'static [&'static str] {
    fn starts_with_any(model: &str, prefixes: &[&str]) -> bool {
        prefixes.iter().any(|p| model.starts_with(p))
    }

    let model = model.to_ascii_lowercase();
    if starts_with_any(&model, &["anthropic/", "claude"]) {
        &["anthropic", "openrouter"]
    } else if starts_with_any(&model, &["openai/", "gpt", "o1", "o3"]) {
        &["openai", "openrouter"]
    } else if starts_with_any(&model, LOCAL_MODEL_PREFIXES) {
        &["ollama"]
    } else if model.contains('/') {
        &["openrouter"]
    } else {
        &[]
    }
}

/// Rough task complexity in `0.0..=1.0`.
///
/// Scores input size, conversation length, what the first system prompt asks
/// for, and the requested output length.
#[must_use]
pub fn assess_complexity(request: &CompletionRequest) -> f64 {
    let mut score = 0.0;

    let chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
    score += match chars {
        c if c > 8000 => 0.3,
        c if c > 4000 => 0.2,
        c if c > 2000 => 0.1,
        _ => 0.0,
    };

    score += match request.messages.len() {
        n if n > 10 => 0.2,
        n if n > 5 => 0.1,
        _ => 0.0,
    };

    if let Some(system) = request
        .messages
        .iter()
        .find(|m| m.role == MessageRole::System)
    {
        let prompt = system.content.to_lowercase();
        if REASONING_MARKERS.iter().any(|w| prompt.contains(w)) {
            score += 0.2;
        }
        if CODE_MARKERS.iter().any(|w| prompt.contains(w)) {
            score += 0.15;
        }
    }

    score += match request.max_tokens.unwrap_or(0) {
        t if t > 4000 => 0.15,
        t if t > 2000 => 0.1,
        _ => 0.0,
    };

    f64::min(score, 1.0)
}
