//! Default configuration for an LLM provider integration.

/// Static configuration for a [`crate::Provider`] integration.
///
/// Per-turn overrides come from `layer0::TurnConfig`; this struct holds the
/// defaults that apply when a turn doesn't override them.
pub struct LlmConfig {
    /// Base system prompt for this turn implementation.
    pub system_prompt: String,

    /// Default model identifier.
    pub default_model: String,

    /// Default maximum output tokens per provider call.
    pub default_max_tokens: u32,

    /// Default maximum ReAct loop iterations.
    pub default_max_turns: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".into(),
            default_model: String::new(),
            default_max_tokens: 4096,
            default_max_turns: 25,
        }
    }
}
