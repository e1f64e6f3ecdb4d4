//! Language model adapters

pub mod ollama;
pub mod stub;

pub use ollama::OllamaGenerator;
pub use stub::StubGenerator;

use serde::{Deserialize, Serialize};

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_output_tokens: 200,
            timeout_secs: 120,
        }
    }
}

/// Standing instruction sent as the system prompt
pub const SYSTEM_INSTRUCTION: &str = "You are a creative social media post generator. \
You write a single short post in the voice of an existing account. \
Reply with the post text only: no quotation marks, no preamble, no commentary.";

/// Build the generation prompt from cleaned sample posts
pub fn build_generation_prompt(samples: &[String], char_limit: usize) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "Based on the following posts from a Bluesky account, generate a single new post \
         that matches the style, tone, and topics of the original content.\n\n",
    );

    prompt.push_str("## Example posts from the account\n");
    for sample in samples {
        prompt.push_str(&format!("- {}\n", sample));
    }
    prompt.push('\n');

    prompt.push_str(&format!(
        "## Guidelines
- Match the writing style, tone, and personality of the original posts
- Keep it concise and engaging
- Do not exceed {char_limit} characters
- Do not include hashtags unless they were common in the examples
- Make it feel natural and authentic to the account's voice
- Focus on similar topics or themes
- Do not use quotation marks or indicate this is a generated post

Generate only the post text, nothing else:"
    ));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_samples_and_limit() {
        let samples = vec!["Rainy day, good book.".to_string(), "Coffee first.".to_string()];
        let prompt = build_generation_prompt(&samples, 280);

        assert!(prompt.contains("- Rainy day, good book.\n- Coffee first.\n"));
        assert!(prompt.contains("Do not exceed 280 characters"));
        assert!(prompt.ends_with("Generate only the post text, nothing else:"));
    }
}
