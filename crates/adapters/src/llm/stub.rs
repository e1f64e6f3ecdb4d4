//! Stub generator for offline runs

use async_trait::async_trait;
use echopost_domain::{GenerateError, GenerateInput, Generator};

/// Generator that echoes the newest sample back, cut to the character limit
#[derive(Debug, Default)]
pub struct StubGenerator;

impl StubGenerator {
    pub fn echo() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError> {
        input
            .samples
            .first()
            .map(|sample| sample.chars().take(input.char_limit).collect())
            .ok_or(GenerateError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(samples: &[&str]) -> GenerateInput {
        GenerateInput {
            samples: samples.iter().map(|s| s.to_string()).collect(),
            char_limit: 10,
            model: "stub".to_string(),
        }
    }

    #[tokio::test]
    async fn test_echo_truncates_newest_sample() {
        let generator = StubGenerator::echo();

        let result = generator.generate(input(&["first sample text", "second"])).await;
        assert_eq!(result.unwrap(), "first samp");
    }

    #[tokio::test]
    async fn test_echo_without_samples_is_empty() {
        let result = StubGenerator::echo().generate(input(&[])).await;

        assert!(matches!(result, Err(GenerateError::Empty)));
    }
}
