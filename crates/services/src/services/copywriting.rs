//! Single-shot helpers for the editor panels: copy rewriting and image
//! prompts.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use super::generation::{GenerationError, TextGenerator};

pub const DEFAULT_TONE: &str = "professional, punchy, and engaging";
const IMAGE_BASE_URL: &str = "https://image.pollinations.ai/prompt/";
const IMAGE_WIDTH: u32 = 800;
const IMAGE_HEIGHT: u32 = 600;

const ENHANCE_SYSTEM_PROMPT: &str = "You are an expert AI Image Prompt Engineer. Your task is to take a simple user prompt and expand it into a detailed, high-quality prompt suitable for an AI image generator like Stable Diffusion or Midjourney. Focus on lighting, style, texture, and composition. Return ONLY the enhanced prompt text, nothing else.";

#[derive(Debug, Error)]
pub enum CopywritingError {
    #[error("Text is required")]
    EmptyText,
    #[error("Prompt is required")]
    EmptyPrompt,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub url: String,
    pub enhanced_prompt: String,
}

/// Pollinations image URL for `prompt`.
pub fn image_url(prompt: &str, seed: u32) -> String {
    format!(
        "{IMAGE_BASE_URL}{}?seed={seed}&width={IMAGE_WIDTH}&height={IMAGE_HEIGHT}&nologo=true",
        urlencoding::encode(prompt)
    )
}

fn rewrite_prompt(text: &str, tone: &str) -> String {
    format!(
        "You are a professional conversion copywriter.\n\
         Rewrite the following text to be {tone}.\n\
         Keep the meaning the same but improve the flow and impact.\n\
         Do NOT add quotes or explanations. Just return the rewritten text.\n\n\
         Original Text: \"{text}\""
    )
}

#[derive(Clone)]
pub struct Copywriter {
    generator: Arc<dyn TextGenerator>,
}

impl Copywriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn rewrite(&self, text: &str, tone: Option<&str>) -> Result<String, CopywritingError> {
        if text.trim().is_empty() {
            return Err(CopywritingError::EmptyText);
        }
        let tone = tone
            .map(str::trim)
            .filter(|tone| !tone.is_empty())
            .unwrap_or(DEFAULT_TONE);

        let rewritten = self
            .generator
            .complete_text(None, &rewrite_prompt(text, tone))
            .await?;
        Ok(rewritten.trim().to_string())
    }

    pub async fn enhance_prompt(&self, prompt: &str) -> Result<String, CopywritingError> {
        if prompt.trim().is_empty() {
            return Err(CopywritingError::EmptyPrompt);
        }
        let enhanced = self
            .generator
            .complete_text(Some(ENHANCE_SYSTEM_PROMPT), prompt)
            .await?;
        Ok(enhanced.trim().to_string())
    }

    /// Enhances `prompt` and turns it into an image URL with a random seed.
    /// An empty enhancement falls back to the original prompt.
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, CopywritingError> {
        let enhanced = self.enhance_prompt(prompt).await?;
        let final_prompt = if enhanced.is_empty() {
            prompt.trim()
        } else {
            enhanced.as_str()
        };
        let seed = rand::thread_rng().gen_range(0..1000);
        Ok(GeneratedImage {
            url: image_url(final_prompt, seed),
            enhanced_prompt: final_prompt.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::generation::tests::FakeGenerator;

    #[test]
    fn test_image_url_encoding() {
        assert_eq!(
            image_url("sunset over a café & bar", 42),
            "https://image.pollinations.ai/prompt/sunset%20over%20a%20caf%C3%A9%20%26%20bar?seed=42&width=800&height=600&nologo=true"
        );
    }

    #[tokio::test]
    async fn test_rewrite_uses_default_tone() {
        let generator = Arc::new(FakeGenerator::completing("  Bake better bread.\n"));
        let copywriter = Copywriter::new(generator.clone());

        let text = copywriter.rewrite("we bake bread", None).await.unwrap();
        assert_eq!(text, "Bake better bread.");

        let (system, prompt) = generator.seen_prompts().remove(0);
        assert!(system.is_none());
        assert!(prompt.contains(DEFAULT_TONE));
        assert!(prompt.ends_with("Original Text: \"we bake bread\""));
    }

    #[tokio::test]
    async fn test_rewrite_with_tone() {
        let generator = Arc::new(FakeGenerator::completing("Bread!"));
        let copywriter = Copywriter::new(generator.clone());
        copywriter.rewrite("we bake bread", Some("playful")).await.unwrap();
        assert!(generator.seen_prompts()[0].1.contains("to be playful."));
    }

    #[tokio::test]
    async fn test_rewrite_requires_text() {
        let generator = Arc::new(FakeGenerator::completing("unused"));
        let copywriter = Copywriter::new(generator.clone());
        assert!(matches!(
            copywriter.rewrite("  ", None).await,
            Err(CopywritingError::EmptyText)
        ));
        assert!(generator.seen_prompts().is_empty());
    }

    #[tokio::test]
    async fn test_generate_image() {
        let generator = Arc::new(FakeGenerator::completing("golden hour bakery, film grain"));
        let copywriter = Copywriter::new(generator.clone());

        let image = copywriter.generate_image("bakery").await.unwrap();
        assert_eq!(image.enhanced_prompt, "golden hour bakery, film grain");
        assert!(image.url.starts_with(
            "https://image.pollinations.ai/prompt/golden%20hour%20bakery%2C%20film%20grain?seed="
        ));
        assert!(image.url.ends_with("&width=800&height=600&nologo=true"));
        assert_eq!(
            generator.seen_prompts()[0].0.as_deref(),
            Some(ENHANCE_SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let generator = Arc::new(FakeGenerator {
            fail_to_open: true,
            ..Default::default()
        });
        let copywriter = Copywriter::new(generator);
        assert!(matches!(
            copywriter.enhance_prompt("bakery").await,
            Err(CopywritingError::Generation(_))
        ));
    }
}
