//! Generation Streaming Relay: prompt in, raw page markup out, fragment by
//! fragment.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::gemini_api::{GeminiApiClient, GeminiApiError};

pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;
pub type RelayStream = BoxStream<'static, Result<Bytes, GenerationError>>;

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("prompt is required")]
    EmptyPrompt,
    #[error(transparent)]
    Gemini(#[from] GeminiApiError),
    #[error("generation failed: {0}")]
    Upstream(String),
}

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Opens an incremental generation. The stream yields fragments in the
    /// order the backend produces them.
    async fn stream_text(&self, system: &str, prompt: &str) -> Result<TextStream, GenerationError>;

    /// One-shot completion.
    async fn complete_text(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, GenerationError>;
}

#[async_trait]
impl TextGenerator for GeminiApiClient {
    async fn stream_text(&self, system: &str, prompt: &str) -> Result<TextStream, GenerationError> {
        let stream = GeminiApiClient::stream_text(self, system, prompt).await?;
        Ok(stream.map(|item| item.map_err(GenerationError::from)).boxed())
    }

    async fn complete_text(
        &self,
        system: Option<&str>,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        Ok(self.complete(system, prompt).await?)
    }
}

pub const SYSTEM_PROMPT: &str = r#"You are an expert Frontend Developer. You generate production-ready, responsive HTML code using Tailwind CSS CDN.

**CRITICAL RULES:**
1. **NO MARKDOWN**: Do NOT wrap the code in ```html or ```. Return ONLY the raw HTML string.
2. **NO PLACEHOLDERS**: Do NOT use "Lorem Ipsum". Write REAL, professional copy relevant to the user's request.
3. **IMAGES**: Use 'https://image.pollinations.ai/prompt/description?width=800&height=600&nologo=true' for images. Replace 'description' with a URL-encoded description.
4. **STYLING**: You MUST include the Tailwind CDN in the <head>: <script src="https://cdn.tailwindcss.com"></script>. This is non-negotiable.

**DESIGN SYSTEM:**

**1. Typography & Layout**
- Font: Use 'Inter' via Google Fonts: <link href="https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700&display=swap" rel="stylesheet">
- Body: `font-family: 'Inter', sans-serif;`
- Spacing: Use generous whitespace. Section padding: `py-20` or `py-24`. Gap: `gap-8` or `gap-12`.
- Container: Use `max-w-7xl mx-auto px-4 sm:px-6 lg:px-8`.

**2. Aesthetics (Glassmorphism & Clean)**
- **Cards**: `bg-white/80 backdrop-blur-md border border-white/20 shadow-xl shadow-black/5 rounded-2xl`.
- **Buttons**: `rounded-full px-8 py-3 font-medium transition-all duration-300 hover:scale-105 active:scale-95`.
- **Gradients**: Use subtle, mesh-like gradients for backgrounds (e.g., `bg-gradient-to-br from-indigo-50 via-white to-cyan-50`).
- **Shadows**: Use soft, diffused shadows: `shadow-[0_8px_30px_rgb(0,0,0,0.04)]`.

**3. Color Palette (Modern & Premium)**
- Primary: Indigo-600, Violet-600, or Emerald-600 (depending on vibe).
- Text: `text-zinc-900` (headings), `text-zinc-500` (body).
- Background: `bg-zinc-50` or subtle gradients. NEVER plain white #FFFFFF for the main background.

**4. Components**
- **Hero**: Large H1 (text-5xl/6xl), tracking-tight, balanced text. Two buttons (Primary & Ghost).
- **Features**: Grid (cols-1 md:cols-3). Cards with icons (use SVG paths or Lucide-like placeholders).
- **Navbar**: Sticky, glassmorphism, logo left, links center, CTA right.

**Technical Requirements:**
- Complete HTML document with <html>, <head> (Tailwind CDN + Fonts), and <body>.
- <script src="https://cdn.tailwindcss.com"></script>
- <script>tailwind.config = { theme: { extend: { fontFamily: { sans: ['Inter', 'sans-serif'] } } } }</script>
- Include a <title> tag with a CREATIVE name.
"#;

/// Forwards prompts to a [`TextGenerator`] and relays its output unchanged.
///
/// The relay neither buffers nor retries. The returned stream ends after
/// the backend finishes or after the first error, which is passed through
/// as the final item. Fence stripping is left to the consumer.
#[derive(Clone)]
pub struct GenerationRelay {
    generator: Arc<dyn TextGenerator>,
}

impl GenerationRelay {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn relay(&self, prompt: &str) -> Result<RelayStream, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let preview: String = prompt.chars().take(50).collect();
        info!(prompt = %preview, "starting generation stream");
        let mut upstream = self.generator.stream_text(SYSTEM_PROMPT, prompt).await?;

        let stream = async_stream::stream! {
            let mut fragments = 0usize;
            let mut bytes = 0usize;
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(text) => {
                        fragments += 1;
                        bytes += text.len();
                        yield Ok(Bytes::from(text));
                    }
                    Err(e) => {
                        warn!(error = %e, fragments, bytes, "generation stream failed");
                        yield Err(e);
                        break;
                    }
                }
            }
            debug!(fragments, bytes, "generation stream closed");
        };

        Ok(stream.boxed())
    }
}
