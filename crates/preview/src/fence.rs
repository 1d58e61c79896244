//! Markdown fence cleanup for streamed model output.

const HTML_FENCE: &str = "```html";
const FENCE: &str = "```";

/// Strips a leading ```` ```html ```` / ```` ``` ```` marker and a trailing
/// ```` ``` ```` marker from generated markup.
///
/// Meant to be re-run on every accumulated prefix of a stream: a prefix that
/// is still only part of an opening fence yields an empty document rather
/// than leaking backticks into the preview.
pub fn strip_code_fences(text: &str) -> &str {
    let leading = text.trim_start();
    if !leading.is_empty() && HTML_FENCE.starts_with(leading) {
        return "";
    }

    let mut body = text;
    if let Some(rest) = leading.strip_prefix(HTML_FENCE) {
        body = rest.trim_start();
    }
    if let Some(rest) = body.strip_prefix(FENCE) {
        body = rest.trim_start();
    }
    if let Some(rest) = body.trim_end().strip_suffix(FENCE) {
        body = rest;
    }
    body
}
