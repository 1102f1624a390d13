use anyhow::bail;

/// Maximum text length for a synthesis request
const MAX_TEXT_LENGTH: usize = 5000;

/// Validate a synthesis request before any network I/O
pub fn validate_request(text: &str, voice: &str) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        bail!("Text cannot be empty");
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        bail!("Text too long (max {} characters)", MAX_TEXT_LENGTH);
    }
    // Voice ids are passed through to the backend, which knows its own voices and blends.
    if voice.trim().is_empty() {
        bail!("Voice id cannot be empty");
    }
    Ok(())
}
