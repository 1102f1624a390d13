use crate::error::FrameError;
use crate::frame::Frame;

/// Canonical first four bytes of a WAV (RIFF) container.
pub const WAV_MAGIC: [u8; 4] = *b"RIFF";

/// Check that a frame carries a WAV container before it is handed to the decoder.
pub fn validate_frame(frame: &Frame) -> Result<(), FrameError> {
    validate_payload(&frame.payload)
}

pub fn validate_payload(payload: &[u8]) -> Result<(), FrameError> {
    if payload.len() < WAV_MAGIC.len() || payload[..WAV_MAGIC.len()] != WAV_MAGIC {
        return Err(FrameError::Validation);
    }
    Ok(())
}
