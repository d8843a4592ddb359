//! Embedding model contract.

use crate::error::VoiceprintError;

/// Extracts speaker embeddings from raw audio.
///
/// Input is PCM16 signed little-endian, 16 kHz, mono; roughly 400 ms is the
/// practical minimum for a meaningful embedding. Output is a dense `f32`
/// vector of [`dimension`](VoiceprintModel::dimension) values.
///
/// Implementations must be safe for concurrent `extract` calls.
pub trait VoiceprintModel: Send + Sync {
    /// Computes a speaker embedding from PCM16 audio bytes.
    fn extract(&self, audio: &[u8]) -> Result<Vec<f32>, VoiceprintError>;

    /// Embedding dimensionality (typically 512).
    fn dimension(&self) -> usize;
}
