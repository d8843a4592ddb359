//! Sliding-window speaker state tracking.

use std::collections::HashMap;

use crate::speaker::{Detection, SpeakerStatus, voice_label};

/// Classifies the speaker state from a sliding window of voice hashes.
///
/// Each [`feed`](Detector::feed) pushes a hash into a fixed window and
/// counts hash frequencies over it:
///
/// - the top hash holding at least `min_ratio` of the window → `Single`
/// - the top two together holding at least `min_ratio` → `Overlap`
/// - otherwise → `Unknown`
pub struct Detector {
    window: Vec<String>,
    pos: usize,
    filled: usize,
    min_ratio: f32,
}

/// Detector tuning.
pub struct DetectorConfig {
    /// Window size in hashes (default 5).
    pub window_size: usize,
    /// Minimum dominance ratio (default 0.6).
    pub min_ratio: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            min_ratio: 0.6,
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    /// Detector with the default window of 5 and ratio 0.6.
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    /// Detector with explicit tuning; out-of-range values fall back to the
    /// defaults.
    pub fn with_config(cfg: DetectorConfig) -> Self {
        let window_size = if cfg.window_size > 0 { cfg.window_size } else { 5 };
        let min_ratio = if cfg.min_ratio > 0.0 && cfg.min_ratio <= 1.0 {
            cfg.min_ratio
        } else {
            0.6
        };
        Self {
            window: vec![String::new(); window_size],
            pos: 0,
            filled: 0,
            min_ratio,
        }
    }

    /// Pushes a hash and classifies the window. Returns `None` until at
    /// least two samples have accumulated.
    pub fn feed(&mut self, hash: &str) -> Option<Detection> {
        self.window[self.pos] = hash.to_string();
        self.pos = (self.pos + 1) % self.window.len();
        if self.filled < self.window.len() {
            self.filled += 1;
        }

        if self.filled < 2 {
            return None;
        }

        let mut counts: HashMap<&str, usize> = HashMap::with_capacity(4);
        for i in 0..self.filled {
            let idx = (self.pos + self.window.len() - self.filled + i) % self.window.len();
            *counts.entry(self.window[idx].as_str()).or_insert(0) += 1;
        }

        let mut top1 = ("", 0usize);
        let mut top2 = ("", 0usize);
        for (&h, &c) in &counts {
            if c > top1.1 {
                top2 = top1;
                top1 = (h, c);
            } else if c > top2.1 {
                top2 = (h, c);
            }
        }

        let total = self.filled as f32;
        let top1_ratio = top1.1 as f32 / total;

        if top1_ratio >= self.min_ratio {
            return Some(Detection {
                status: SpeakerStatus::Single,
                speaker: voice_label(top1.0),
                candidates: vec![voice_label(top1.0)],
                confidence: top1_ratio,
            });
        }

        if top2.1 > 0 {
            let combined = (top1.1 + top2.1) as f32 / total;
            if combined >= self.min_ratio {
                return Some(Detection {
                    status: SpeakerStatus::Overlap,
                    speaker: voice_label(top1.0),
                    candidates: vec![voice_label(top1.0), voice_label(top2.0)],
                    confidence: combined,
                });
            }
        }

        Some(Detection {
            status: SpeakerStatus::Unknown,
            speaker: String::new(),
            candidates: Vec::new(),
            confidence: top1_ratio,
        })
    }

    /// Clears the window; the next feed starts from scratch.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.filled = 0;
        for slot in &mut self.window {
            slot.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_two_samples() {
        let mut det = Detector::new();
        assert!(det.feed("A").is_none());
        assert!(det.feed("A").is_some());
    }

    #[test]
    fn single_speaker_full_confidence() {
        let mut det = Detector::new();
        let mut last = None;
        for _ in 0..5 {
            last = det.feed("A");
        }
        let d = last.unwrap();
        assert_eq!(d.status, SpeakerStatus::Single);
        assert_eq!(d.speaker, "voice:A");
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn alternating_pair_is_overlap() {
        let mut det = Detector::with_config(DetectorConfig {
            window_size: 4,
            min_ratio: 0.6,
        });
        det.feed("A");
        det.feed("B");
        det.feed("A");
        let d = det.feed("B").unwrap();

        // 2+2 of 4: neither dominates alone, together they own the window.
        assert_eq!(d.status, SpeakerStatus::Overlap);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.candidates.len(), 2);
        assert!(d.candidates.contains(&"voice:A".to_string()));
        assert!(d.candidates.contains(&"voice:B".to_string()));
    }

    #[test]
    fn all_distinct_is_unknown() {
        let mut det = Detector::new();
        det.feed("A");
        det.feed("B");
        det.feed("C");
        det.feed("D");
        let d = det.feed("E").unwrap();

        assert_eq!(d.status, SpeakerStatus::Unknown);
        assert!(d.speaker.is_empty());
        assert!(d.candidates.is_empty());
        assert!((d.confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn speaker_transition_converges() {
        let mut det = Detector::new();
        for _ in 0..5 {
            det.feed("A");
        }

        // Window AAAAB then AAABB: A still dominates.
        assert_eq!(det.feed("B").unwrap().speaker, "voice:A");
        assert_eq!(det.feed("B").unwrap().speaker, "voice:A");

        // AABBB: B takes over at exactly the 0.6 threshold.
        let d = det.feed("B").unwrap();
        assert_eq!(d.status, SpeakerStatus::Single);
        assert_eq!(d.speaker, "voice:B");
        assert!((d.confidence - 0.6).abs() < 1e-6);

        // Full confidence lands exactly on the fifth consecutive B.
        let d4 = det.feed("B").unwrap();
        assert!(d4.confidence < 1.0);
        let d5 = det.feed("B").unwrap();
        assert_eq!(d5.confidence, 1.0);
        assert_eq!(d5.speaker, "voice:B");
    }

    #[test]
    fn reset_clears_window() {
        let mut det = Detector::new();
        det.feed("A");
        det.feed("B");
        det.reset();
        assert!(det.feed("C").is_none());
    }

    #[test]
    fn partial_window_ratios() {
        // Only 3 of 5 slots filled; ratios use the filled count.
        let mut det = Detector::new();
        det.feed("A");
        det.feed("A");
        let d = det.feed("B").unwrap();
        assert_eq!(d.status, SpeakerStatus::Single);
        assert!((d.confidence - 2.0 / 3.0).abs() < 1e-6);
    }
}
