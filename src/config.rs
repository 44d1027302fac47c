use crate::error::{ChromaError, ChromaResult};

/// The background color a job keys out.
///
/// `Hue` matches on angular hue distance and is the right choice for real
/// green/blue screens. `Rgb` is the "custom color" mode: channel-wise distance
/// to an exact color, for synthetic content with a known flat background.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum KeyTarget {
    Hue { degrees: f32 },
    Rgb([u8; 3]),
}

/// Per-job chroma-key settings. Immutable while a job runs.
///
/// Thresholds are normalized to `[0, 1]`. `softness` widens the transition
/// band on both sides of `threshold`; zero softness degenerates to a hard
/// cutoff at `threshold` exactly.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChromaKeyConfig {
    pub target: KeyTarget,
    /// Normalized color distance at which a pixel flips from keyed to kept.
    pub threshold: f32,
    /// Pixels with HSV saturation below this are never keyed, so gray, white
    /// and black content survives any hue match.
    pub saturation_min: f32,
    /// Half-width of the partial-alpha band around `threshold`.
    pub softness: f32,
    /// Spill suppression strength for edge pixels, 0 = off, 1 = full
    /// desaturation of the residual tint.
    pub spill: f32,
    /// Preferred substitution color for binary-transparency formats. `None`
    /// lets the palette adapter pick from its candidate list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentinel: Option<[u8; 3]>,
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        // Pure green screen with a modest soft edge.
        Self {
            target: KeyTarget::Hue { degrees: 120.0 },
            threshold: 0.15,
            saturation_min: 0.2,
            softness: 0.05,
            spill: 0.5,
            sentinel: None,
        }
    }
}

impl ChromaKeyConfig {
    #[must_use]
    pub fn with_target(mut self, target: KeyTarget) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_saturation_min(mut self, saturation_min: f32) -> Self {
        self.saturation_min = saturation_min;
        self
    }

    #[must_use]
    pub fn with_softness(mut self, softness: f32) -> Self {
        self.softness = softness;
        self
    }

    #[must_use]
    pub fn with_spill(mut self, spill: f32) -> Self {
        self.spill = spill;
        self
    }

    #[must_use]
    pub fn with_sentinel(mut self, sentinel: [u8; 3]) -> Self {
        self.sentinel = Some(sentinel);
        self
    }

    pub fn validate(&self) -> ChromaResult<()> {
        if let KeyTarget::Hue { degrees } = self.target
            && !(0.0..360.0).contains(&degrees)
        {
            return Err(ChromaError::validation(
                "target hue must be in [0, 360) degrees",
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ChromaError::validation("threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.saturation_min) {
            return Err(ChromaError::validation("saturation_min must be in [0, 1]"));
        }
        if !self.softness.is_finite() || self.softness < 0.0 {
            return Err(ChromaError::validation("softness must be finite and >= 0"));
        }
        if !(0.0..=1.0).contains(&self.spill) {
            return Err(ChromaError::validation("spill must be in [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ChromaKeyConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let bad = ChromaKeyConfig::default().with_threshold(1.5);
        assert!(bad.validate().is_err());

        let bad = ChromaKeyConfig::default().with_saturation_min(-0.1);
        assert!(bad.validate().is_err());

        let bad = ChromaKeyConfig::default().with_softness(f32::NAN);
        assert!(bad.validate().is_err());

        let bad = ChromaKeyConfig::default().with_spill(2.0);
        assert!(bad.validate().is_err());

        let bad = ChromaKeyConfig::default().with_target(KeyTarget::Hue { degrees: 360.0 });
        assert!(bad.validate().is_err());
    }

    #[test]
    fn zero_softness_is_valid() {
        assert!(
            ChromaKeyConfig::default()
                .with_softness(0.0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn json_roundtrip() {
        let cfg = ChromaKeyConfig::default()
            .with_target(KeyTarget::Rgb([0, 255, 0]))
            .with_sentinel([255, 0, 255]);
        let s = serde_json::to_string_pretty(&cfg).unwrap();
        let de: ChromaKeyConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(de, cfg);
    }
}
