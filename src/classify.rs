use rayon::prelude::*;

use crate::{
    config::{ChromaKeyConfig, KeyTarget},
    error::{ChromaError, ChromaResult},
};

// 255 * sqrt(3): the largest channel-wise RGB distance.
const MAX_RGB_DISTANCE: f32 = 441.672_96;

/// Convert one RGB8 pixel to HSV with `h` in degrees `[0, 360)` and `s`, `v`
/// in `[0, 1]`.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let rf = f32::from(r) / 255.0;
    let gf = f32::from(g) / 255.0;
    let bf = f32::from(b) / 255.0;

    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == rf {
        60.0 * (((gf - bf) / delta).rem_euclid(6.0))
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };

    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };

    (h.rem_euclid(360.0), s, max)
}

/// Normalized distance in `[0, 1]` between a pixel and the key target.
///
/// Hue mode uses the shorter angular difference over 180 degrees, so the
/// metric stays continuous across the 0/360 wrap. RGB mode is plain Euclidean
/// channel distance over the cube diagonal.
fn target_distance(r: u8, g: u8, b: u8, hue: f32, target: KeyTarget) -> f32 {
    match target {
        KeyTarget::Hue { degrees } => {
            let diff = (hue - degrees).abs();
            diff.min(360.0 - diff) / 180.0
        }
        KeyTarget::Rgb([tr, tg, tb]) => {
            let dr = f32::from(r) - f32::from(tr);
            let dg = f32::from(g) - f32::from(tg);
            let db = f32::from(b) - f32::from(tb);
            (dr * dr + dg * dg + db * db).sqrt() / MAX_RGB_DISTANCE
        }
    }
}

/// Classify one straight-alpha RGBA8 pixel against the key configuration.
///
/// This is the dominant cost center of a job: it must not allocate, and the
/// alpha mapping must be continuous at both band boundaries so soft edges do
/// not band.
#[inline]
pub fn classify_pixel(px: [u8; 4], cfg: &ChromaKeyConfig) -> [u8; 4] {
    let [r, g, b, _] = px;
    let (h, s, v) = rgb_to_hsv(r, g, b);

    // Desaturated pixels are never keyed; this also guards the s == 0 case
    // where hue is undefined.
    if s < cfg.saturation_min {
        return px;
    }

    let d = target_distance(r, g, b, h, cfg.target);
    let lo = cfg.threshold - cfg.softness;
    let hi = cfg.threshold + cfg.softness;

    if d <= lo {
        // Fully keyed. RGB is kept as-is for debugging fidelity.
        return [r, g, b, 0];
    }
    if d > hi {
        // Outside the band the pixel is definitively kept: alpha is forced
        // fully opaque, not passed through.
        return [r, g, b, 255];
    }

    // Inside the soft band: alpha is linear in distance, hitting 0 at `lo`
    // and 1 at `hi` exactly. `softness > 0` here, or one of the branches
    // above would have taken the pixel.
    let alpha = (d - lo) / (2.0 * cfg.softness);
    let a8 = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;

    // Spill suppression: pull the edge pixel toward neutral gray in
    // proportion to how close it is to full transparency, which is where the
    // residual target tint lives.
    let amount = cfg.spill * (1.0 - alpha);
    let gray = v * 255.0;
    let mix = |c: u8| -> u8 {
        let cf = f32::from(c);
        (cf + amount * (gray - cf)).round().clamp(0.0, 255.0) as u8
    };

    [mix(r), mix(g), mix(b), a8]
}

/// Classify every pixel of a frame buffer in place.
///
/// Pixels carry no cross-dependencies, so rows are classified in parallel;
/// ordering across frames is unaffected.
pub fn classify_frame(data: &mut [u8], width: u32, cfg: &ChromaKeyConfig) -> ChromaResult<()> {
    if width == 0 {
        return Err(ChromaError::validation("frame width must be > 0"));
    }
    let row_bytes = width as usize * 4;
    if data.is_empty() || !data.len().is_multiple_of(row_bytes) {
        return Err(ChromaError::validation(
            "frame buffer length must be a non-zero multiple of width * 4",
        ));
    }

    data.par_chunks_mut(row_bytes).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let out = classify_pixel([px[0], px[1], px[2], px[3]], cfg);
            px.copy_from_slice(&out);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChromaKeyConfig;

    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn hsv_matches_known_colors() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert!((h - 0.0).abs() < 1e-3 && (s - 1.0).abs() < 1e-6 && (v - 1.0).abs() < 1e-6);

        let (h, _, _) = rgb_to_hsv(0, 255, 0);
        assert!((h - 120.0).abs() < 1e-3);

        let (h, _, _) = rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-3);

        let (_, s, v) = rgb_to_hsv(128, 128, 128);
        assert!(s.abs() < 1e-6);
        assert!((v - 128.0 / 255.0).abs() < 1e-3);
    }

    #[test]
    fn pure_green_is_fully_keyed() {
        let out = classify_pixel(GREEN, &ChromaKeyConfig::default());
        assert_eq!(out[3], 0);
        // Original color preserved for debugging fidelity.
        assert_eq!(&out[..3], &GREEN[..3]);
    }

    #[test]
    fn pure_red_is_untouched() {
        let out = classify_pixel(RED, &ChromaKeyConfig::default());
        assert_eq!(out, RED);
    }

    #[test]
    fn kept_pixels_are_forced_opaque() {
        // A saturated pixel far from the target is kept at full alpha even
        // when the source alpha was partial.
        let out = classify_pixel([255, 0, 0, 128], &ChromaKeyConfig::default());
        assert_eq!(out, [255, 0, 0, 255]);
    }

    #[test]
    fn gray_is_never_keyed_even_on_hue_match() {
        // A barely-green gray: hue is exactly the target, saturation is tiny.
        let px = [120, 128, 120, 255];
        let (_, s, _) = rgb_to_hsv(px[0], px[1], px[2]);
        assert!(s < 0.2);
        let out = classify_pixel(px, &ChromaKeyConfig::default());
        assert_eq!(out, px);
    }

    #[test]
    fn black_and_white_survive() {
        let cfg = ChromaKeyConfig::default();
        assert_eq!(classify_pixel([0, 0, 0, 255], &cfg), [0, 0, 0, 255]);
        assert_eq!(
            classify_pixel([255, 255, 255, 255], &cfg),
            [255, 255, 255, 255]
        );
    }

    #[test]
    fn alpha_is_monotone_and_continuous_across_the_band() {
        let cfg = ChromaKeyConfig::default();
        let lo = cfg.threshold - cfg.softness;
        let hi = cfg.threshold + cfg.softness;

        // Sweep hue targets so the pixel's distance walks through the band.
        let alpha_at = |d: f32| {
            let degrees = (120.0 - d * 180.0).rem_euclid(360.0);
            let cfg = cfg.with_target(crate::config::KeyTarget::Hue { degrees });
            classify_pixel(GREEN, &cfg)[3]
        };

        let mut prev = 0u8;
        for step in 0..=200 {
            let d = lo - 0.02 + (hi - lo + 0.04) * (step as f32 / 200.0);
            let a = alpha_at(d);
            assert!(a >= prev, "alpha must be monotone in distance");
            assert!(a - prev <= 4, "alpha must not jump between sweep steps");
            prev = a;
        }
        assert_eq!(prev, 255);

        // Continuity at the band boundaries: alpha stays near the endpoint
        // values just inside each edge.
        assert!(alpha_at(lo + 0.001) <= 4);
        assert!(alpha_at(hi - 0.001) >= 251);
    }

    #[test]
    fn zero_softness_is_a_hard_cutoff() {
        let cfg = ChromaKeyConfig::default().with_softness(0.0);
        assert_eq!(classify_pixel(GREEN, &cfg)[3], 0);
        assert_eq!(classify_pixel(RED, &cfg)[3], 255);
    }

    #[test]
    fn spill_desaturates_band_pixels() {
        // Put a saturated green-ish pixel in the middle of the band and crank
        // spill all the way up.
        let cfg = ChromaKeyConfig::default()
            .with_threshold(0.3)
            .with_softness(0.2)
            .with_spill(1.0);
        let px = [180, 220, 60, 255];
        let (h, _, _) = rgb_to_hsv(px[0], px[1], px[2]);
        let d = (h - 120.0).abs().min(360.0 - (h - 120.0).abs()) / 180.0;
        assert!(d > 0.1 && d <= 0.5, "pixel must land in the band: {d}");

        let out = classify_pixel(px, &cfg);
        assert!(out[3] > 0 && out[3] < 255);
        // Green dominance must shrink after suppression.
        let before = i32::from(px[1]) - i32::from(px[0].max(px[2]));
        let after = i32::from(out[1]) - i32::from(out[0].max(out[2]));
        assert!(after < before);
    }

    #[test]
    fn rgb_target_mode_keys_exact_color() {
        let cfg = ChromaKeyConfig::default()
            .with_target(crate::config::KeyTarget::Rgb([0, 255, 0]))
            .with_threshold(0.1)
            .with_softness(0.0);
        assert_eq!(classify_pixel(GREEN, &cfg)[3], 0);
        assert_eq!(classify_pixel(RED, &cfg)[3], 255);
    }

    #[test]
    fn classify_frame_rejects_ragged_buffers() {
        let mut data = vec![0u8; 13];
        assert!(classify_frame(&mut data, 2, &ChromaKeyConfig::default()).is_err());
        assert!(classify_frame(&mut [], 2, &ChromaKeyConfig::default()).is_err());
    }

    #[test]
    fn classify_frame_matches_per_pixel_path() {
        let cfg = ChromaKeyConfig::default();
        let mut data = Vec::new();
        for x in 0..16u8 {
            data.extend_from_slice(&[x * 12, 255 - x, 40, 255]);
        }
        let mut framed = data.clone();
        classify_frame(&mut framed, 4, &cfg).unwrap();
        for (px, out) in data.chunks_exact(4).zip(framed.chunks_exact(4)) {
            let expect = classify_pixel([px[0], px[1], px[2], px[3]], &cfg);
            assert_eq!(out, expect);
        }
    }
}
