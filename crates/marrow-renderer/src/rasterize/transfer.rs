//! Transfer-mode modulation math.
//!
//! Wobble/pulsate produce a triangular waveform from the tick counter's
//! low bits — triangular, not sinusoidal, to match the software
//! renderer the assets were tuned against. Slide and wander modes
//! produce a per-frame texture-space offset instead.

use marrow_common::shapes::TransferMode;
use marrow_common::world::{
    cosine, normalize_angle, sine, WorldDistance, FULL_CIRCLE, TRIG_SHIFT,
    WORLD_FRACTIONAL_BITS, WORLD_ONE,
};

/// Phase wraps at WORLD_ONE/16; the fold point and center offset below
/// turn the ramp into a wave centered on zero.
const WOBBLE_WRAP: i32 = WORLD_ONE / 16;
const WOBBLE_FOLD: i32 = WORLD_ONE / 32;
const WOBBLE_BIAS: i32 = WORLD_ONE / 64;
const WOBBLE_SCALE: f32 = 1.0 / 1024.0;

/// Fast wobble runs the phase 15x faster.
const FAST_WOBBLE_RATE: i32 = 15;

/// Triangle-wave modulation for the wobble family of transfer modes.
/// Zero for everything else.
pub fn calc_wobble(transfer_mode: TransferMode, transfer_phase: i32) -> f32 {
    let mut phase = transfer_phase;
    match transfer_mode {
        TransferMode::FastWobble => {
            phase *= FAST_WOBBLE_RATE;
        }
        TransferMode::Pulsate | TransferMode::Wobble => {}
        _ => return 0.0,
    }
    phase &= WOBBLE_WRAP - 1;
    phase = if phase >= WOBBLE_FOLD {
        WOBBLE_FOLD + WOBBLE_BIAS - phase
    } else {
        phase - WOBBLE_BIAS
    };
    phase as f32 * WOBBLE_SCALE
}

/// Texture-space panning for the slide and wander transfer modes.
/// Returns the (x, y) offset in world units for this tick.
pub fn transfer_offset(
    transfer_mode: TransferMode,
    transfer_phase: i32,
) -> (WorldDistance, WorldDistance) {
    let mut phase = transfer_phase;
    match transfer_mode {
        TransferMode::FastHorizontalSlide => {
            phase <<= 1;
            ((phase << 2) & (WORLD_ONE - 1), 0)
        }
        TransferMode::HorizontalSlide => ((phase << 2) & (WORLD_ONE - 1), 0),
        TransferMode::FastVerticalSlide => {
            phase <<= 1;
            (0, (phase << 2) & (WORLD_ONE - 1))
        }
        TransferMode::VerticalSlide => (0, (phase << 2) & (WORLD_ONE - 1)),
        TransferMode::Wander | TransferMode::FastWander => {
            if transfer_mode == TransferMode::FastWander {
                phase <<= 1;
            }
            // Two detuned phase tracks; three trig taps each give the
            // drift its non-repeating feel.
            let alternate_phase = phase % (10 * FULL_CIRCLE);
            let phase = phase % (6 * FULL_CIRCLE);
            let shift = WORLD_FRACTIONAL_BITS - TRIG_SHIFT + 2;
            let x = (cosine(normalize_angle(alternate_phase))
                + (cosine(normalize_angle(2 * alternate_phase)) >> 1)
                + (cosine(normalize_angle(5 * alternate_phase)) >> 1))
                >> shift;
            let y = (sine(normalize_angle(phase))
                + (sine(normalize_angle(2 * phase)) >> 1)
                + (sine(normalize_angle(3 * phase)) >> 1))
                >> shift;
            (x, y)
        }
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMPLITUDE: f32 = (WORLD_ONE / 64) as f32 / 1024.0;

    #[test]
    fn test_wobble_zero_for_inert_modes() {
        for mode in [
            TransferMode::Normal,
            TransferMode::Static,
            TransferMode::Landscape,
            TransferMode::HorizontalSlide,
        ] {
            for phase in 0..WOBBLE_WRAP * 2 {
                assert_eq!(calc_wobble(mode, phase), 0.0);
            }
        }
    }

    #[test]
    fn test_wobble_bounded_by_amplitude() {
        for phase in 0..WOBBLE_WRAP * 4 {
            let w = calc_wobble(TransferMode::Wobble, phase);
            assert!(w.abs() <= AMPLITUDE, "phase {} -> {}", phase, w);
        }
    }

    #[test]
    fn test_wobble_periodic_in_wrap() {
        for phase in 0..WOBBLE_WRAP {
            assert_eq!(
                calc_wobble(TransferMode::Wobble, phase),
                calc_wobble(TransferMode::Wobble, phase + WOBBLE_WRAP)
            );
            assert_eq!(
                calc_wobble(TransferMode::Wobble, phase),
                calc_wobble(TransferMode::Wobble, phase + 7 * WOBBLE_WRAP)
            );
        }
    }

    #[test]
    fn test_wobble_is_triangular() {
        // Piecewise linear with slope ±1/1024 between consecutive
        // phases, except at the two fold points.
        let slope = WOBBLE_SCALE;
        let mut sign_changes = 0;
        let mut last_delta = 0.0f32;
        for phase in 1..WOBBLE_WRAP {
            let delta = calc_wobble(TransferMode::Wobble, phase)
                - calc_wobble(TransferMode::Wobble, phase - 1);
            assert!(
                (delta.abs() - slope).abs() < 1e-6,
                "non-unit slope at {}",
                phase
            );
            if last_delta != 0.0 && delta.signum() != last_delta.signum() {
                sign_changes += 1;
            }
            last_delta = delta;
        }
        assert_eq!(sign_changes, 1);
    }

    #[test]
    fn test_pulsate_matches_wobble_waveform() {
        for phase in 0..WOBBLE_WRAP {
            assert_eq!(
                calc_wobble(TransferMode::Pulsate, phase),
                calc_wobble(TransferMode::Wobble, phase)
            );
        }
    }

    #[test]
    fn test_fast_wobble_runs_faster() {
        // Fast wobble at phase p equals plain wobble at 15p.
        for phase in 0..64 {
            assert_eq!(
                calc_wobble(TransferMode::FastWobble, phase),
                calc_wobble(TransferMode::Wobble, phase * FAST_WOBBLE_RATE)
            );
        }
    }

    #[test]
    fn test_slide_wraps_within_world_one() {
        for phase in 0..4096 {
            let (x, y) = transfer_offset(TransferMode::HorizontalSlide, phase);
            assert!(x >= 0 && x < WORLD_ONE);
            assert_eq!(y, 0);
            let (x, y) = transfer_offset(TransferMode::VerticalSlide, phase);
            assert_eq!(x, 0);
            assert!(y >= 0 && y < WORLD_ONE);
        }
    }

    #[test]
    fn test_fast_slide_advances_twice_as_fast() {
        for phase in 0..512 {
            let (fast, _) = transfer_offset(TransferMode::FastHorizontalSlide, phase);
            let (normal, _) = transfer_offset(TransferMode::HorizontalSlide, phase * 2);
            assert_eq!(fast, normal);
        }
    }

    #[test]
    fn test_wander_bounded_and_deterministic() {
        // Three taps of magnitude 1024 + 512 + 512 shifted by 2: |v| <= 512.
        for phase in 0..(10 * FULL_CIRCLE) {
            let (x1, y1) = transfer_offset(TransferMode::Wander, phase);
            let (x2, y2) = transfer_offset(TransferMode::Wander, phase);
            assert_eq!((x1, y1), (x2, y2));
            assert!(x1.abs() <= WORLD_ONE / 2);
            assert!(y1.abs() <= WORLD_ONE / 2);
        }
    }

    #[test]
    fn test_inert_modes_do_not_pan() {
        assert_eq!(transfer_offset(TransferMode::Normal, 123), (0, 0));
        assert_eq!(transfer_offset(TransferMode::Wobble, 123), (0, 0));
        assert_eq!(transfer_offset(TransferMode::Static, 123), (0, 0));
    }
}
