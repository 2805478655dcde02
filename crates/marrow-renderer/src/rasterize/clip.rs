//! Clip-window management.
//!
//! Each window segment restricts rasterization to its screen-space
//! footprint with two clip planes, set in a frame temporarily
//! re-centered on the viewer. A boundary that coincides with the
//! frame-wide leftmost/rightmost clip has nothing beyond it to clip
//! against, so its plane stays disabled.

use marrow_common::world::LongVector2d;

use crate::matrix::{MatrixMode, MatrixStack, CLIP_PLANE_LEFT, CLIP_PLANE_RIGHT};

use super::{ClippingWindow, ViewData};

/// Margin rotations around the re-centering, keeping a hair of excess
/// so plane edges don't seam against wall edges.
const CLIP_LEFT_MARGIN_DEG: f32 = -0.1;
const CLIP_RIGHT_MARGIN_DEG: f32 = 0.2;

/// Frame-wide clip extremes, recorded once per rendered tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipState {
    leftmost_clip: LongVector2d,
    rightmost_clip: LongVector2d,
}

impl ClipState {
    /// Record the boundary vectors of the leftmost and rightmost window
    /// segments on screen.
    pub fn begin_frame<'a>(&mut self, windows: impl Iterator<Item = &'a ClippingWindow>) {
        let mut leftmost = i16::MAX;
        let mut rightmost = i16::MIN;
        for win in windows {
            if win.x0 < leftmost {
                leftmost = win.x0;
                self.leftmost_clip = win.left;
            }
            if win.x1 > rightmost {
                rightmost = win.x1;
                self.rightmost_clip = win.right;
            }
        }
    }

    pub fn leftmost_clip(&self) -> LongVector2d {
        self.leftmost_clip
    }

    pub fn rightmost_clip(&self) -> LongVector2d {
        self.rightmost_clip
    }

    /// Configure clip planes 0 and 1 for one window segment. The planes
    /// persist for the following draw call; the re-orientation used to
    /// set them does not.
    pub fn clip_to_window(&self, matrix: &mut MatrixStack, view: &ViewData, win: &ClippingWindow) {
        let leftmost = self.leftmost_clip;
        let rightmost = self.rightmost_clip;
        matrix.scoped(MatrixMode::ModelView, |ms| {
            // Recenter to the viewer's orientation temporarily.
            ms.translatef(view.origin.x as f32, view.origin.y as f32, 0.0);
            ms.rotatef_z(view.yaw_degrees() + 90.0);
            ms.rotatef_z(CLIP_LEFT_MARGIN_DEG);

            if win.left.i != leftmost.i || win.left.j != leftmost.j {
                ms.clip_plane(
                    CLIP_PLANE_LEFT,
                    [win.left.i as f32, win.left.j as f32, 0.0, 0.0],
                );
                ms.enable_plane(CLIP_PLANE_LEFT);
            } else {
                ms.disable_plane(CLIP_PLANE_LEFT);
            }

            ms.rotatef_z(CLIP_RIGHT_MARGIN_DEG);

            if win.right.i != rightmost.i || win.right.j != rightmost.j {
                ms.clip_plane(
                    CLIP_PLANE_RIGHT,
                    [win.right.i as f32, win.right.j as f32, 0.0, 0.0],
                );
                ms.enable_plane(CLIP_PLANE_RIGHT);
            } else {
                ms.disable_plane(CLIP_PLANE_RIGHT);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(x0: i16, x1: i16, left: (i32, i32), right: (i32, i32)) -> ClippingWindow {
        ClippingWindow {
            x0,
            x1,
            left: LongVector2d {
                i: left.0,
                j: left.1,
            },
            right: LongVector2d {
                i: right.0,
                j: right.1,
            },
        }
    }

    #[test]
    fn test_begin_frame_finds_extremes() {
        let windows = [
            window(100, 200, (1, 2), (3, 4)),
            window(0, 320, (5, 6), (7, 8)),
            window(250, 300, (9, 10), (11, 12)),
        ];
        let mut clip = ClipState::default();
        clip.begin_frame(windows.iter());
        assert_eq!(clip.leftmost_clip(), LongVector2d { i: 5, j: 6 });
        assert_eq!(clip.rightmost_clip(), LongVector2d { i: 11, j: 12 });
    }

    #[test]
    fn test_extremal_boundaries_leave_planes_disabled() {
        let windows = [window(0, 320, (5, 6), (7, 8))];
        let mut clip = ClipState::default();
        clip.begin_frame(windows.iter());

        let mut matrix = MatrixStack::new();
        let view = ViewData::default();
        clip.clip_to_window(&mut matrix, &view, &windows[0]);

        assert!(!matrix.plane(CLIP_PLANE_LEFT).enabled);
        assert!(!matrix.plane(CLIP_PLANE_RIGHT).enabled);
    }

    #[test]
    fn test_interior_boundaries_enable_planes() {
        let windows = [
            window(0, 320, (5, 6), (7, 8)),
            window(40, 200, (1, 2), (3, 4)),
        ];
        let mut clip = ClipState::default();
        clip.begin_frame(windows.iter());

        let mut matrix = MatrixStack::new();
        let view = ViewData::default();
        clip.clip_to_window(&mut matrix, &view, &windows[1]);
        assert!(matrix.plane(CLIP_PLANE_LEFT).enabled);
        assert!(matrix.plane(CLIP_PLANE_RIGHT).enabled);

        // The extremal window again: both disabled.
        clip.clip_to_window(&mut matrix, &view, &windows[0]);
        assert!(!matrix.plane(CLIP_PLANE_LEFT).enabled);
        assert!(!matrix.plane(CLIP_PLANE_RIGHT).enabled);
    }

    #[test]
    fn test_mixed_boundary_enables_only_differing_side() {
        let windows = [
            window(0, 320, (5, 6), (7, 8)),
            // Shares the leftmost boundary vector, differs on the right.
            window(0, 200, (5, 6), (3, 4)),
        ];
        let mut clip = ClipState::default();
        clip.begin_frame(windows.iter());

        let mut matrix = MatrixStack::new();
        let view = ViewData::default();
        clip.clip_to_window(&mut matrix, &view, &windows[1]);
        assert!(!matrix.plane(CLIP_PLANE_LEFT).enabled);
        assert!(matrix.plane(CLIP_PLANE_RIGHT).enabled);
    }

    #[test]
    fn test_reorientation_is_scoped() {
        let windows = [window(0, 320, (5, 6), (7, 8))];
        let mut clip = ClipState::default();
        clip.begin_frame(windows.iter());

        let mut matrix = MatrixStack::new();
        let before = matrix.modelview();
        let depth = matrix.depth(MatrixMode::ModelView);
        let view = ViewData {
            yaw: 77,
            ..ViewData::default()
        };
        clip.clip_to_window(&mut matrix, &view, &windows[0]);
        assert_eq!(matrix.depth(MatrixMode::ModelView), depth);
        assert_eq!(matrix.modelview(), before);
    }
}
