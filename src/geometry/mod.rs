//! Bounding-box geometry.
//!
//! Boxes arrive in two forms: normalized center-form (`cx, cy, w, h` in
//! `[0, 1]`, the annotation-tool convention) and absolute corner-form
//! (`x1, y1, x2, y2` in pixels, the detector convention). All geometry is
//! computed on corner-form; center-form boxes are converted first.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A bounding box, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum BoundingBox {
    /// Normalized center-form: center point plus width/height, all in [0, 1].
    Center {
        /// Center x coordinate.
        cx: f64,
        /// Center y coordinate.
        cy: f64,
        /// Box width.
        w: f64,
        /// Box height.
        h: f64,
    },
    /// Absolute corner-form: top-left and bottom-right corners.
    Corner {
        /// Left edge.
        x1: f64,
        /// Top edge.
        y1: f64,
        /// Right edge.
        x2: f64,
        /// Bottom edge.
        y2: f64,
    },
}

impl BoundingBox {
    /// Create a normalized center-form box.
    pub fn from_center(cx: f64, cy: f64, w: f64, h: f64) -> Result<Self> {
        for (name, value) in [("cx", cx), ("cy", cy), ("w", w), ("h", h)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidBoundingBox {
                    message: format!("center-form {name} must be in [0, 1], got {value}"),
                });
            }
        }
        Ok(Self::Center { cx, cy, w, h })
    }

    /// Create an absolute corner-form box.
    ///
    /// Corners may be given in any order; they are canonicalized so that
    /// `x1 <= x2` and `y1 <= y2`.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        for (name, value) in [("x1", x1), ("y1", y1), ("x2", x2), ("y2", y2)] {
            if !value.is_finite() {
                return Err(Error::InvalidBoundingBox {
                    message: format!("corner-form {name} must be finite, got {value}"),
                });
            }
        }
        Ok(Self::Corner {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        })
    }

    /// Convert to corner-form coordinates `(x1, y1, x2, y2)`.
    ///
    /// Center-form boxes are unprojected as `x1 = cx - w/2` and so on;
    /// coordinates stay in normalized units. IoU is scale-invariant, so
    /// mixing normalized and pixel boxes within one comparison is the
    /// caller's error, not this function's concern.
    pub fn corners(&self) -> (f64, f64, f64, f64) {
        match *self {
            Self::Center { cx, cy, w, h } => {
                (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
            }
            Self::Corner { x1, y1, x2, y2 } => (x1, y1, x2, y2),
        }
    }

    /// Area of the box in its own units.
    pub fn area(&self) -> f64 {
        let (x1, y1, x2, y2) = self.corners();
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }
}

/// Calculate the Intersection over Union (IoU) between two bounding boxes.
///
/// Returns a value in `[0, 1]`. Disjoint or degenerate (non-positive area)
/// boxes yield 0. Symmetric in its arguments.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let (ax1, ay1, ax2, ay2) = a.corners();
    let (bx1, by1, bx2, by2) = b.corners();

    let x_left = ax1.max(bx1);
    let y_top = ay1.max(by1);
    let x_right = ax2.min(bx2);
    let y_bottom = ay2.min(by2);

    if x_right <= x_left || y_bottom <= y_top {
        return 0.0;
    }

    let intersection = (x_right - x_left) * (y_bottom - y_top);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    (intersection / union).clamp(0.0, 1.0)
}
