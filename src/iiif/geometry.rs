//! Percentage region resolution.
//!
//! Only the offsets of a [`Region::PercentBox`](super::Region::PercentBox)
//! need source dimensions: ImageMagick accepts percentage crop extents
//! directly, but offsets must be absolute pixels. All functions here are pure.

use crate::imaging::Dimensions;

/// A percentage crop whose offsets have been resolved to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentCrop {
    pub offset_x: i64,
    pub offset_y: i64,
    /// Still a percentage of the source width.
    pub width_pct: f64,
    /// Still a percentage of the source height.
    pub height_pct: f64,
}

/// Resolve percentage offsets against the source dimensions.
///
/// `offset = round(dimension * pct / 100)`, rounding half away from zero
/// (`2.5 → 3`, `-2.5 → -3`), which is what [`f64::round`] does.
///
/// # Examples
/// ```
/// # use iiif_server::iiif::resolve;
/// # use iiif_server::imaging::Dimensions;
/// let crop = resolve(10.0, 25.0, 50.0, 50.0, Dimensions { width: 200, height: 100 });
/// assert_eq!((crop.offset_x, crop.offset_y), (20, 25));
/// assert_eq!((crop.width_pct, crop.height_pct), (50.0, 50.0));
/// ```
pub fn resolve(x: f64, y: f64, w: f64, h: f64, dims: Dimensions) -> PercentCrop {
    PercentCrop {
        offset_x: percent_of(dims.width, x),
        offset_y: percent_of(dims.height, y),
        width_pct: w,
        height_pct: h,
    }
}

fn percent_of(dimension: u32, pct: f64) -> i64 {
    (dimension as f64 * pct / 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn zero_offsets_stay_zero() {
        let crop = resolve(0.0, 0.0, 100.0, 100.0, dims(640, 480));
        assert_eq!((crop.offset_x, crop.offset_y), (0, 0));
    }

    #[test]
    fn full_offsets_hit_the_far_edge() {
        let crop = resolve(100.0, 100.0, 0.0, 0.0, dims(640, 480));
        assert_eq!((crop.offset_x, crop.offset_y), (640, 480));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        // 5 * 50% = 2.5 → 3, not banker's 2
        let crop = resolve(50.0, 50.0, 10.0, 10.0, dims(5, 5));
        assert_eq!((crop.offset_x, crop.offset_y), (3, 3));

        // 5 * -50% = -2.5 → -3
        let crop = resolve(-50.0, -50.0, 10.0, 10.0, dims(5, 5));
        assert_eq!((crop.offset_x, crop.offset_y), (-3, -3));
    }

    #[test]
    fn extents_pass_through_unconverted() {
        let crop = resolve(50.0, 60.1, 70.2, 80.3, dims(1000, 1000));
        assert_eq!(crop.offset_x, 500);
        assert_eq!(crop.offset_y, 601);
        assert_eq!(crop.width_pct, 70.2);
        assert_eq!(crop.height_pct, 80.3);
    }

    #[test]
    fn offsets_within_bounds_for_in_range_percentages() {
        let sizes = [(1, 1), (3, 7), (640, 480), (4096, 17), (12345, 9876)];
        let pcts = [0.0, 0.1, 12.5, 33.333, 49.5, 50.0, 66.6, 99.9, 100.0];
        for (w, h) in sizes {
            for x in pcts {
                for y in pcts {
                    let crop = resolve(x, y, 10.0, 10.0, dims(w, h));
                    assert!(
                        (0..=w as i64).contains(&crop.offset_x),
                        "x={x} on width {w} gave {}",
                        crop.offset_x
                    );
                    assert!(
                        (0..=h as i64).contains(&crop.offset_y),
                        "y={y} on height {h} gave {}",
                        crop.offset_y
                    );
                }
            }
        }
    }
}
