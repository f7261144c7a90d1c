// ============================================================================
// SELECTION OUTLINE: edge map of the selection for marching-ants display
// ============================================================================

use image::{GrayImage, Luma};

use crate::canvas::sync::{aborted, AbortFlag};
use crate::canvas::tile::{gray_row, gray_row_mut};

/// Edge map of a rendered selection: 0 where a selected pixel (high bit set)
/// has at least one neighbour without the high bit, 255 everywhere else.
///
/// The outermost ring is never an edge.  `abort` is polled once per scan
/// row; `None` means the pass was cut short.
pub fn selection_outline(selection: &GrayImage, abort: Option<&AbortFlag>) -> Option<GrayImage> {
    let (w, h) = selection.dimensions();
    let mut out = GrayImage::from_pixel(w, h, Luma([255]));
    if w < 3 || h < 3 {
        return Some(out);
    }

    for y in 1..h - 1 {
        if aborted(abort) {
            return None;
        }
        let above = gray_row(selection, y - 1);
        let row = gray_row(selection, y);
        let below = gray_row(selection, y + 1);
        let dst = gray_row_mut(&mut out, y);
        for x in 1..w as usize - 1 {
            let all = above[x - 1]
                & above[x]
                & above[x + 1]
                & row[x - 1]
                & row[x + 1]
                & below[x - 1]
                & below[x]
                & below[x + 1];
            if !all & row[x] & 0x80 != 0 {
                dst[x] = 0;
            }
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_selection_outlines_its_border() {
        let mut sel = GrayImage::new(8, 8);
        for y in 2..6 {
            for x in 2..6 {
                sel.put_pixel(x, y, Luma([255]));
            }
        }
        let out = selection_outline(&sel, None).unwrap();
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
        assert_eq!(out.get_pixel(5, 3).0[0], 0);
        assert_eq!(out.get_pixel(3, 3).0[0], 255);
        assert_eq!(out.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn full_selection_has_no_inner_edges() {
        let sel = GrayImage::from_pixel(5, 5, Luma([255]));
        let out = selection_outline(&sel, None).unwrap();
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn abort_stops_the_scan() {
        let flag = AbortFlag::new();
        flag.request();
        assert!(selection_outline(&GrayImage::new(16, 16), Some(&flag)).is_none());
    }
}
