//! Binary morphology with rectangular ("brick") structuring elements
//!
//! Masks are `GrayImage`s where any non-zero pixel is foreground; outputs use
//! 0/255. Each brick operation is separable: a horizontal pass followed by a
//! vertical pass, each computed from running counts so the cost does not
//! depend on the element size. Pixels outside the image never contribute to
//! dilation and never block erosion.

use image::{GrayImage, Luma};

#[derive(Clone, Copy)]
enum Op {
    Dilate,
    Erode,
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn pass(mask: &GrayImage, size: u32, op: Op, axis: Axis) -> GrayImage {
    let (w, h) = mask.dimensions();
    if size <= 1 || w == 0 || h == 0 {
        return binarized(mask);
    }
    let (len, lines) = match axis {
        Axis::Horizontal => (w as usize, h as usize),
        Axis::Vertical => (h as usize, w as usize),
    };
    // Dilation walks the reflected element.
    let origin = (size / 2) as usize;
    let (before, after) = match op {
        Op::Erode => (origin, (size - 1) as usize - origin),
        Op::Dilate => ((size - 1) as usize - origin, origin),
    };

    let mut out = GrayImage::new(w, h);
    let mut prefix = vec![0u32; len + 1];
    for line in 0..lines {
        let at = |i: usize| -> (u32, u32) {
            match axis {
                Axis::Horizontal => (i as u32, line as u32),
                Axis::Vertical => (line as u32, i as u32),
            }
        };
        for i in 0..len {
            let (x, y) = at(i);
            prefix[i + 1] = prefix[i] + u32::from(mask.get_pixel(x, y).0[0] > 0);
        }
        for i in 0..len {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(len - 1);
            let count = prefix[hi + 1] - prefix[lo];
            let on = match op {
                Op::Dilate => count > 0,
                Op::Erode => count as usize == hi - lo + 1,
            };
            let (x, y) = at(i);
            out.put_pixel(x, y, Luma([if on { 255 } else { 0 }]));
        }
    }
    out
}

fn binarized(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get_pixel(x, y).0[0] > 0 { 255 } else { 0 }])
    })
}

/// Dilate with a `width` x `height` brick
pub fn dilate_brick(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    let tmp = pass(mask, width, Op::Dilate, Axis::Horizontal);
    pass(&tmp, height, Op::Dilate, Axis::Vertical)
}

/// Erode with a `width` x `height` brick
pub fn erode_brick(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    let tmp = pass(mask, width, Op::Erode, Axis::Horizontal);
    pass(&tmp, height, Op::Erode, Axis::Vertical)
}

/// Closing = dilation followed by erosion.
pub fn close_brick(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    erode_brick(&dilate_brick(mask, width, height), width, height)
}

/// Opening = erosion followed by dilation.
pub fn open_brick(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    dilate_brick(&erode_brick(mask, width, height), width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_on(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] > 0).count()
    }

    #[test]
    fn test_dilate_grows_single_pixel() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, Luma([255]));
        let dilated = dilate_brick(&mask, 3, 3);
        assert_eq!(count_on(&dilated), 9);
        assert_eq!(dilated.get_pixel(3, 3).0[0], 255);
        assert_eq!(dilated.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn test_close_bridges_horizontal_gap() {
        let mut mask = GrayImage::new(20, 5);
        for x in 2..6 {
            mask.put_pixel(x, 2, Luma([255]));
        }
        for x in 9..13 {
            mask.put_pixel(x, 2, Luma([255]));
        }
        let closed = close_brick(&mask, 7, 1);
        for x in 2..13 {
            assert_eq!(closed.get_pixel(x, 2).0[0], 255, "gap at x={x}");
        }
        assert_eq!(closed.get_pixel(18, 2).0[0], 0);
    }

    #[test]
    fn test_open_removes_short_runs() {
        let mut mask = GrayImage::new(30, 3);
        for x in 0..25 {
            mask.put_pixel(x, 1, Luma([255]));
        }
        mask.put_pixel(28, 0, Luma([255]));
        let opened = open_brick(&mask, 10, 1);
        assert_eq!(count_on(&opened), 25);
        assert_eq!(opened.get_pixel(28, 0).0[0], 0);
    }

    #[test]
    fn test_erode_keeps_full_border_run() {
        let mask = GrayImage::from_pixel(6, 6, Luma([255]));
        let eroded = erode_brick(&mask, 5, 5);
        assert_eq!(count_on(&eroded), 36);
    }
}
