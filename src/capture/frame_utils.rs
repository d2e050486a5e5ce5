//! Frame transformation utilities.

use crate::platform::Frame;

/// Mirror a frame horizontally (flip left-right) for selfie mode.
pub fn mirror_horizontal(frame: &mut Frame) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let bpp = frame.bytes_per_pixel();

    for y in 0..height {
        let row_start = y * width * bpp;
        let row = &mut frame.data[row_start..row_start + width * bpp];

        // Swap pixels from left and right
        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FrameFormat;
    use std::time::Instant;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_mirror_horizontal_2x1() {
        let mut f = frame(vec![1, 2, 3, 4, 5, 6], 2, 1);
        mirror_horizontal(&mut f);
        assert_eq!(f.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_mirror_horizontal_3x2() {
        // Row 0: [A, B, C]
        // Row 1: [D, E, F]
        let mut f = frame(
            vec![
                1, 1, 1, 2, 2, 2, 3, 3, 3, //
                4, 4, 4, 5, 5, 5, 6, 6, 6,
            ],
            3,
            2,
        );
        mirror_horizontal(&mut f);
        assert_eq!(
            f.data,
            vec![
                3, 3, 3, 2, 2, 2, 1, 1, 1, //
                6, 6, 6, 5, 5, 5, 4, 4, 4,
            ]
        );
    }

    #[test]
    fn test_mirror_horizontal_single_pixel() {
        let mut f = frame(vec![1, 2, 3], 1, 1);
        mirror_horizontal(&mut f);
        assert_eq!(f.data, vec![1, 2, 3]);
    }
}
