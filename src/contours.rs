// Binary-mask helpers for the detection post-processor.
//
// Components are 8-connected, matching the outer contours a border-following
// pass would report; holes inside a component are not reported separately.

use image::{GrayImage, Luma};

use crate::engine::ProbabilityMap;
use crate::geometry::Point2f;

const FOREGROUND: u8 = 255;

/// One connected region of the binary mask.
#[derive(Debug, Clone)]
pub struct Component {
    /// Every pixel of the region, in raster order.
    pub pixels: Vec<(u32, u32)>,
    /// Pixels with at least one 4-neighbour outside the region.
    pub boundary: Vec<Point2f>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Enclosed area in pixels.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// Pixel is text iff `probability >= thresh`.
pub fn binarize(map: &ProbabilityMap, thresh: f32) -> GrayImage {
    let data = map.as_array();
    GrayImage::from_fn(map.width() as u32, map.height() as u32, |x, y| {
        if data[[y as usize, x as usize]] >= thresh {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}

/// One dilation pass with a 2x2 kernel of ones, anchored at the kernel centre.
pub fn dilate_2x2(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut max_val = img.get_pixel(x, y)[0];
        if x > 0 {
            max_val = max_val.max(img.get_pixel(x - 1, y)[0]);
        }
        if y > 0 {
            max_val = max_val.max(img.get_pixel(x, y - 1)[0]);
        }
        if x > 0 && y > 0 {
            max_val = max_val.max(img.get_pixel(x - 1, y - 1)[0]);
        }
        Luma([max_val])
    })
}

/// Labels 8-connected foreground regions of a binary mask.
///
/// Components come out in raster order of their first pixel.
pub fn find_components(mask: &GrayImage) -> Vec<Component> {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut labels = vec![0u32; w * h];
    let mut components = Vec::new();
    let mut next_label = 1u32;

    for y in 0..height {
        for x in 0..width {
            let idx = y as usize * w + x as usize;
            if mask.get_pixel(x, y)[0] == 0 || labels[idx] != 0 {
                continue;
            }
            let pixels = flood_fill(mask, &mut labels, x, y, next_label);
            let boundary = extract_boundary(&labels, &pixels, next_label, w, h);
            components.push(Component { pixels, boundary });
            next_label += 1;
        }
    }

    components
}

fn flood_fill(mask: &GrayImage, labels: &mut [u32], start_x: u32, start_y: u32, label: u32) -> Vec<(u32, u32)> {
    let (width, height) = mask.dimensions();
    let w = width as usize;
    let mut pixels = Vec::new();
    let mut stack = vec![(start_x, start_y)];
    labels[start_y as usize * w + start_x as usize] = label;

    while let Some((x, y)) = stack.pop() {
        pixels.push((x, y));
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let idx = ny as usize * w + nx as usize;
                if labels[idx] == 0 && mask.get_pixel(nx, ny)[0] != 0 {
                    labels[idx] = label;
                    stack.push((nx, ny));
                }
            }
        }
    }

    pixels.sort_unstable_by_key(|&(x, y)| (y, x));
    pixels
}

fn extract_boundary(labels: &[u32], pixels: &[(u32, u32)], label: u32, w: usize, h: usize) -> Vec<Point2f> {
    pixels
        .iter()
        .filter(|&&(x, y)| {
            let (x, y) = (x as i64, y as i64);
            [(0, -1), (1, 0), (0, 1), (-1, 0)].iter().any(|(dx, dy)| {
                let nx = x + dx;
                let ny = y + dy;
                nx < 0
                    || ny < 0
                    || nx >= w as i64
                    || ny >= h as i64
                    || labels[ny as usize * w + nx as usize] != label
            })
        })
        .map(|&(x, y)| Point2f::new(x as f32, y as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([FOREGROUND])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_binarize_threshold_is_inclusive() {
        let map = ProbabilityMap::from_fn(3, 1, |x, _| [0.29, 0.3, 0.9][x]);
        let mask = binarize(&map, 0.3);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(2, 0)[0], FOREGROUND);
    }

    #[test]
    fn test_dilate_grows_right_and_down() {
        let mask = mask_with_rect(6, 6, 2, 2, 4, 4);
        let dilated = dilate_2x2(&mask);
        assert_eq!(dilated.get_pixel(4, 4)[0], FOREGROUND);
        assert_eq!(dilated.get_pixel(4, 2)[0], FOREGROUND);
        assert_eq!(dilated.get_pixel(1, 1)[0], 0);
        assert_eq!(dilated.get_pixel(5, 5)[0], 0);
    }

    #[test]
    fn test_dilate_bridges_single_pixel_gap() {
        let mut mask = mask_with_rect(10, 3, 0, 0, 4, 3);
        for y in 0..3 {
            for x in 5..10 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        assert_eq!(find_components(&mask).len(), 2);
        assert_eq!(find_components(&dilate_2x2(&mask)).len(), 1);
    }

    #[test]
    fn test_find_components_simple() {
        let mask = mask_with_rect(10, 10, 2, 2, 8, 8);
        let comps = find_components(&mask);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].area(), 36);
        // Perimeter ring of a 6x6 block.
        assert_eq!(comps[0].boundary.len(), 20);
    }

    #[test]
    fn test_diagonal_pixels_are_connected() {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(0, 0, Luma([FOREGROUND]));
        mask.put_pixel(1, 1, Luma([FOREGROUND]));
        mask.put_pixel(3, 3, Luma([FOREGROUND]));
        let comps = find_components(&mask);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].len(), 2);
        assert_eq!(comps[1].pixels, vec![(3, 3)]);
    }

    #[test]
    fn test_empty_mask() {
        assert!(find_components(&GrayImage::new(5, 5)).is_empty());
    }
}
