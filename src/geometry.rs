use std::cmp::Ordering;

use geo_clipper::{Clipper, EndType, JoinType};
use geo_types::{Coord, LineString, Polygon};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use nalgebra::{Matrix3, SMatrix, SVector};
use serde::{Deserialize, Serialize};

/// Scale factor used when handing float coordinates to the integer clipper.
const OFFSET_SCALE: f64 = 1.0;

/// Aspect ratio (height / width) above which a region is treated as vertical text.
const VERTICAL_TEXT_RATIO: f32 = 1.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f32,
    pub y: f32,
}

impl Point2f {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2f) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A quadrilateral text region.
///
/// Points run clockwise (in image coordinates) from the top-left corner, so
/// `0 -> 1` is the top edge and `0 -> 3` the left edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadBox {
    pub points: [Point2f; 4],
}

impl QuadBox {
    /// Wraps points that are already in clockwise-from-top-left order.
    pub fn new(points: [Point2f; 4]) -> Self {
        Self { points }
    }

    pub fn from_unordered(points: [Point2f; 4]) -> Self {
        Self {
            points: order_points_clockwise(points),
        }
    }

    /// Axis-aligned rectangle spanning `[x0, x1] x [y0, y1]`.
    pub fn from_rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new([
            Point2f::new(x0, y0),
            Point2f::new(x1, y0),
            Point2f::new(x1, y1),
            Point2f::new(x0, y1),
        ])
    }

    /// max(|p0p1|, |p3p2|)
    pub fn width(&self) -> f32 {
        let p = &self.points;
        p[0].distance(&p[1]).max(p[3].distance(&p[2]))
    }

    /// max(|p0p3|, |p1p2|)
    pub fn height(&self) -> f32 {
        let p = &self.points;
        p[0].distance(&p[3]).max(p[1].distance(&p[2]))
    }

    pub fn min_side(&self) -> f32 {
        let p = &self.points;
        let top = p[0].distance(&p[1]);
        let left = p[0].distance(&p[3]);
        top.min(left)
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.points)
    }

    pub fn perimeter(&self) -> f32 {
        polygon_perimeter(&self.points)
    }

    /// Zero-area boxes, including those whose corners are collinear.
    pub fn is_degenerate(&self) -> bool {
        self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) || self.area() < 1e-3
    }

    /// y-coordinate of the top edge.
    pub fn top_y(&self) -> f32 {
        self.points[0].y.min(self.points[1].y)
    }

    pub fn left_x(&self) -> f32 {
        self.points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min)
    }

    /// `(xmin, ymin, xmax, ymax)`
    pub fn bounding_rect(&self) -> (f32, f32, f32, f32) {
        self.points.iter().fold(
            (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        )
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.points.map(|p| Point2f::new(p.x * sx, p.y * sy)))
    }

    /// Clamps every corner into an image of the given size.
    pub fn clip(&self, img_width: u32, img_height: u32) -> Self {
        let max_x = img_width.saturating_sub(1) as f32;
        let max_y = img_height.saturating_sub(1) as f32;
        Self::new(
            self.points
                .map(|p| Point2f::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))),
        )
    }

    /// Inclusive point-in-quad test; assumes the quad is convex.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            let cross = (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x);
            if cross.abs() <= 1e-6 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }
}

/// Shoelace area of a simple polygon.
pub fn polygon_area(points: &[Point2f]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let p1 = points[i];
            let p2 = points[(i + 1) % n];
            p1.x as f64 * p2.y as f64 - p2.x as f64 * p1.y as f64
        })
        .sum();
    (twice * 0.5).abs() as f32
}

pub fn polygon_perimeter(points: &[Point2f]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len();
    (0..n)
        .map(|i| points[i].distance(&points[(i + 1) % n]) as f64)
        .sum::<f64>() as f32
}

/// Convex hull (Andrew's monotone chain), collinear points dropped.
pub fn convex_hull(points: &[Point2f]) -> Vec<Point2f> {
    let mut pts: Vec<(f64, f64)> = points
        .iter()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(|p| (p.x as f64, p.y as f64))
        .collect();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();

    if pts.len() < 3 {
        return pts
            .into_iter()
            .map(|(x, y)| Point2f::new(x as f32, y as f32))
            .collect();
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
        .into_iter()
        .map(|(x, y)| Point2f::new(x as f32, y as f32))
        .collect()
}

struct QuadCandidate {
    area: f64,
    perimeter: f64,
    points: [Point2f; 4],
}

fn candidate_cmp(a: &QuadCandidate, b: &QuadCandidate) -> Ordering {
    let area_eps = 1e-6 * a.area.abs().max(b.area.abs()).max(1.0);
    if (a.area - b.area).abs() > area_eps {
        return a.area.total_cmp(&b.area);
    }
    let perimeter_eps = 1e-6 * a.perimeter.abs().max(b.perimeter.abs()).max(1.0);
    if (a.perimeter - b.perimeter).abs() > perimeter_eps {
        return a.perimeter.total_cmp(&b.perimeter);
    }
    a.points
        .iter()
        .zip(b.points.iter())
        .map(|(p, q)| p.x.total_cmp(&q.x).then(p.y.total_cmp(&q.y)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Minimum-area enclosing rectangle of a point set (rotating calipers over the hull).
///
/// Ties are broken by smaller perimeter, then by the lexicographic order of the
/// ordered corners. Returns `None` for an empty input.
pub fn min_area_quad(points: &[Point2f]) -> Option<QuadBox> {
    let hull = convex_hull(points);
    match hull.len() {
        0 => return None,
        1 => return Some(QuadBox::new([hull[0]; 4])),
        _ => {}
    }

    let mut best: Option<QuadCandidate> = None;
    let n = hull.len();
    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];
        let ex = (p2.x - p1.x) as f64;
        let ey = (p2.y - p1.y) as f64;
        let len = ex.hypot(ey);
        if len < 1e-9 {
            continue;
        }
        let (ux, uy) = (ex / len, ey / len);
        let (vx, vy) = (-uy, ux);

        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for p in &hull {
            let (px, py) = (p.x as f64, p.y as f64);
            let u = px * ux + py * uy;
            let v = px * vx + py * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let w = max_u - min_u;
        let h = max_v - min_v;
        let corner = |u: f64, v: f64| Point2f::new((u * ux + v * vx) as f32, (u * uy + v * vy) as f32);
        let candidate = QuadCandidate {
            area: w * h,
            perimeter: 2.0 * (w + h),
            points: order_points_clockwise([
                corner(min_u, min_v),
                corner(max_u, min_v),
                corner(max_u, max_v),
                corner(min_u, max_v),
            ]),
        };

        let better = match &best {
            None => true,
            Some(current) => candidate_cmp(&candidate, current) == Ordering::Less,
        };
        if better {
            best = Some(candidate);
        }
    }

    best.map(|c| QuadBox::new(c.points))
}

/// Orders four corners as top-left, top-right, bottom-right, bottom-left.
pub fn order_points_clockwise(pts: [Point2f; 4]) -> [Point2f; 4] {
    let mut pts_vec = pts.to_vec();
    pts_vec.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    let (mut tl, mut bl) = (pts_vec[0], pts_vec[1]);
    if tl.y > bl.y {
        std::mem::swap(&mut tl, &mut bl);
    }

    let (mut tr, mut br) = (pts_vec[2], pts_vec[3]);
    if tr.y > br.y {
        std::mem::swap(&mut tr, &mut br);
    }

    [tl, tr, br, bl]
}

/// Offset distance that undoes the detector's shrink: `area * (ratio - 1) / perimeter`.
pub fn unclip_distance(polygon: &[Point2f], unclip_ratio: f32) -> f64 {
    let perimeter = polygon_perimeter(polygon) as f64;
    if perimeter <= 0.0 {
        return 0.0;
    }
    polygon_area(polygon) as f64 * (unclip_ratio as f64 - 1.0) / perimeter
}

/// Grows (positive distance) or shrinks (negative) a closed polygon with round joins.
///
/// Returns the exterior ring of the largest resulting polygon, without the closing
/// duplicate, or an empty vector when the offset erases the polygon.
pub fn offset_polygon(polygon: &[Point2f], distance: f64) -> Vec<Point2f> {
    if polygon.len() < 3 {
        return Vec::new();
    }

    let mut ring: Vec<Coord<f64>> = polygon
        .iter()
        .map(|p| Coord {
            x: p.x as f64,
            y: p.y as f64,
        })
        .collect();
    ring.push(ring[0]);
    let poly = Polygon::new(LineString::from(ring), vec![]);

    let expanded = poly.offset(distance, JoinType::Round(1.0), EndType::ClosedPolygon, OFFSET_SCALE);

    let Some(largest) = expanded.0.iter().max_by(|a, b| {
        ring_area(a.exterior()).total_cmp(&ring_area(b.exterior()))
    }) else {
        return Vec::new();
    };

    let mut result: Vec<Point2f> = largest
        .exterior()
        .0
        .iter()
        .map(|c| Point2f::new(c.x as f32, c.y as f32))
        .collect();
    if result.len() > 1 {
        let first = result[0];
        let last = result[result.len() - 1];
        if (first.x - last.x).abs() < 1e-3 && (first.y - last.y).abs() < 1e-3 {
            result.pop();
        }
    }
    result
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    let pts = &ring.0;
    if pts.len() < 3 {
        return 0.0;
    }
    let twice: f64 = pts
        .windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum();
    (twice * 0.5).abs()
}

/// Homography mapping `src[i]` onto `dst[i]`.
pub fn get_perspective_transform(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let [x, y] = src[i];
        let [u, v] = dst[i];

        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -u * x;
        a[(i, 7)] = -u * y;
        b[i] = u;

        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -v * x;
        a[(i + 4, 7)] = -v * y;
        b[i + 4] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Bilinear sample with replicated borders.
fn sample_bilinear(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let max_x = img.width().saturating_sub(1) as f64;
    let max_y = img.height().saturating_sub(1) as f64;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let fx = x - x0;
    let fy = y - y0;

    let p00 = img.get_pixel(x0 as u32, y0 as u32);
    let p10 = img.get_pixel(x1 as u32, y0 as u32);
    let p01 = img.get_pixel(x0 as u32, y1 as u32);
    let p11 = img.get_pixel(x1 as u32, y1 as u32);

    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let v = (1.0 - fx) * (1.0 - fy) * p00[c] as f64
            + fx * (1.0 - fy) * p10[c] as f64
            + (1.0 - fx) * fy * p01[c] as f64
            + fx * fy * p11[c] as f64;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Renders a `width x height` image by pulling every output pixel through `dst_to_src`.
pub fn warp_perspective(src: &RgbImage, dst_to_src: &Matrix3<f64>, width: u32, height: u32) -> RgbImage {
    if src.width() == 0 || src.height() == 0 {
        return RgbImage::new(width, height);
    }
    let m = dst_to_src;
    RgbImage::from_fn(width, height, |x, y| {
        let (xf, yf) = (x as f64, y as f64);
        let w = m[(2, 0)] * xf + m[(2, 1)] * yf + m[(2, 2)];
        if w.abs() < f64::EPSILON {
            return Rgb([0, 0, 0]);
        }
        let sx = (m[(0, 0)] * xf + m[(0, 1)] * yf + m[(0, 2)]) / w;
        let sy = (m[(1, 0)] * xf + m[(1, 1)] * yf + m[(1, 2)]) / w;
        sample_bilinear(src, sx, sy)
    })
}

/// An upright text-line image at the recognizer's input height.
#[derive(Debug, Clone)]
pub struct RectifiedCrop {
    pub image: RgbImage,
    /// The region was taller than wide and was turned to horizontal.
    pub rotated: bool,
}

impl RectifiedCrop {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height().max(1) as f32
    }
}

/// Warps `quad` out of `image` into an axis-aligned crop of height `target_height`.
///
/// Regions taller than 1.5x their width are rotated a quarter turn counterclockwise
/// so the first line of vertical text reads left to right. Returns `None` when the
/// region is degenerate.
pub fn perspective_crop(image: &RgbImage, quad: &QuadBox, target_height: u32) -> Option<RectifiedCrop> {
    if image.width() == 0 || image.height() == 0 || target_height == 0 || quad.is_degenerate() {
        return None;
    }

    let crop_w = quad.width() as u32;
    let crop_h = quad.height() as u32;
    if crop_w == 0 || crop_h == 0 {
        return None;
    }

    let src = quad.points.map(|p| [p.x as f64, p.y as f64]);
    let dst = [
        [0.0, 0.0],
        [crop_w as f64, 0.0],
        [crop_w as f64, crop_h as f64],
        [0.0, crop_h as f64],
    ];
    let dst_to_src = get_perspective_transform(&dst, &src)?;
    let mut warped = warp_perspective(image, &dst_to_src, crop_w, crop_h);

    let rotated = crop_h as f32 > VERTICAL_TEXT_RATIO * crop_w as f32;
    if rotated {
        warped = imageops::rotate270(&warped);
    }

    let (w, h) = warped.dimensions();
    let resized_w = ((w as f32 * target_height as f32 / h as f32).round() as u32).max(1);
    let image = imageops::resize(&warped, resized_w, target_height, FilterType::Triangle);

    Some(RectifiedCrop { image, rotated })
}
