use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::contours::{binarize, dilate_2x2, find_components, Component};
use crate::engine::ProbabilityMap;
use crate::geometry::{min_area_quad, offset_polygon, unclip_distance, QuadBox};
use crate::types::{DetConfig, ScoreMode};

/// Shorter side a shrunk candidate box needs before it is scored.
const MIN_BOX_SIZE: f32 = 3.0;

/// A detected region and its detector score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub quad: QuadBox,
    pub score: f32,
}

/// Differentiable-binarization post-processing: probability map to ordered boxes.
#[derive(Debug, Clone)]
pub struct DbPostProcess {
    pub thresh: f32,
    pub box_thresh: f32,
    pub max_candidates: usize,
    pub unclip_ratio: f32,
    pub use_dilation: bool,
    pub min_side_len: f32,
    pub min_component_pixels: usize,
    pub score_mode: ScoreMode,
}

impl DbPostProcess {
    pub fn new(cfg: &DetConfig) -> Self {
        Self {
            thresh: cfg.thresh,
            box_thresh: cfg.box_thresh,
            max_candidates: cfg.max_candidates,
            unclip_ratio: cfg.unclip_ratio,
            use_dilation: cfg.use_dilation,
            min_side_len: cfg.min_side_len,
            min_component_pixels: cfg.min_component_pixels,
            score_mode: cfg.score_mode,
        }
    }

    /// Boxes in the coordinates of a `dest_width x dest_height` image, ordered
    /// top-to-bottom then left-to-right. An empty result is not an error.
    #[instrument(level = "debug", skip(self, map), fields(map_w = map.width(), map_h = map.height()))]
    pub fn process(&self, map: &ProbabilityMap, dest_width: u32, dest_height: u32) -> Vec<TextBox> {
        if map.is_empty() || dest_width == 0 || dest_height == 0 {
            return Vec::new();
        }

        let mut mask = binarize(map, self.thresh);
        if self.use_dilation {
            mask = dilate_2x2(&mask);
        }

        let mut components: Vec<Component> = find_components(&mask)
            .into_iter()
            .filter(|c| c.len() >= self.min_component_pixels)
            .collect();
        // Stable: equal areas keep raster order.
        components.sort_by(|a, b| b.area().cmp(&a.area()));
        components.truncate(self.max_candidates);
        debug!(candidates = components.len(), "retained candidate components");

        let scale_x = dest_width as f32 / map.width() as f32;
        let scale_y = dest_height as f32 / map.height() as f32;

        let mut boxes: Vec<TextBox> = components
            .iter()
            .filter_map(|component| self.component_to_box(map, component, scale_x, scale_y, dest_width, dest_height))
            .collect();

        sort_boxes(&mut boxes);
        debug!(boxes = boxes.len(), "detection post-processing done");
        boxes
    }

    fn component_to_box(
        &self,
        map: &ProbabilityMap,
        component: &Component,
        scale_x: f32,
        scale_y: f32,
        dest_width: u32,
        dest_height: u32,
    ) -> Option<TextBox> {
        let quad = min_area_quad(&component.boundary)?;
        if quad.min_side() < MIN_BOX_SIZE {
            trace!(side = quad.min_side(), "candidate too small");
            return None;
        }

        let score = match self.score_mode {
            ScoreMode::Contour => component_score(map, component),
            ScoreMode::Box => box_score(map, &quad),
        };
        if score < self.box_thresh {
            trace!(score, "candidate below box threshold");
            return None;
        }

        let distance = unclip_distance(&quad.points, self.unclip_ratio);
        let expanded = offset_polygon(&quad.points, distance);
        if expanded.len() < 3 {
            trace!(distance, "unclip erased the candidate");
            return None;
        }
        let unclipped = min_area_quad(&expanded)?;
        if unclipped.min_side() < MIN_BOX_SIZE + 2.0 {
            trace!(side = unclipped.min_side(), "unclipped box too small");
            return None;
        }

        let quad = QuadBox::from_unordered(unclipped.scale(scale_x, scale_y).points)
            .clip(dest_width, dest_height);
        if quad.min_side() < self.min_side_len {
            trace!(side = quad.min_side(), "box below minimum side length");
            return None;
        }

        Some(TextBox { quad, score })
    }
}

/// Mean probability over the component's own pixels.
pub fn component_score(map: &ProbabilityMap, component: &Component) -> f32 {
    if component.is_empty() {
        return 0.0;
    }
    let sum: f64 = component
        .pixels
        .iter()
        .map(|&(x, y)| map.get(x as usize, y as usize) as f64)
        .sum();
    (sum / component.len() as f64) as f32
}

/// Mean probability over the pixels covered by `quad`.
pub fn box_score(map: &ProbabilityMap, quad: &QuadBox) -> f32 {
    let (w, h) = (map.width(), map.height());
    if w == 0 || h == 0 {
        return 0.0;
    }
    let (x0, y0, x1, y1) = quad.bounding_rect();
    let xmin = (x0.floor().max(0.0) as usize).min(w - 1);
    let xmax = (x1.ceil().max(0.0) as usize).min(w - 1);
    let ymin = (y0.floor().max(0.0) as usize).min(h - 1);
    let ymax = (y1.ceil().max(0.0) as usize).min(h - 1);

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in ymin..=ymax {
        for x in xmin..=xmax {
            if quad.contains(x as f32, y as f32) {
                sum += map.get(x, y) as f64;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Top-to-bottom by top edge, then left-to-right. Stable, so equal keys keep
/// candidate order.
pub fn sort_boxes(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        a.quad
            .top_y()
            .total_cmp(&b.quad.top_y())
            .then(a.quad.left_x().total_cmp(&b.quad.left_x()))
    });
}
