//! Stroke hit testing for erasing and lasso selection.

use crate::canvas::geometry::{segment_distance_sq, BoundingBox};
use crate::canvas::model::{DocumentPoint, Stroke, StrokeId};

fn segments(points: &[(f32, f32)]) -> impl Iterator<Item = ((f32, f32), (f32, f32))> + '_ {
    let single = (points.len() == 1).then(|| (points[0], points[0]));
    single
        .into_iter()
        .chain(points.windows(2).map(|pair| (pair[0], pair[1])))
}

/// True when any part of `stroke` passes within `radius` of `path`.
pub fn stroke_hit_by_path(stroke: &Stroke, path: &[(f32, f32)], path_bounds: &BoundingBox, radius: f32) -> bool {
    let reach = path_bounds.inflate(radius);
    if stroke.bounds.right < reach.left
        || stroke.bounds.left > reach.right
        || stroke.bounds.bottom < reach.top
        || stroke.bounds.top > reach.bottom
    {
        return false;
    }
    let stroke_points: Vec<(f32, f32)> = stroke.points.iter().map(DocumentPoint::xy).collect();
    let radius_sq = radius * radius;
    let hit = segments(&stroke_points).any(|(a0, a1)| {
        segments(path).any(|(b0, b1)| segment_distance_sq(a0, a1, b0, b1) <= radius_sq)
    });
    hit
}

/// Ids of the strokes an eraser of `radius` dragged along `path` removes.
pub fn strokes_hit_by_path(strokes: &[Stroke], path: &[(f32, f32)], radius: f32) -> Vec<StrokeId> {
    let Some(bounds) = BoundingBox::around(path.iter().copied(), 0.0) else {
        return Vec::new();
    };
    strokes
        .iter()
        .filter(|stroke| stroke_hit_by_path(stroke, path, &bounds, radius))
        .map(|stroke| stroke.id.clone())
        .collect()
}

/// Even-odd point-in-polygon test; `polygon` is closed implicitly.
pub fn polygon_contains(polygon: &[(f32, f32)], point: (f32, f32)) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > point.1) != (yj > point.1) && point.0 < (xj - xi) * (point.1 - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Strokes whose every point lies inside the lasso.
pub fn strokes_in_lasso(strokes: &[Stroke], lasso: &[(f32, f32)]) -> Vec<StrokeId> {
    let Some(bounds) = BoundingBox::around(lasso.iter().copied(), 0.0) else {
        return Vec::new();
    };
    strokes
        .iter()
        .filter(|stroke| {
            stroke
                .points
                .iter()
                .all(|p| bounds.contains(p.x, p.y) && polygon_contains(lasso, p.xy()))
        })
        .map(|stroke| stroke.id.clone())
        .collect()
}
