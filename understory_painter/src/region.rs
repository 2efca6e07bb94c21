// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Regions: areas described as sets of disjoint axis-aligned rectangles.

use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{Affine, BezPath, PathEl, Point, Rect, Shape, Vec2};
use peniko::Fill;
use smallvec::SmallVec;

use crate::transform::preserves_rects;

fn is_degenerate(r: Rect) -> bool {
    r.width() <= 0.0 || r.height() <= 0.0 || r.width().is_nan() || r.height().is_nan()
}

/// Pushes the parts of `a` not covered by `b`; at most four rectangles.
fn subtract_rect(a: Rect, b: Rect, out: &mut SmallVec<[Rect; 4]>) {
    let i = a.intersect(b);
    if is_degenerate(i) {
        out.push(a);
        return;
    }
    if a.y0 < i.y0 {
        out.push(Rect::new(a.x0, a.y0, a.x1, i.y0));
    }
    if i.y1 < a.y1 {
        out.push(Rect::new(a.x0, i.y1, a.x1, a.y1));
    }
    if a.x0 < i.x0 {
        out.push(Rect::new(a.x0, i.y0, i.x0, i.y1));
    }
    if i.x1 < a.x1 {
        out.push(Rect::new(i.x1, i.y0, a.x1, i.y1));
    }
}

/// Sorts `rects` into y-x bands: horizontal strips, each a run of disjoint
/// rectangles sharing the same top and bottom, ordered by x.
///
/// Touching spans within a band are merged, and vertically touching bands with
/// the same spans are joined. The result depends only on the covered area.
fn banded(rects: impl IntoIterator<Item = Rect>) -> SmallVec<[Rect; 4]> {
    let rects: Vec<Rect> = rects.into_iter().filter(|r| !is_degenerate(*r)).collect();
    let mut out: SmallVec<[Rect; 4]> = SmallVec::new();
    if rects.is_empty() {
        return out;
    }
    let mut edges: Vec<f64> = rects.iter().flat_map(|r| [r.y0, r.y1]).collect();
    edges.sort_by(f64::total_cmp);
    edges.dedup();

    let mut spans: SmallVec<[(f64, f64); 4]> = SmallVec::new();
    let mut band_start = 0;
    let mut band_spans: SmallVec<[(f64, f64); 4]> = SmallVec::new();
    let mut band_y1 = f64::NAN;
    for pair in edges.windows(2) {
        let (y0, y1) = (pair[0], pair[1]);
        spans.clear();
        spans.extend(
            rects
                .iter()
                .filter(|r| r.y0 <= y0 && r.y1 >= y1)
                .map(|r| (r.x0, r.x1)),
        );
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut merged: SmallVec<[(f64, f64); 4]> = SmallVec::new();
        for (x0, x1) in spans.drain(..) {
            match merged.last_mut() {
                Some(last) if x0 <= last.1 => last.1 = last.1.max(x1),
                _ => merged.push((x0, x1)),
            }
        }
        if merged.is_empty() {
            band_spans.clear();
            continue;
        }
        if band_y1 == y0 && merged == band_spans {
            for r in &mut out[band_start..] {
                r.y1 = y1;
            }
        } else {
            band_start = out.len();
            out.extend(merged.iter().map(|&(x0, x1)| Rect::new(x0, y0, x1, y1)));
            band_spans = merged;
        }
        band_y1 = y1;
    }
    out
}

/// A set of disjoint, non-empty, axis-aligned rectangles.
///
/// Rectangles are kept in y-x banded form, so two regions covering the same
/// area hold the same rectangles and compare equal. Boolean operations are
/// exact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    rects: SmallVec<[Rect; 4]>,
}

impl Region {
    /// The empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A region covering `rect`. Zero-area rectangles give the empty region.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        let mut rects = SmallVec::new();
        if !is_degenerate(rect) {
            rects.push(rect);
        }
        Self { rects }
    }

    /// The union of `rects`.
    #[must_use]
    pub fn from_rects(rects: impl IntoIterator<Item = Rect>) -> Self {
        Self {
            rects: banded(rects.into_iter().map(|r| r.abs())),
        }
    }

    /// Returns `true` if the region covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The rectangles making up the region, band by band.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// The smallest rectangle containing the region; [`Rect::ZERO`] when empty.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect {
        let mut iter = self.rects.iter();
        let Some(first) = iter.next() else {
            return Rect::ZERO;
        };
        iter.fold(*first, |acc, r| acc.union(*r))
    }

    /// The covered area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.rects.iter().map(|r| r.area()).sum()
    }

    /// Returns `true` if `point` lies inside the region.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        self.rects.iter().any(|r| r.contains(point))
    }

    /// The intersection of two regions.
    #[must_use]
    pub fn intersected(&self, other: &Self) -> Self {
        let pieces = self
            .rects
            .iter()
            .flat_map(|a| other.rects.iter().map(move |b| a.intersect(*b)));
        Self {
            rects: banded(pieces),
        }
    }

    /// The part of `self` not covered by `other`.
    #[must_use]
    pub fn subtracted(&self, other: &Self) -> Self {
        let mut rects = self.rects.clone();
        for b in &other.rects {
            if rects.is_empty() {
                break;
            }
            let mut next = SmallVec::new();
            for a in &rects {
                subtract_rect(*a, *b, &mut next);
            }
            rects = next;
        }
        Self {
            rects: banded(rects),
        }
    }

    /// The union of two regions.
    #[must_use]
    pub fn united(&self, other: &Self) -> Self {
        Self {
            rects: banded(self.rects.iter().chain(&other.rects).copied()),
        }
    }

    /// The region moved by `offset`.
    #[must_use]
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            rects: self.rects.iter().map(|r| *r + offset).collect(),
        }
    }

    /// Maps the region through `xf`.
    ///
    /// Returns `None` when `xf` does not keep rectangles axis-aligned; callers
    /// fall back to [`to_path`](Self::to_path) then.
    #[must_use]
    pub fn transformed(&self, xf: Affine) -> Option<Self> {
        if !preserves_rects(xf) {
            return None;
        }
        let rects = self.rects.iter().map(|r| xf.transform_rect_bbox(*r));
        Some(Self {
            rects: banded(rects),
        })
    }

    /// The outline of the region as closed rectangular subpaths.
    #[must_use]
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        for r in &self.rects {
            path.move_to((r.x0, r.y0));
            path.line_to((r.x1, r.y0));
            path.line_to((r.x1, r.y1));
            path.line_to((r.x0, r.y1));
            path.close_path();
        }
        path
    }

    /// Rasterizes `path` into a pixel-aligned region.
    ///
    /// A pixel belongs to the region when its center is inside the path under
    /// `fill_rule`. Only pixels within `bounds` are considered, which also
    /// bounds the work done for huge paths.
    #[must_use]
    pub fn from_path(path: &BezPath, fill_rule: Fill, tolerance: f64, bounds: Rect) -> Self {
        let area = path.bounding_box().intersect(bounds);
        if is_degenerate(area) {
            return Self::new();
        }

        let mut edges: Vec<(Point, Point)> = Vec::new();
        let mut start: Option<Point> = None;
        let mut last: Option<Point> = None;
        kurbo::flatten(path, tolerance, |el| match el {
            PathEl::MoveTo(p) => {
                if let (Some(s), Some(l)) = (start, last) {
                    edges.push((l, s));
                }
                start = Some(p);
                last = Some(p);
            }
            PathEl::LineTo(p) => {
                if let Some(l) = last {
                    edges.push((l, p));
                }
                last = Some(p);
            }
            PathEl::ClosePath => {
                if let (Some(s), Some(l)) = (start, last) {
                    edges.push((l, s));
                }
                last = start;
            }
            // `flatten` only emits lines.
            PathEl::QuadTo(..) | PathEl::CurveTo(..) => {}
        });
        // Fill semantics close open subpaths.
        if let (Some(s), Some(l)) = (start, last) {
            edges.push((l, s));
        }

        let x_min = area.x0.floor();
        let x_max = area.x1.ceil();
        let mut rects: SmallVec<[Rect; 4]> = SmallVec::new();
        let mut open: SmallVec<[Rect; 4]> = SmallVec::new();
        let mut crossings: Vec<(f64, i32)> = Vec::new();
        let mut y = area.y0.floor();
        while y < area.y1 {
            let yc = y + 0.5;
            crossings.clear();
            for (p0, p1) in &edges {
                if p0.y == p1.y {
                    continue;
                }
                let (lo, hi) = if p0.y < p1.y { (p0.y, p1.y) } else { (p1.y, p0.y) };
                if yc < lo || yc >= hi {
                    continue;
                }
                let x = p0.x + (yc - p0.y) * (p1.x - p0.x) / (p1.y - p0.y);
                crossings.push((x, if p1.y > p0.y { 1 } else { -1 }));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let inside = |w: i32| match fill_rule {
                Fill::NonZero => w != 0,
                Fill::EvenOdd => w % 2 != 0,
            };
            let mut spans: SmallVec<[(f64, f64); 4]> = SmallVec::new();
            let mut winding = 0;
            let mut span_start = 0.0;
            for (x, dir) in &crossings {
                let was_inside = inside(winding);
                winding += dir;
                let is_inside = inside(winding);
                if !was_inside && is_inside {
                    span_start = *x;
                } else if was_inside && !is_inside {
                    let first = (span_start - 0.5).ceil().max(x_min);
                    let end = (*x - 0.5).ceil().min(x_max);
                    if end > first {
                        match spans.last_mut() {
                            Some(prev) if prev.1 >= first => prev.1 = prev.1.max(end),
                            _ => spans.push((first, end)),
                        }
                    }
                }
            }

            let continues = open.len() == spans.len()
                && open
                    .iter()
                    .zip(&spans)
                    .all(|(r, s)| r.x0 == s.0 && r.x1 == s.1);
            if continues {
                for r in &mut open {
                    r.y1 = y + 1.0;
                }
            } else {
                rects.append(&mut open);
                open.extend(spans.iter().map(|s| Rect::new(s.0, y, s.1, y + 1.0)));
            }
            y += 1.0;
        }
        rects.append(&mut open);
        Self { rects }
    }
}
