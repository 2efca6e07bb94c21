// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The clip log and its resolution into a target coordinate space.
//!
//! Clip operations are recorded, not applied: each [`ClipEntry`] keeps the
//! device transform that was current when it was issued. Resolving the log
//! maps every entry from its own transform into the requested space and folds
//! the results in log order. No folded clip is retained between resolutions,
//! so resolving the same log in the same space always gives the same answer.

use alloc::sync::Arc;
use alloc::vec::Vec;

use kurbo::{Affine, BezPath, Rect, Shape};
use peniko::Fill;
use smallvec::SmallVec;

use crate::region::Region;
use crate::transform::preserves_rects;

/// How a new clip combines with the current one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClipOperation {
    /// Remove all clipping.
    NoClip,
    /// Replace the current clip.
    #[default]
    ReplaceClip,
    /// Intersect with the current clip.
    IntersectClip,
}

/// The geometry of a clip entry, in the coordinates it was issued in.
#[derive(Clone, Debug, PartialEq)]
pub enum ClipShape {
    /// A pixel rectangle with integral coordinates.
    ///
    /// Under a transform that keeps rectangles axis-aligned, the mapped
    /// rectangle is rounded to whole pixels.
    Rect(Rect),
    /// A rectangle with fractional coordinates.
    RectF(Rect),
    /// A region.
    Region(Arc<Region>),
    /// A path with its fill rule.
    Path(Arc<BezPath>, Fill),
}

impl ClipShape {
    /// A pixel rectangle; the coordinates of `rect` are rounded.
    #[must_use]
    pub fn pixel_rect(rect: Rect) -> Self {
        Self::Rect(rect.round())
    }

    /// The bounding box of the shape in its own coordinates.
    #[must_use]
    pub fn bounding_box(&self) -> Rect {
        match self {
            Self::Rect(r) | Self::RectF(r) => r.abs(),
            Self::Region(region) => region.bounding_rect(),
            Self::Path(path, _) => path.bounding_box(),
        }
    }

    fn map(&self, xf: Affine) -> MappedShape {
        match self {
            Self::Rect(r) => {
                if preserves_rects(xf) {
                    MappedShape::Region(Region::from_rect(xf.transform_rect_bbox(*r).round()))
                } else {
                    MappedShape::Path(xf * r.to_path(0.1), Fill::NonZero)
                }
            }
            Self::RectF(r) => {
                if preserves_rects(xf) {
                    let mapped = xf.transform_rect_bbox(*r);
                    if mapped.round() == mapped {
                        return MappedShape::Region(Region::from_rect(mapped));
                    }
                    MappedShape::Path(mapped.to_path(0.1), Fill::NonZero)
                } else {
                    MappedShape::Path(xf * r.to_path(0.1), Fill::NonZero)
                }
            }
            Self::Region(region) => match region.transformed(xf) {
                Some(mapped) => MappedShape::Region(mapped),
                None => MappedShape::Path(xf * region.to_path(), Fill::NonZero),
            },
            Self::Path(path, fill) => MappedShape::Path(xf * path.as_ref().clone(), *fill),
        }
    }
}

enum MappedShape {
    Region(Region),
    Path(BezPath, Fill),
}

/// One recorded clip operation.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipEntry {
    /// The clip geometry.
    pub shape: ClipShape,
    /// How it combines with what came before.
    pub operation: ClipOperation,
    /// The device transform in effect when the clip was issued.
    pub transform: Affine,
}

/// An effective clip: the intersection of an optional region and a list of
/// fill-ruled paths.
///
/// With no region and no paths nothing is clipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedClip {
    region: Option<Region>,
    paths: Vec<(BezPath, Fill)>,
}

impl ResolvedClip {
    /// A clip that lets everything through.
    #[must_use]
    pub fn unclipped() -> Self {
        Self::default()
    }

    /// A clip that lets nothing through.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            region: Some(Region::new()),
            paths: Vec::new(),
        }
    }

    /// A clip to `rect`.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            region: Some(Region::from_rect(rect)),
            paths: Vec::new(),
        }
    }

    /// Returns `true` if nothing is clipped away.
    #[must_use]
    pub fn is_unclipped(&self) -> bool {
        self.region.is_none() && self.paths.is_empty()
    }

    /// Returns `true` if the clip is known to let nothing through.
    ///
    /// Path intersections are not evaluated, so a clip made of disjoint paths
    /// may report `false` while still covering nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.as_ref().is_some_and(Region::is_empty)
    }

    /// The region part of the clip, if any.
    #[must_use]
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// The path parts of the clip, in the order they were intersected.
    #[must_use]
    pub fn paths(&self) -> &[(BezPath, Fill)] {
        &self.paths
    }

    /// Intersects the clip with `region`.
    pub fn intersect_region(&mut self, region: &Region) {
        let next = match &self.region {
            Some(current) => current.intersected(region),
            None => region.clone(),
        };
        if next.is_empty() {
            self.paths.clear();
        }
        self.region = Some(next);
    }

    /// Intersects the clip with `path`.
    pub fn intersect_path(&mut self, path: BezPath, fill: Fill) {
        if !self.is_empty() {
            self.paths.push((path, fill));
        }
    }

    fn intersect(&mut self, shape: MappedShape) {
        match shape {
            MappedShape::Region(region) => self.intersect_region(&region),
            MappedShape::Path(path, fill) => self.intersect_path(path, fill),
        }
    }

    /// A conservative bounding rectangle; `None` when unclipped.
    #[must_use]
    pub fn bounding_rect(&self) -> Option<Rect> {
        if self.is_unclipped() {
            return None;
        }
        let mut bounds = self.region.as_ref().map(Region::bounding_rect);
        for (path, _) in &self.paths {
            let b = path.bounding_box();
            bounds = Some(bounds.map_or(b, |acc| acc.intersect(b)));
        }
        bounds.map(|b| if b.area() > 0.0 { b } else { Rect::ZERO })
    }

    /// Rasterizes the clip into a region, limited to `bounds`.
    #[must_use]
    pub fn to_region(&self, tolerance: f64, bounds: Rect) -> Region {
        let mut region = match &self.region {
            Some(region) => region.intersected(&Region::from_rect(bounds)),
            None => Region::from_rect(bounds),
        };
        for (path, fill) in &self.paths {
            if region.is_empty() {
                break;
            }
            let clip_bounds = region.bounding_rect();
            region = region.intersected(&Region::from_path(path, *fill, tolerance, clip_bounds));
        }
        region
    }

    /// The outline of the clip. Unclipped gives an empty path.
    ///
    /// A clip made of a single path returns it as is; anything that would need
    /// a path boolean is rasterized within `bounds` first.
    #[must_use]
    pub fn to_path(&self, tolerance: f64, bounds: Rect) -> BezPath {
        match (&self.region, self.paths.as_slice()) {
            (None, []) => BezPath::new(),
            (Some(region), []) => region.to_path(),
            (None, [(path, _)]) => path.clone(),
            _ => self.to_region(tolerance, bounds).to_path(),
        }
    }
}

/// The ordered, append-only log of clip operations of one painter state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClipLog {
    entries: SmallVec<[ClipEntry; 2]>,
}

impl ClipLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry`. [`NoClip`](ClipOperation::NoClip) and
    /// [`ReplaceClip`](ClipOperation::ReplaceClip) truncate the log first.
    pub fn push(&mut self, entry: ClipEntry) {
        if entry.operation != ClipOperation::IntersectClip {
            self.entries.clear();
        }
        self.entries.push(entry);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The recorded entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[ClipEntry] {
        &self.entries
    }

    /// Returns `true` if no clip was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The operation of the most recent entry.
    #[must_use]
    pub fn last_operation(&self) -> Option<ClipOperation> {
        self.entries.last().map(|e| e.operation)
    }

    /// Resolves the log in the space reached from device space by
    /// `target_from_device`.
    ///
    /// Entry `i` is mapped by `target_from_device * entry.transform`.
    #[must_use]
    pub fn resolve(&self, target_from_device: Affine) -> ResolvedClip {
        let mut acc = ResolvedClip::unclipped();
        for entry in &self.entries {
            let xf = target_from_device * entry.transform;
            match entry.operation {
                ClipOperation::NoClip => acc = ResolvedClip::unclipped(),
                ClipOperation::ReplaceClip => {
                    acc = ResolvedClip::unclipped();
                    acc.intersect(entry.shape.map(xf));
                }
                ClipOperation::IntersectClip => acc.intersect(entry.shape.map(xf)),
            }
        }
        acc
    }

    /// An approximate bounding rectangle of the clip in the target space.
    ///
    /// Only entry bounding boxes are folded, so the result may be larger than
    /// the true clip but never smaller. `None` means unclipped; an empty
    /// intersection yields [`Rect::ZERO`].
    #[must_use]
    pub fn bounding_rect(&self, target_from_device: Affine) -> Option<Rect> {
        let mut acc: Option<Rect> = None;
        for entry in &self.entries {
            let xf = target_from_device * entry.transform;
            let b = xf.transform_rect_bbox(entry.shape.bounding_box());
            acc = match entry.operation {
                ClipOperation::NoClip => None,
                ClipOperation::ReplaceClip => Some(b),
                ClipOperation::IntersectClip => Some(acc.map_or(b, |a| a.intersect(b))),
            };
        }
        acc.map(|b| if b.width() > 0.0 && b.height() > 0.0 { b } else { Rect::ZERO })
    }
}
