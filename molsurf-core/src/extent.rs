//! Axis-aligned extents

use crate::point::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its minimum and maximum corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min: Point3f,
    pub max: Point3f,
}

impl Extent {
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    /// Tight bounds of a set of positions, `None` when the set is empty
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3f>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;

        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some(Self { min, max })
    }

    /// Mean position of a set of points, `None` when the set is empty
    pub fn centroid<'a, I>(points: I) -> Option<Point3f>
    where
        I: IntoIterator<Item = &'a Point3f>,
    {
        let mut sum = Vector3f::zeros();
        let mut count = 0usize;
        for p in points {
            sum += p.coords;
            count += 1;
        }
        (count > 0).then(|| Point3f::from(sum / count as f32))
    }

    /// Edge lengths along x, y and z
    pub fn dimensions(&self) -> Vector3f {
        self.max - self.min
    }

    /// Product of the three edge lengths
    pub fn volume(&self) -> f32 {
        let d = self.dimensions();
        d.x * d.y * d.z
    }

    pub fn center(&self) -> Point3f {
        nalgebra::center(&self.min, &self.max)
    }

    /// Axis to bisect: x or y only when strictly longer than both others, z otherwise
    pub fn longest_axis(&self) -> usize {
        let d = self.dimensions();
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.x && d.y > d.z {
            1
        } else {
            2
        }
    }

    /// Inclusive containment test on all three axes
    pub fn contains(&self, p: &Point3f) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Grow every face outward by `offset`
    pub fn padded(&self, offset: f32) -> Self {
        let off = Vector3f::repeat(offset);
        Self {
            min: self.min - off,
            max: self.max + off,
        }
    }

    /// Cut in two at `at` along `axis`
    pub fn split(&self, axis: usize, at: f32) -> (Self, Self) {
        let mut lower = *self;
        let mut upper = *self;
        lower.max[axis] = at;
        upper.min[axis] = at;
        (lower, upper)
    }

    /// Bisect the longest axis at its midpoint
    pub fn bisect(&self) -> (Self, Self) {
        let axis = self.longest_axis();
        let mid = (self.max[axis] - self.min[axis]) / 2.0 + self.min[axis];
        self.split(axis, mid)
    }
}
