//! Axis-aligned bounding boxes in world space.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Creates a box from two corners, normalised so that `min <= max`
    /// component-wise.
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// A box of half-size `extent` around `centre`.
    pub fn around(centre: Point3<f32>, extent: Vector3<f32>) -> Self {
        Self::new(centre - extent, centre + extent)
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f32 {
        self.size().magnitude()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after `transform`, i.e. the box around its eight
    /// transformed corners.
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        let corners = self.corners().map(|c| transform.transform_point(c));
        let first = Self::new(corners[0], corners[0]);
        corners[1..]
            .iter()
            .fold(first, |acc, &c| acc.union(&Self::new(c, c)))
    }

    /// Folds boxes into their union. `None` for an empty iterator.
    pub fn union_all<I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = Aabb>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Aabb>, b| match acc {
                Some(acc) => Some(acc.union(&b)),
                None => Some(b),
            })
    }
}
