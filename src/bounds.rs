use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};

/// Axis-aligned bounding box.
///
/// An empty box (no points added yet) has `min > max` on every axis; its
/// center is the origin and its size is zero, so a model without geometry
/// frames like a degenerate point at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Point3<f32>>>(points: I) -> Self {
        let mut aabb = Self::empty();
        for point in points {
            aabb.expand_to(point);
        }
        aabb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_to(&mut self, point: Point3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    pub fn center(&self) -> Point3<f32> {
        if self.is_empty() {
            return Point3::origin();
        }
        self.min.midpoint(self.max)
    }

    pub fn extent(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::zero();
        }
        self.max - self.min
    }

    /// Length of the box diagonal.
    pub fn size(&self) -> f32 {
        self.extent().magnitude()
    }
}
