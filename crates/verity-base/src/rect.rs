use crate::Vec2;

/// Axis-aligned rectangle given by its top-left origin and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect<T> {
    pub origin: Vec2<T>,
    pub size: Vec2<T>,
}

impl<T> Rect<T> {
    pub fn new(origin: Vec2<T>, size: Vec2<T>) -> Self {
        Self { origin, size }
    }
}

impl Rect<f32> {
    /// Rectangle spanning `min..max`.
    pub fn from_corners(min: Vec2<f32>, max: Vec2<f32>) -> Self {
        Self::new(min, Vec2::new(max.x - min.x, max.y - min.y))
    }

    pub fn max(&self) -> Vec2<f32> {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    pub fn center(&self) -> Vec2<f32> {
        Vec2::new(
            self.origin.x + self.size.x / 2.0,
            self.origin.y + self.size.y / 2.0,
        )
    }

    pub fn area(&self) -> f32 {
        self.size.x.max(0.0) * self.size.y.max(0.0)
    }

    /// Intersection over union; 0 when the union is empty.
    pub fn iou(&self, other: &Rect<f32>) -> f32 {
        let (a_max, b_max) = (self.max(), other.max());
        let w = (a_max.x.min(b_max.x) - self.origin.x.max(other.origin.x)).max(0.0);
        let h = (a_max.y.min(b_max.y) - self.origin.y.max(other.origin.y)).max(0.0);
        let intersection = w * h;
        let union = self.area() + other.area() - intersection;
        if union > 0.0 { intersection / union } else { 0.0 }
    }

    /// Square of side `max(w, h) * scale` sharing this rectangle's center.
    pub fn square_around_center(&self, scale: f32) -> Self {
        let side = self.size.x.max(self.size.y) * scale;
        let c = self.center();
        Self::new(
            Vec2::new(c.x - side / 2.0, c.y - side / 2.0),
            Vec2::new(side, side),
        )
    }
}
