use nalgebra::Matrix1x4;
use num::Float;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt::Debug;

/* ------------------------------------------------------------------------------
 * Type aliases
 * ------------------------------------------------------------------------------ */
/// Box as `[center_x, center_y, width, height]`.
pub type Cxcywh<T> = Matrix1x4<T>;

/* ------------------------------------------------------------------------------
 * Rect struct
 * ------------------------------------------------------------------------------ */
/// Axis-aligned box stored as top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect<T>
where
    T: Debug + Float + 'static,
{
    tlwh: Matrix1x4<T>,
}

impl<T> Rect<T>
where
    T: Debug + Float + 'static,
{
    pub fn new(x: T, y: T, width: T, height: T) -> Self {
        Self {
            tlwh: Matrix1x4::new(x, y, width, height),
        }
    }

    #[inline(always)]
    pub fn x(&self) -> T {
        self.tlwh[(0, 0)]
    }

    #[inline(always)]
    pub fn set_x(&mut self, x: T) {
        self.tlwh[(0, 0)] = x;
    }

    #[inline(always)]
    pub fn y(&self) -> T {
        self.tlwh[(0, 1)]
    }

    #[inline(always)]
    pub fn set_y(&mut self, y: T) {
        self.tlwh[(0, 1)] = y;
    }

    #[inline(always)]
    pub fn width(&self) -> T {
        self.tlwh[(0, 2)]
    }

    #[inline(always)]
    pub fn set_width(&mut self, width: T) {
        self.tlwh[(0, 2)] = width;
    }

    #[inline(always)]
    pub fn height(&self) -> T {
        self.tlwh[(0, 3)]
    }

    #[inline(always)]
    pub fn set_height(&mut self, height: T) {
        self.tlwh[(0, 3)] = height;
    }

    #[inline(always)]
    pub fn right(&self) -> T {
        self.x() + self.width()
    }

    #[inline(always)]
    pub fn bottom(&self) -> T {
        self.y() + self.height()
    }

    pub fn center(&self) -> (T, T) {
        let two = T::one() + T::one();
        (self.x() + self.width() / two, self.y() + self.height() / two)
    }

    /// Area of the box; negative extents count as empty.
    pub fn area(&self) -> T {
        self.width().max(T::zero()) * self.height().max(T::zero())
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= T::zero() || self.height() <= T::zero()
    }

    /// Intersection of two boxes. Disjoint boxes give an empty rect.
    pub fn intersect(&self, other: &Rect<T>) -> Rect<T> {
        let x1 = self.x().max(other.x());
        let y1 = self.y().max(other.y());
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return Rect::new(x1, y1, T::zero(), T::zero());
        }
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn get_cxcywh(&self) -> Cxcywh<T> {
        let (cx, cy) = self.center();
        Matrix1x4::new(cx, cy, self.width(), self.height())
    }

    /// Create Rect from [center_x, center_y, width, height] format
    pub fn from_cxcywh(cx: T, cy: T, width: T, height: T) -> Self {
        let two = T::one() + T::one();
        Self::new(cx - width / two, cy - height / two, width, height)
    }

    /// Get bounding box as [x1, y1, x2, y2] format
    pub fn get_xyxy(&self) -> [T; 4] {
        [self.x(), self.y(), self.right(), self.bottom()]
    }

    /// Create Rect from [x1, y1, x2, y2] format
    pub fn from_xyxy(x1: T, y1: T, x2: T, y2: T) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }
}

impl<T> Serialize for Rect<T>
where
    T: Debug + Float + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Rect", 4)?;
        state.serialize_field("x", &self.x())?;
        state.serialize_field("y", &self.y())?;
        state.serialize_field("width", &self.width())?;
        state.serialize_field("height", &self.height())?;
        state.end()
    }
}
