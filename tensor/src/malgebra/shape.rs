use std::fmt;

/// Geometry of a single 2-D slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Shape2 {
    pub height: usize,
    pub width: usize,
}

/// Geometry of a depth-major 3-D volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub struct Shape3 {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape2 {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
    pub const fn volume(&self) -> usize {
        self.height * self.width
    }
    /// Row-major offset of `(y, x)`.
    #[inline(always)]
    pub const fn idx(&self, y: usize, x: usize) -> usize {
        y * self.width + x
    }
}

impl Shape3 {
    pub const fn new(depth: usize, height: usize, width: usize) -> Self {
        Self { depth, height, width }
    }
    pub const fn volume(&self) -> usize {
        self.depth * self.height * self.width
    }
    /// `z*H*W + y*W + x`
    #[inline(always)]
    pub const fn idx(&self, z: usize, y: usize, x: usize) -> usize {
        z * self.height * self.width + y * self.width + x
    }
    pub const fn without_depth(&self) -> Shape2 {
        Shape2::new(self.height, self.width)
    }
}

impl fmt::Display for Shape2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.height, self.width)
    }
}

impl fmt::Display for Shape3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.depth, self.height, self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_and_index() {
        let shape = Shape3::new(2, 3, 4);
        assert_eq!(shape.volume(), 24);
        assert_eq!(shape.idx(1, 2, 3), 23);
        assert_eq!(shape.idx(1, 0, 0), 12);
        assert_eq!(shape.without_depth(), Shape2::new(3, 4));
        assert_eq!(Shape2::new(3, 4).idx(2, 1), 9);
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape3::new(1, 28, 28).to_string(), "(1,28,28)");
    }
}
