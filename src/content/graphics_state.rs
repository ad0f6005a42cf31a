//! Graphics state tracked while interpreting a content stream.
//!
//! Only the parameters that influence text placement and ruling detection
//! are kept: the CTM, the text state parameters and the line width. The
//! text and line matrices belong to the text object, not the graphics
//! state, and live in the interpreter.

use crate::geometry::Point;

/// A 2D affine transformation.
///
/// PDF matrices have the form:
/// ```text
/// [ a  b  0 ]
/// [ c  d  0 ]
/// [ e  f  1 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    /// Horizontal scaling component
    pub a: f32,
    /// Rotation/skew component
    pub b: f32,
    /// Rotation/skew component
    pub c: f32,
    /// Vertical scaling component
    pub d: f32,
    /// Horizontal translation
    pub e: f32,
    /// Vertical translation
    pub f: f32,
}

impl Matrix {
    /// The identity transformation.
    ///
    /// ```
    /// use pdf_tabula::content::Matrix;
    ///
    /// let m = Matrix::identity();
    /// assert_eq!(m.transform_point(3.0, 4.0).x, 3.0);
    /// ```
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// Matrix from the six operands of `cm` or `Tm`.
    pub fn from_array([a, b, c, d, e, f]: [f32; 6]) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Matrix from a PDF array object such as `/Matrix` or `/FontMatrix`.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f] => Some(Self::from_array([*a as f32, *b as f32, *c as f32, *d as f32, *e as f32, *f as f32])),
            _ => None,
        }
    }

    /// Pure translation.
    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    /// `self` followed by `other`.
    ///
    /// ```
    /// use pdf_tabula::content::Matrix;
    ///
    /// let m = Matrix::translation(10.0, 0.0).multiply(&Matrix::from_array([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]));
    /// assert_eq!(m.transform_point(1.0, 1.0).x, 22.0);
    /// ```
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Apply the transformation to a point.
    pub fn transform_point(&self, x: f32, y: f32) -> Point {
        Point {
            x: self.a * x + self.c * y + self.e,
            y: self.b * x + self.d * y + self.f,
        }
    }

    /// Determinant of the linear part.
    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Length of the transformed unit vertical vector.
    pub fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    /// Geometric mean stretch, used to scale stroke widths.
    pub fn mean_scale(&self) -> f32 {
        self.determinant().abs().sqrt()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Parameters saved and restored by `q` and `Q`.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    /// Current transformation matrix
    pub ctm: Matrix,
    /// Tc
    pub char_space: f32,
    /// Tw
    pub word_space: f32,
    /// Tz as a fraction (1.0 = 100%)
    pub horizontal_scaling: f32,
    /// TL
    pub leading: f32,
    /// Font resource name from Tf
    pub font_name: Option<String>,
    /// Font size from Tf
    pub font_size: f32,
    /// Ts
    pub text_rise: f32,
    /// Tr
    pub render_mode: u8,
    /// w, in user space
    pub line_width: f32,
}

impl GraphicsState {
    /// Initial state at the start of a page.
    pub fn new() -> Self {
        Self {
            ctm: Matrix::identity(),
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            font_name: None,
            font_size: 0.0,
            text_rise: 0.0,
            render_mode: 0,
            line_width: 1.0,
        }
    }

    /// Tr 3 paints nothing.
    pub fn is_invisible_text(&self) -> bool {
        self.render_mode == 3 || self.render_mode == 7
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new()
    }
}

/// The current state plus the states saved by `q`.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStateStack {
    current: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl GraphicsStateStack {
    /// Stack holding only the initial state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack whose initial CTM is `ctm`.
    pub fn with_ctm(ctm: Matrix) -> Self {
        let mut stack = Self::new();
        stack.current.ctm = ctm;
        stack
    }

    /// The current state.
    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    /// The current state, mutably.
    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    /// `q`
    pub fn save(&mut self) {
        self.saved.push(self.current.clone());
    }

    /// `Q`. Returns false when there was nothing to restore.
    pub fn restore(&mut self) -> bool {
        match self.saved.pop() {
            Some(state) => {
                self.current = state;
                true
            },
            None => false,
        }
    }

    /// Number of states, at least 1.
    pub fn depth(&self) -> usize {
        self.saved.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_multiply_order() {
        let scale = Matrix::from_array([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let translate = Matrix::translation(10.0, 20.0);
        // Scale first, then translate.
        let m = scale.multiply(&translate);
        let p = m.transform_point(1.0, 1.0);
        assert_eq!((p.x, p.y), (12.0, 22.0));
        // Translate first, then scale.
        let m = translate.multiply(&scale);
        let p = m.transform_point(1.0, 1.0);
        assert_eq!((p.x, p.y), (22.0, 42.0));
    }

    #[test]
    fn test_scales() {
        let m = Matrix::from_array([0.0, 3.0, -3.0, 0.0, 0.0, 0.0]);
        assert_eq!(m.vertical_scale(), 3.0);
        assert_eq!(m.mean_scale(), 3.0);
    }

    #[test]
    fn test_from_values() {
        assert!(Matrix::from_values(&[0.001, 0.0, 0.0, 0.001, 0.0, 0.0]).is_some());
        assert!(Matrix::from_values(&[1.0, 0.0]).is_none());
    }

    #[test]
    fn test_stack_save_restore() {
        let mut stack = GraphicsStateStack::new();
        stack.current_mut().line_width = 5.0;
        stack.save();
        stack.current_mut().line_width = 0.5;
        assert_eq!(stack.depth(), 2);
        assert!(stack.restore());
        assert_eq!(stack.current().line_width, 5.0);
        assert!(!stack.restore());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_invisible_text() {
        let mut gs = GraphicsState::new();
        assert!(!gs.is_invisible_text());
        gs.render_mode = 3;
        assert!(gs.is_invisible_text());
    }
}
