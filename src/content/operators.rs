//! Content stream operators.
//!
//! The set is closed: every operator that affects text placement or ruling
//! geometry has a typed variant, recognised operators without geometric
//! effect (colour, rendering intent, marked content, Type3 glyph metrics)
//! collapse into [`Operator::NoOp`], and anything else is kept as
//! [`Operator::Other`] so the interpreter can count it.

use crate::object::Object;

/// A content stream operator with typed operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    // Text positioning
    /// Move text position (Td)
    Td {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Move text position and set leading (TD)
    TD {
        /// Horizontal offset
        tx: f32,
        /// Vertical offset
        ty: f32,
    },
    /// Set text matrix (Tm)
    Tm {
        /// Matrix `[a b c d e f]`
        matrix: [f32; 6],
    },
    /// Move to start of next line (T*)
    TStar,

    // Text showing
    /// Show a string (Tj)
    Tj {
        /// Encoded string bytes
        text: Vec<u8>,
    },
    /// Show strings with positioning adjustments (TJ)
    TJ {
        /// Strings and offsets in thousandths of text space
        array: Vec<TextElement>,
    },
    /// Next line, then show (')
    Quote {
        /// Encoded string bytes
        text: Vec<u8>,
    },
    /// Set spacing, next line, then show (")
    DoubleQuote {
        /// Word spacing
        word_space: f32,
        /// Character spacing
        char_space: f32,
        /// Encoded string bytes
        text: Vec<u8>,
    },

    // Text state
    /// Character spacing (Tc)
    Tc {
        /// Spacing in unscaled text space units
        char_space: f32,
    },
    /// Word spacing (Tw)
    Tw {
        /// Spacing in unscaled text space units
        word_space: f32,
    },
    /// Horizontal scaling (Tz)
    Tz {
        /// Percentage
        scale: f32,
    },
    /// Leading (TL)
    TL {
        /// Leading in unscaled text space units
        leading: f32,
    },
    /// Font and size (Tf)
    Tf {
        /// Resource name in `/Font`
        font: String,
        /// Size in text space units
        size: f32,
    },
    /// Rendering mode (Tr)
    Tr {
        /// Mode 0-7; 3 is invisible
        render: u8,
    },
    /// Rise (Ts)
    Ts {
        /// Baseline shift
        rise: f32,
    },
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,

    // Graphics state
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Concatenate to the CTM (cm)
    Cm {
        /// Matrix `[a b c d e f]`
        matrix: [f32; 6],
    },
    /// Line width (w)
    SetLineWidth {
        /// Width in user space
        width: f32,
    },
    /// Apply a named `/ExtGState` (gs)
    SetExtGState {
        /// Resource name
        name: String,
    },

    // Path construction
    /// Begin subpath (m)
    MoveTo {
        /// X
        x: f32,
        /// Y
        y: f32,
    },
    /// Straight segment (l)
    LineTo {
        /// X
        x: f32,
        /// Y
        y: f32,
    },
    /// Bezier curve (c, v, y); only the end point matters for rulings
    CurveTo {
        /// End point x
        x: f32,
        /// End point y
        y: f32,
    },
    /// Close subpath (h)
    ClosePath,
    /// Rectangle (re)
    Rectangle {
        /// Lower-left x
        x: f32,
        /// Lower-left y
        y: f32,
        /// Width, may be negative
        width: f32,
        /// Height, may be negative
        height: f32,
    },

    // Path painting
    /// Stroke (S, s)
    Stroke {
        /// `s` closes the path first
        close: bool,
    },
    /// Fill (f, F, f*)
    Fill,
    /// Fill and stroke (B, B*, b, b*)
    FillStroke {
        /// `b` and `b*` close the path first
        close: bool,
    },
    /// End path without painting (n)
    EndPath,
    /// Clip (W, W*); takes effect at the next painting operator
    Clip,

    // XObjects
    /// Paint an XObject (Do)
    Do {
        /// Resource name in `/XObject`
        name: String,
    },
    /// Inline image (BI ... ID ... EI), skipped
    InlineImage,

    /// Recognised operator with no effect on text or rulings
    NoOp {
        /// Operator keyword
        name: String,
    },
    /// Operator this interpreter does not know
    Other {
        /// Operator keyword
        name: String,
        /// Operands that preceded it
        operands: Vec<Object>,
    },
}

/// Element of a `TJ` array.
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    /// Encoded string bytes
    String(Vec<u8>),
    /// Adjustment in thousandths of text space; positive moves left
    Offset(f32),
}

impl Operator {
    /// True for operators that show text.
    pub fn shows_text(&self) -> bool {
        matches!(
            self,
            Operator::Tj { .. } | Operator::TJ { .. } | Operator::Quote { .. } | Operator::DoubleQuote { .. }
        )
    }

    /// True for operators that end a path.
    pub fn paints_path(&self) -> bool {
        matches!(
            self,
            Operator::Stroke { .. } | Operator::Fill | Operator::FillStroke { .. } | Operator::EndPath
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Operator::Tj { text: b"x".to_vec() }.shows_text());
        assert!(Operator::TJ { array: vec![] }.shows_text());
        assert!(!Operator::BeginText.shows_text());
        assert!(Operator::Fill.paints_path());
        assert!(Operator::EndPath.paints_path());
        assert!(!Operator::ClosePath.paints_path());
    }
}
