//! PDF content streams: parsing and interpretation.
//!
//! [`parse_content_stream`] turns decoded bytes into [`Operator`]s;
//! [`interpret_page`] executes them against a page's resources and produces
//! a [`Page`](crate::page::Page) of text fragments and ruling lines.

pub mod graphics_state;
pub mod interpreter;
pub mod operators;
pub mod parser;

pub use graphics_state::{GraphicsState, GraphicsStateStack, Matrix};
pub use interpreter::{interpret_page, MAX_FORM_DEPTH};
pub use operators::{Operator, TextElement};
pub use parser::{parse_content_stream, ContentStream};
