//! LPML tag parser.
//!
//! LPML is the loose tag language agents use to request tool calls inside
//! otherwise free-form text:
//!
//! ```text
//! I'll add a heading.
//! <edit_file path="index.html" start="3" end="3" mode="replace">
//! <h1>Hello</h1>
//! </edit_file>
//! <finish>Added the heading.</finish>
//! ```
//!
//! The parser is tag soup tolerant: unclosed elements are closed implicitly,
//! stray end tags survive as text, and backtick spans, `<!-- -->` comments
//! and `<!...>` declarations are never read as markup.
//!
//! - [`parse`] - Parse text into a tree of [`Node`]s
//! - [`parse_document`] - Same, also returning recovery warnings
//! - [`ParseOptions`] - Text trimming and excluded (raw-body) tags

mod node;
mod parser;

pub use node::{Element, Node};
pub use parser::{Document, ParseOptions, ParseWarning, parse, parse_document};
