//! XHTML purifier: turns arbitrary tag soup into canonical, whitelisted,
//! pretty-printed markup.
//!
//! The pipeline is a lenient tokenizer feeding an HTML5-style tree builder
//! (insertion modes, open-element stack, active formatting reconstruction,
//! table structure repair) followed by an indenting serializer. Purification
//! never fails: malformed input yields the best tree that could be built.
//!
//! ```
//! use xhtml_purifier::purify;
//!
//! let clean = purify("Hello <b onclick=\"evil()\">world");
//! assert_eq!(clean, "<p>\n  Hello <strong>world</strong>\n</p>");
//! ```

pub mod document;
pub mod errors;
pub mod node;
pub mod parser;
pub mod serializer;
pub mod tokenizer;
pub mod whitelist;

pub use parser::{Purifier, PurifierOptions};

/// Purifies raw markup with the default options.
pub fn purify(raw_markup: &str) -> String {
    purify_with_options(raw_markup, PurifierOptions::default())
}

/// Purifies raw markup. The output contains only whitelisted elements and
/// attributes, indented two spaces per nesting level, with no leading or
/// trailing whitespace. Purifying the output again returns it unchanged.
pub fn purify_with_options(raw_markup: &str, options: PurifierOptions) -> String {
    let purifier = Purifier::new(raw_markup, options);
    let document = purifier.parse();
    serializer::serialize(&document)
}
