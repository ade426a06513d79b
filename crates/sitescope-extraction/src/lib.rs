//! HTML processing for sitescope.
//!
//! The page is parsed exactly once into a [`PageDocument`]; analyzers
//! consume that model rather than re-parsing markup. Cleaning and the
//! markdown projection are deterministic pure functions: same input, same
//! output, and cleaning is idempotent.

pub mod cleaner;
pub mod document;
pub mod links;
pub mod markdown;

pub use cleaner::{clean_html, text_content};
pub use document::{extract_title, HeadingRef, ImageRef, PageDocument};
pub use links::extract_links;
pub use markdown::markdown_from_cleaned;
