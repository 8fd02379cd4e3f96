//! Input parsing module for extracting locators from text documents.
//!
//! A locator is any whitespace-separated token that starts with `http`,
//! `https` or `ftp` once parentheses and commas have been removed.
//!
//! # Example
//!
//! ```
//! use bulkget_core::parser::extract_locators;
//!
//! let found = extract_locators("Mirror list: (https://example.com/a.iso), ftp://example.com/a.iso");
//! assert_eq!(found.len(), 2);
//! ```

mod error;
mod url;

pub use error::ParseError;
pub use url::{dedup_locators, extract_locators, load_locators};
