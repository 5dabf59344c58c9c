//! Public types for the Tolk API.

mod options;
mod request;
mod translation;

pub use options::TranslateOptions;
pub use request::TranslateRequest;
pub use translation::Translation;
