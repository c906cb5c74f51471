pub mod fallback;
pub mod parse;
pub mod service;
pub mod types;

pub use service::SuggestionService;
pub use types::Suggestion;
