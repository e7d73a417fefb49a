// Read-side queries over project indexes

pub mod engine;

pub use engine::{Completion, CompletionSource, PositionContext, QueryEngine, SearchHit};
