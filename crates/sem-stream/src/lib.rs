//! sem-stream - Document normalization and id assignment
//!
//! Converts heterogeneously shaped input documents into canonical
//! `(id, data, tags)` triples ready to be written to the store.
//!
//! # Example
//!
//! ```rust
//! use sem_core::{Action, DocumentId, IndexState};
//! use sem_stream::{RawDocument, Stream};
//!
//! let mut state = IndexState::default();
//! let triples: Vec<_> = Stream::new(&mut state, Some(Action::Upsert))
//!     .apply(vec![RawDocument::from("hello"), RawDocument::from((9, "world"))])
//!     .collect();
//!
//! assert_eq!(triples[0].id, Some(DocumentId::Int(0)));
//! assert_eq!(triples[1].id, Some(DocumentId::Int(9)));
//! assert_eq!(state.autoid, Some(1));
//! ```

mod stream;

pub use stream::{normalize, Normalized, RawDocument, Stream};

// Re-export types for convenience
pub use sem_core::{Action, IndexState, Triple};
