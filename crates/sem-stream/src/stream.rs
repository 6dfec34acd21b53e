//! Normalization of input documents into `(id, data, tags)` triples.

use std::iter::FusedIterator;

use serde_json::Value;
use tracing::{debug, warn};

use sem_core::{Action, DocumentId, IndexState, Triple};

/// An input document before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDocument {
    /// Any JSON value. Objects contribute their `id` and `tags` fields.
    Value(Value),
    /// Positional `(id, data[, tags, ...])` tuple.
    Tuple(Vec<Value>),
}

impl From<Value> for RawDocument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for RawDocument {
    fn from(text: &str) -> Self {
        Self::Value(Value::String(text.to_string()))
    }
}

impl From<String> for RawDocument {
    fn from(text: String) -> Self {
        Self::Value(Value::String(text))
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for RawDocument {
    fn from((id, data): (A, B)) -> Self {
        Self::Tuple(vec![id.into(), data.into()])
    }
}

impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> From<(A, B, C)> for RawDocument {
    fn from((id, data, tags): (A, B, C)) -> Self {
        Self::Tuple(vec![id.into(), data.into(), tags.into()])
    }
}

/// Convert one document. Unmatched shapes keep the whole element as data.
pub fn normalize(document: RawDocument) -> Triple {
    match document {
        RawDocument::Value(Value::Object(map)) => {
            let id = map.get("id").and_then(DocumentId::from_value);
            let tags = map.get("tags").and_then(tags_from_value);
            Triple::new(id, Value::Object(map), tags)
        }
        RawDocument::Tuple(values) if values.len() >= 2 => {
            let mut values = values.into_iter();
            let id = values.next().unwrap_or(Value::Null);
            let data = values.next().unwrap_or(Value::Null);
            let tags = values.next().as_ref().and_then(tags_from_value);
            Triple::new(DocumentId::from_value(&id), data, tags)
        }
        RawDocument::Tuple(values) => Triple::new(None, Value::Array(values), None),
        RawDocument::Value(value) => Triple::new(None, value, None),
    }
}

fn tags_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Turns a document sequence into triples, assigning ids when an index
/// action is set.
///
/// Upsert streams continue the counter persisted in [`IndexState`] and write
/// it back once the input is exhausted. Other actions count from 0 and leave
/// the state alone.
pub struct Stream<'s> {
    state: &'s mut IndexState,
    action: Option<Action>,
    autoid: u64,
}

impl<'s> Stream<'s> {
    /// Stream over `state`. Only `Action::Upsert` reads the persisted
    /// counter; other actions count from 0.
    pub fn new(state: &'s mut IndexState, action: Option<Action>) -> Self {
        let autoid = match action {
            Some(Action::Upsert) => state.seed(),
            _ => 0,
        };

        Self {
            state,
            action,
            autoid,
        }
    }

    /// Lazily normalize `documents`. Single pass.
    pub fn apply<I>(self, documents: I) -> Normalized<'s, I::IntoIter>
    where
        I: IntoIterator,
        I::Item: Into<RawDocument>,
    {
        Normalized {
            stream: self,
            documents: documents.into_iter(),
            assigned: 0,
            done: false,
        }
    }
}

/// Iterator returned by [`Stream::apply`].
pub struct Normalized<'s, I> {
    stream: Stream<'s>,
    documents: I,
    assigned: usize,
    done: bool,
}

impl<'s, I> Normalized<'s, I> {
    fn finish(&mut self) {
        self.done = true;

        if self.stream.action == Some(Action::Upsert) && self.assigned > 0 {
            self.stream.state.advance(self.stream.autoid);
            debug!(
                "Persisted autoid {} after {} assignments",
                self.stream.autoid, self.assigned
            );
        }
    }
}

impl<'s, I> Iterator for Normalized<'s, I>
where
    I: Iterator,
    I::Item: Into<RawDocument>,
{
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        if self.done {
            return None;
        }

        let Some(document) = self.documents.next() else {
            self.finish();
            return None;
        };

        let mut triple = normalize(document.into());
        if self.stream.action.is_some() && triple.id.is_none() {
            match i64::try_from(self.stream.autoid) {
                Ok(id) => {
                    triple.id = Some(DocumentId::Int(id));
                    self.stream.autoid += 1;
                    self.assigned += 1;
                }
                // Left unset; writers reject documents without ids
                Err(_) => warn!("Autoid counter exhausted at {}", self.stream.autoid),
            }
        }

        Some(triple)
    }
}

impl<'s, I> FusedIterator for Normalized<'s, I>
where
    I: Iterator,
    I::Item: Into<RawDocument>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(
        state: &mut IndexState,
        action: Option<Action>,
        docs: Vec<RawDocument>,
    ) -> Vec<Triple> {
        Stream::new(state, action).apply(docs).collect()
    }

    #[test]
    fn test_object_fields() {
        let triple = normalize(json!({"id": 5, "tags": "t"}).into());
        assert_eq!(triple.id, Some(DocumentId::Int(5)));
        assert_eq!(triple.data, json!({"id": 5, "tags": "t"}));
        assert_eq!(triple.tags.as_deref(), Some("t"));
    }

    #[test]
    fn test_object_without_fields() {
        let triple = normalize(json!({"text": "hello"}).into());
        assert_eq!(triple.id, None);
        assert_eq!(triple.tags, None);
    }

    #[test]
    fn test_tuples() {
        let three = normalize((1, "x", "y").into());
        assert_eq!(
            three,
            Triple::new(Some(DocumentId::Int(1)), json!("x"), Some("y".into()))
        );

        let two = normalize((1, "x").into());
        assert_eq!(two, Triple::new(Some(DocumentId::Int(1)), json!("x"), None));

        let long = normalize(RawDocument::Tuple(vec![
            json!("a"),
            json!("b"),
            json!("c"),
            json!("d"),
        ]));
        assert_eq!(long.id, Some(DocumentId::Text("a".into())));
        assert_eq!(long.tags.as_deref(), Some("c"));
    }

    #[test]
    fn test_fallback_shapes() {
        assert_eq!(normalize("plain".into()), Triple::new(None, json!("plain"), None));
        assert_eq!(
            normalize(json!([1, 2]).into()),
            Triple::new(None, json!([1, 2]), None)
        );
        assert_eq!(
            normalize(RawDocument::Tuple(vec![json!(1)])),
            Triple::new(None, json!([1]), None)
        );
    }

    #[test]
    fn test_no_action_leaves_ids_unset() {
        let mut state = IndexState::default();
        let triples = collect(&mut state, None, vec!["plain".into()]);
        assert_eq!(triples, vec![Triple::new(None, json!("plain"), None)]);
        assert_eq!(state, IndexState::default());
    }

    #[test]
    fn test_upsert_resumes_across_streams() {
        let mut state = IndexState {
            offset: Some(0),
            autoid: None,
        };

        let first = collect(&mut state, Some(Action::Upsert), vec!["plain".into()]);
        assert_eq!(first[0].id, Some(DocumentId::Int(0)));
        assert_eq!(state.autoid, Some(1));

        let second = collect(&mut state, Some(Action::Upsert), vec!["plain".into()]);
        assert_eq!(second[0].id, Some(DocumentId::Int(1)));
        assert_eq!(state.autoid, Some(2));
    }

    #[test]
    fn test_upsert_seeds_from_offset() {
        let mut state = IndexState {
            offset: Some(100),
            autoid: None,
        };

        let triples = collect(
            &mut state,
            Some(Action::Upsert),
            vec!["a".into(), (7, "b").into(), "c".into()],
        );
        let ids: Vec<_> = triples.into_iter().map(|t| t.id.unwrap()).collect();
        assert_eq!(
            ids,
            vec![DocumentId::Int(100), DocumentId::Int(7), DocumentId::Int(101)]
        );
        assert_eq!(state.autoid, Some(102));
    }

    #[test]
    fn test_index_action_counts_from_zero_without_persisting() {
        let mut state = IndexState {
            offset: Some(50),
            autoid: Some(60),
        };

        let docs = vec!["a".into(), "b".into()];
        let triples = collect(&mut state, Some(Action::Index), docs);
        assert_eq!(triples[0].id, Some(DocumentId::Int(0)));
        assert_eq!(triples[1].id, Some(DocumentId::Int(1)));
        assert_eq!(state.autoid, Some(60));
    }

    #[test]
    fn test_counter_persisted_only_after_exhaustion() {
        let mut state = IndexState::default();
        {
            let mut stream = Stream::new(&mut state, Some(Action::Upsert))
                .apply(vec![RawDocument::from("a"), RawDocument::from("b")]);
            assert!(stream.next().is_some());
            assert!(stream.next().is_some());
            // Dropped before exhaustion
        }
        assert_eq!(state.autoid, None);

        let count = Stream::new(&mut state, Some(Action::Upsert))
            .apply(vec![RawDocument::from("a")])
            .count();
        assert_eq!(count, 1);
        assert_eq!(state.autoid, Some(1));
    }

    #[test]
    fn test_upsert_without_assignment_keeps_state() {
        let mut state = IndexState::default();
        let triples = collect(&mut state, Some(Action::Upsert), vec![(3, "x").into()]);
        assert_eq!(triples[0].id, Some(DocumentId::Int(3)));
        assert_eq!(state.autoid, None);
    }

    #[test]
    fn test_lazy_over_unbounded_input() {
        let mut state = IndexState::default();
        let taken: Vec<Triple> = Stream::new(&mut state, Some(Action::Index))
            .apply((0..).map(|i: i64| RawDocument::from(json!({"n": i}))))
            .take(3)
            .collect();
        assert_eq!(taken.len(), 3);
        assert_eq!(taken[2].id, Some(DocumentId::Int(2)));
    }

    #[test]
    fn test_counter_stops_at_largest_id() {
        let mut state = IndexState {
            offset: None,
            autoid: Some(i64::MAX as u64),
        };

        let triples = collect(&mut state, Some(Action::Upsert), vec!["a".into(), "b".into()]);
        assert_eq!(triples[0].id, Some(DocumentId::Int(i64::MAX)));
        assert_eq!(triples[1].id, None);
        assert_eq!(state.autoid, Some(i64::MAX as u64 + 1));
    }
}
