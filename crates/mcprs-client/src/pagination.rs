//! Lazy, re-querying pagination over any `*/list` method.
//!
//! [`paginate`] issues one request per page on demand rather than eagerly draining the
//! whole collection, so a caller that only needs the first few items never pays for
//! the rest. [`Client`](crate::Client)'s `list_*` methods build the materialized
//! `Vec<T>` on top of this by draining the stream to completion.

use std::collections::VecDeque;

use futures::Stream;
use mcprs_core::McpResult;
use mcprs_core::types::Cursor;
use mcprs_session::{RequestOptions, SessionHandle};
use serde_json::Value;

struct PaginateState<T, F> {
    session: SessionHandle,
    method: &'static str,
    extract: F,
    cursor: Option<Cursor>,
    buffer: VecDeque<T>,
    done: bool,
}

/// Stream one page at a time from `method`, using `extract` to pull the item list and
/// `nextCursor` out of each raw response. Ends once a response carries no cursor.
pub fn paginate<T, F>(
    session: SessionHandle,
    method: &'static str,
    extract: F,
) -> impl Stream<Item = McpResult<T>>
where
    T: Send + 'static,
    F: Fn(Value) -> McpResult<(Vec<T>, Option<Cursor>)> + Send + 'static,
{
    let state = PaginateState {
        session,
        method,
        extract,
        cursor: None,
        buffer: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Some((Ok(item), state));
            }
            if state.done {
                return None;
            }

            let params = state
                .cursor
                .as_ref()
                .map(|cursor| serde_json::json!({ "cursor": cursor }));
            let response = state
                .session
                .send_request(state.method, params, RequestOptions::default())
                .await;

            let raw = match response {
                Ok(raw) => raw,
                Err(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            };

            let (items, next_cursor) = match (state.extract)(raw) {
                Ok(pair) => pair,
                Err(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            };

            state.buffer.extend(items);
            state.done = next_cursor.is_none();
            state.cursor = next_cursor;

            if state.buffer.is_empty() && state.done {
                return None;
            }
        }
    })
}
