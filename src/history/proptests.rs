//! Property-based tests for the history scrubber
//!
//! Invariants checked over arbitrary (including broken) histories:
//! - scrubbing is idempotent
//! - after scrubbing, surviving call ids and surviving response ids are
//!   the same set, with exactly one response per call
//! - an already-valid history passes through unchanged

use super::scrub_dangling_tool_calls;
use crate::llm::{ChatMessage, FunctionCall, ToolCall};
use proptest::prelude::*;
use std::collections::HashSet;

fn call(id: u8) -> ToolCall {
    ToolCall::Function {
        id: format!("call_{id}"),
        function: FunctionCall {
            name: "search".to_string(),
            arguments: "{\"queries\":[]}".to_string(),
        },
    }
}

/// Arbitrary message drawing tool-call ids from a small pool so calls and
/// responses collide often enough to exercise every scrub path.
fn arb_message() -> impl Strategy<Value = ChatMessage> {
    prop_oneof![
        "[a-z ]{0,20}".prop_map(ChatMessage::user),
        "[a-z ]{0,20}".prop_map(|text| ChatMessage::assistant(text, None)),
        ("[a-z ]{0,10}", proptest::collection::vec(0u8..6, 1..4)).prop_map(|(text, ids)| {
            ChatMessage::assistant(text, Some(ids.into_iter().map(call).collect()))
        }),
        (0u8..6).prop_map(|id| ChatMessage::tool(format!("call_{id}"), "result")),
    ]
}

fn arb_history() -> impl Strategy<Value = Vec<ChatMessage>> {
    proptest::collection::vec(arb_message(), 0..12)
}

/// History where every assistant tool call is immediately followed by its
/// responses, i.e. already valid.
fn arb_valid_history() -> impl Strategy<Value = Vec<ChatMessage>> {
    proptest::collection::vec(
        prop_oneof![
            "[a-z ]{0,20}".prop_map(|t| vec![ChatMessage::user(t)]),
            "[a-z ]{1,20}".prop_map(|t| vec![ChatMessage::assistant(t, None)]),
            proptest::collection::vec(0u8..200, 1..4).prop_map(|ids| {
                // Distinct ids within the turn, each answered in order.
                let unique: Vec<u8> = {
                    let mut seen = HashSet::new();
                    ids.into_iter().filter(|id| seen.insert(*id)).collect()
                };
                let mut turn =
                    vec![ChatMessage::assistant("", Some(unique.iter().copied().map(call).collect()))];
                for id in unique {
                    turn.push(ChatMessage::tool(format!("call_{id}"), "result"));
                }
                turn
            }),
        ],
        0..6,
    )
    .prop_map(|turns| turns.into_iter().flatten().collect())
}

fn surviving_call_ids(history: &[ChatMessage]) -> Vec<String> {
    history
        .iter()
        .filter_map(|m| match m {
            ChatMessage::Assistant {
                tool_calls: Some(calls),
                ..
            } => Some(calls.iter().map(|c| c.id().to_string()).collect::<Vec<_>>()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn surviving_response_ids(history: &[ChatMessage]) -> Vec<String> {
    history
        .iter()
        .filter_map(|m| match m {
            ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    #[test]
    fn scrub_is_idempotent(history in arb_history()) {
        let once = scrub_dangling_tool_calls(history);
        let twice = scrub_dangling_tool_calls(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn scrub_restores_pairing(history in arb_history()) {
        let scrubbed = scrub_dangling_tool_calls(history);

        let calls = surviving_call_ids(&scrubbed);
        let responses = surviving_response_ids(&scrubbed);

        let call_set: HashSet<&String> = calls.iter().collect();
        let response_set: HashSet<&String> = responses.iter().collect();
        prop_assert_eq!(&call_set, &response_set);

        // Exactly one response per surviving call.
        prop_assert_eq!(responses.len(), response_set.len());
    }

    #[test]
    fn scrub_never_invents_tool_call_fields(history in arb_history()) {
        // An emptied call list is unset, never left as Some(vec![]).
        let scrubbed = scrub_dangling_tool_calls(history);
        for message in &scrubbed {
            if let ChatMessage::Assistant { tool_calls: Some(calls), .. } = message {
                prop_assert!(!calls.is_empty());
            }
        }
    }

    #[test]
    fn valid_history_passes_through(history in arb_valid_history()) {
        let scrubbed = scrub_dangling_tool_calls(history.clone());
        prop_assert_eq!(scrubbed, history);
    }
}
