//! Property-based tests for the delta merger
//!
//! For any interleaving of deltas across distinct indices:
//! - the output order equals the order of first appearance of each index
//! - each call's arguments equal the exact in-order concatenation of that
//!   index's fragments
//! - id and name come from the first fragment that carries them

use super::merge_tool_deltas;
use crate::llm::{FunctionDelta, ToolCall, ToolCallDelta};
use proptest::prelude::*;
use std::collections::VecDeque;

/// Fragments of one tool call as the service would stream them: the first
/// delta carries id and name, every delta carries one argument fragment.
fn call_fragments(index: u32, id: String, name: String, args: Vec<String>) -> Vec<ToolCallDelta> {
    let mut deltas = Vec::new();
    for (i, fragment) in args.iter().enumerate() {
        deltas.push(ToolCallDelta {
            index,
            id: (i == 0).then(|| id.clone()),
            function: Some(FunctionDelta {
                name: (i == 0).then(|| name.clone()),
                arguments: Some(fragment.clone()),
            }),
        });
    }
    deltas
}

/// Merge per-call fragment queues into one arrival sequence, preserving each
/// queue's internal order. `picks` drives which queue yields next.
fn interleave(mut queues: Vec<VecDeque<ToolCallDelta>>, picks: &[usize]) -> Vec<ToolCallDelta> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while queues.iter().any(|q| !q.is_empty()) {
        let live: Vec<usize> = (0..queues.len()).filter(|&i| !queues[i].is_empty()).collect();
        let pick = picks.get(cursor).copied().unwrap_or(0) % live.len();
        cursor += 1;
        if let Some(delta) = queues[live[pick]].pop_front() {
            out.push(delta);
        }
    }
    out
}

fn arb_call() -> impl Strategy<Value = (String, String, Vec<String>)> {
    (
        "call_[a-z0-9]{6}",
        "[a-z_]{3,12}",
        proptest::collection::vec("[a-zA-Z0-9{}:,\\[\\]\" ]{0,12}", 1..6),
    )
}

proptest! {
    #[test]
    fn merge_preserves_first_appearance_order_and_concatenation(
        calls in proptest::collection::vec(arb_call(), 1..5),
        picks in proptest::collection::vec(0usize..16, 0..64),
    ) {
        let queues: Vec<VecDeque<ToolCallDelta>> = calls
            .iter()
            .enumerate()
            .map(|(i, (id, name, args))| {
                call_fragments(u32::try_from(i).unwrap(), id.clone(), name.clone(), args.clone())
                    .into()
            })
            .collect();

        let arrival = interleave(queues, &picks);

        // Expected index order: first appearance in the arrival sequence.
        let mut expected_order = Vec::new();
        for delta in &arrival {
            if !expected_order.contains(&delta.index) {
                expected_order.push(delta.index);
            }
        }

        let merged = merge_tool_deltas(&arrival).expect("non-empty input merges");
        prop_assert_eq!(merged.len(), calls.len());

        for (call, &index) in merged.iter().zip(expected_order.iter()) {
            let (id, name, args) = &calls[index as usize];
            let ToolCall::Function { id: got_id, function } = call else {
                panic!("merger emits function calls only");
            };
            prop_assert_eq!(got_id, id);
            prop_assert_eq!(&function.name, name);
            prop_assert_eq!(&function.arguments, &args.concat());
        }
    }
}
