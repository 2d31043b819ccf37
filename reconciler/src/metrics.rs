use crate::records::{Aggregate, CodeBlockEntry, Direction, Message, Session};
use crate::types::IoCount;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub usage_amount: u64,
    pub tokens: IoCount,
    pub chat_count: IoCount,
    pub proposed_code_count: u64,
    pub accepted_code_count: u64,
    /// Accepted over proposed, `0.0` when nothing was proposed.
    pub adoption_rate: f64,
}

impl MetricsSummary {
    pub fn from_aggregate(aggregate: &Aggregate) -> Self {
        compute_metrics(
            &aggregate.sessions,
            &aggregate.messages,
            &aggregate.ledger_entries(),
        )
    }
}

/// Messages whose direction tag is neither input nor output still add their
/// tokens but count toward neither chat counter.
pub fn compute_metrics(
    sessions: &[Session],
    messages: &[Message],
    ledger: &[&CodeBlockEntry],
) -> MetricsSummary {
    let usage_amount = sessions.iter().map(|s| s.usage_amount).sum();

    let mut tokens = IoCount::default();
    let mut chat_count = IoCount::default();
    for message in messages {
        tokens.input += message.tokens.input;
        tokens.output += message.tokens.output;
        match message.direction {
            Direction::Input => chat_count.input += 1,
            Direction::Output => chat_count.output += 1,
            Direction::Other(_) => {}
        }
    }

    let proposed_code_count = ledger.len() as u64;
    let accepted_code_count = ledger.iter().filter(|e| e.is_accepted()).count() as u64;

    MetricsSummary {
        usage_amount,
        tokens,
        chat_count,
        proposed_code_count,
        accepted_code_count,
        adoption_rate: adoption_rate(accepted_code_count, proposed_code_count),
    }
}

pub fn adoption_rate(accepted: u64, proposed: u64) -> f64 {
    if proposed == 0 {
        return 0.0;
    }
    accepted as f64 / proposed as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::tests::MemoryStore;
    use crate::records::{aggregate, bubble_key, composer_key};
    use serde_json::json;

    fn session(id: &str, usage: u64, statuses: &[&str]) -> Session {
        Session {
            id: id.to_string(),
            usage_amount: usage,
            headers: Vec::new(),
            ledger: statuses
                .iter()
                .map(|s| CodeBlockEntry {
                    status: Some(s.to_string()),
                })
                .collect(),
        }
    }

    fn message(direction: Direction, input: u64, output: u64) -> Message {
        Message {
            session_id: "s".to_string(),
            message_id: "m".to_string(),
            direction,
            text: String::new(),
            tokens: IoCount { input, output },
            code: Vec::new(),
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let summary = compute_metrics(&[], &[], &[]);
        assert_eq!(summary, MetricsSummary::default());
        assert_eq!(summary.adoption_rate, 0.0);
        assert!(!summary.adoption_rate.is_nan());
    }

    #[test]
    fn two_sessions_sum_usage_and_ledger() {
        let sessions = vec![
            session("a", 3, &["accepted", "rejected"]),
            session("b", 5, &[]),
        ];
        let ledger: Vec<&CodeBlockEntry> =
            sessions.iter().flat_map(|s| s.ledger.iter()).collect();

        let summary = compute_metrics(&sessions, &[], &ledger);
        assert_eq!(summary.usage_amount, 8);
        assert_eq!(summary.proposed_code_count, 2);
        assert_eq!(summary.accepted_code_count, 1);
        assert_eq!(summary.adoption_rate, 0.5);
    }

    #[test]
    fn unknown_direction_is_counted_in_neither_bucket() {
        let messages = vec![
            message(Direction::Input, 10, 0),
            message(Direction::Output, 0, 20),
            message(Direction::Other(3), 1, 1),
        ];
        let summary = compute_metrics(&[], &messages, &[]);

        assert_eq!(summary.chat_count, IoCount { input: 1, output: 1 });
        assert!(summary.chat_count.input + summary.chat_count.output < messages.len() as u64);
        assert_eq!(summary.tokens, IoCount { input: 11, output: 21 });
    }

    #[test]
    fn adoption_rate_stays_in_unit_interval() {
        for proposed in 0..6u64 {
            for accepted in 0..=proposed {
                let rate = adoption_rate(accepted, proposed);
                assert!((0.0..=1.0).contains(&rate), "{accepted}/{proposed} -> {rate}");
            }
        }
        assert_eq!(adoption_rate(4, 4), 1.0);
    }

    #[test]
    fn order_of_inputs_does_not_matter() {
        let a = session("a", 1, &["accepted"]);
        let b = session("b", 2, &["rejected", "accepted"]);
        let forward = [a.clone(), b.clone()];
        let backward = [b, a];
        let ledger_f: Vec<&CodeBlockEntry> =
            forward.iter().flat_map(|s| s.ledger.iter()).collect();
        let ledger_b: Vec<&CodeBlockEntry> =
            backward.iter().flat_map(|s| s.ledger.iter()).collect();

        assert_eq!(
            compute_metrics(&forward, &[], &ledger_f),
            compute_metrics(&backward, &[], &ledger_b)
        );
    }

    #[test]
    fn aggregating_twice_yields_identical_summaries() {
        let mut store = MemoryStore::default();
        store.put(
            composer_key("a"),
            json!({
                "usageData": {"gpt-4": {"amount": 3}},
                "fullConversationHeadersOnly": [{"bubbleId": "m1"}, {"bubbleId": "m2"}],
                "codeBlockData": {"file:///x": [{"status": "accepted"}, {"status": "rejected"}]}
            }),
        );
        store.put(
            bubble_key("a", "m1"),
            json!({"type": 1, "text": "q", "tokenCount": {"inputTokens": 7, "outputTokens": 0}}),
        );
        store.put(
            bubble_key("a", "m2"),
            json!({"type": 2, "text": "a", "tokenCount": {"inputTokens": 0, "outputTokens": 9}}),
        );
        let ids = vec!["a".to_string()];

        let first = MetricsSummary::from_aggregate(&aggregate(&store, &ids).unwrap());
        let second = MetricsSummary::from_aggregate(&aggregate(&store, &ids).unwrap());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.tokens, IoCount { input: 7, output: 9 });
        assert_eq!(first.chat_count, IoCount { input: 1, output: 1 });
        assert_eq!(first.adoption_rate, 0.5);
    }
}
