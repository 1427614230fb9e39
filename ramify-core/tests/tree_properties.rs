//! Structural properties of the tree builder over generated forests.

use std::collections::HashMap;

use proptest::prelude::*;
use proptest::sample::Index;
use ramify_core::{ConversationTree, Message, RecordId, Timestamp};

#[derive(Debug, Clone)]
enum Link {
    Root,
    Earlier(Index),
    Dangling,
}

fn link() -> impl Strategy<Value = Link> {
    prop_oneof![
        1 => Just(Link::Root),
        4 => any::<Index>().prop_map(Link::Earlier),
        1 => Just(Link::Dangling),
    ]
}

/// Builds an acyclic collection: a message may only point at an earlier one
/// or at an id that is never allocated.
fn forest(spec: &[(Link, u64)]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(spec.len());
    for (i, (link, at)) in spec.iter().enumerate() {
        let id = RecordId::new(i as u64 + 1);
        let parent_id = match link {
            Link::Root => None,
            Link::Earlier(_) if out.is_empty() => None,
            Link::Earlier(ix) => Some(out[ix.index(out.len())].id),
            Link::Dangling => Some(RecordId::new(10_000 + i as u64)),
        };
        out.push(Message {
            id,
            content: format!("m{i}"),
            parent_id,
            current_version: 1,
            created_at: Timestamp::from_millis(*at),
        });
    }
    out
}

proptest! {
    #[test]
    fn every_message_appears_exactly_once(spec in prop::collection::vec((link(), 0u64..4), 0..60)) {
        let messages = forest(&spec);
        let tree = ConversationTree::build(messages.clone());
        let flat = tree.flatten().unwrap();

        prop_assert_eq!(flat.len(), messages.len());
        let mut seen: HashMap<RecordId, usize> = HashMap::new();
        for node in &flat {
            *seen.entry(node.message.id).or_default() += 1;
        }
        prop_assert!(seen.values().all(|&n| n == 1));
        prop_assert_eq!(seen.len(), messages.len());
    }

    #[test]
    fn roots_are_exactly_parentless_or_orphaned(spec in prop::collection::vec((link(), 0u64..4), 0..60)) {
        let messages = forest(&spec);
        let tree = ConversationTree::build(messages.clone());

        let mut expected: Vec<&Message> = messages
            .iter()
            .filter(|m| m.parent_id.is_none_or(|p| tree.get(p).is_none()))
            .collect();
        expected.sort_by_key(|m| (m.created_at, m.id));

        let roots: Vec<RecordId> = tree.roots().map(|m| m.id).collect();
        let expected: Vec<RecordId> = expected.iter().map(|m| m.id).collect();
        prop_assert_eq!(roots, expected);
    }

    #[test]
    fn children_sorted_and_depths_consistent(spec in prop::collection::vec((link(), 0u64..4), 0..60)) {
        let messages = forest(&spec);
        let tree = ConversationTree::build(messages.clone());

        for m in &messages {
            let keys: Vec<(Timestamp, RecordId)> =
                tree.children(m.id).map(|c| (c.created_at, c.id)).collect();
            let mut sorted = keys.clone();
            sorted.sort();
            prop_assert_eq!(&keys, &sorted);
            prop_assert!(tree.children(m.id).all(|c| c.parent_id == Some(m.id)));
        }

        let flat = tree.flatten().unwrap();
        let depth: HashMap<RecordId, usize> =
            flat.iter().map(|n| (n.message.id, n.depth)).collect();
        for node in &flat {
            match node.message.parent_id.filter(|p| tree.get(*p).is_some()) {
                Some(parent) => {
                    prop_assert_eq!(node.depth, depth[&parent] + 1);
                }
                None => {
                    prop_assert_eq!(node.depth, 0);
                }
            }
        }
    }
}
