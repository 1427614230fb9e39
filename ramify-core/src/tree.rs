//! Conversation tree reconstruction from a flat message collection.
//!
//! Messages are kept in an arena indexed by id with a separate children index,
//! so the tree never owns itself recursively. Traversals use an explicit stack
//! and a visited set, which turns a corrupt parent cycle into
//! [`TreeError::CycleDetected`] instead of a hang.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use crate::id::MessageId;
use crate::record::Message;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("cycle detected in parent links at message {0}")]
    CycleDetected(MessageId),
}

/// A message positioned for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatNode<'a> {
    /// 0 for roots.
    pub depth: usize,
    pub message: &'a Message,
}

/// Parent/children structure over one read of the message collection.
#[derive(Debug, Clone, Default)]
pub struct ConversationTree {
    nodes: IndexMap<MessageId, Message>,
    children: HashMap<MessageId, Vec<MessageId>>,
    roots: Vec<MessageId>,
}

impl ConversationTree {
    /// Builds the tree.
    ///
    /// Children and roots are ordered by `created_at`, ties broken by id.
    /// A message whose parent is not in the collection is surfaced as a root.
    /// If an id occurs more than once, the last occurrence wins.
    pub fn build(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut nodes: IndexMap<MessageId, Message> = IndexMap::new();
        for message in messages {
            nodes.insert(message.id, message);
        }

        let mut children: HashMap<MessageId, Vec<MessageId>> = HashMap::new();
        let mut roots = Vec::new();
        for message in nodes.values() {
            match message.parent_id {
                Some(parent) if nodes.contains_key(&parent) => {
                    children.entry(parent).or_default().push(message.id);
                }
                _ => roots.push(message.id),
            }
        }

        let order_key = |id: &MessageId| nodes.get(id).map(|m| (m.created_at, m.id));
        roots.sort_by_key(order_key);
        for list in children.values_mut() {
            list.sort_by_key(order_key);
        }

        ConversationTree {
            nodes,
            children,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.nodes.get(&id)
    }

    /// All messages in read order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.nodes.values()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Message> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn root_ids(&self) -> &[MessageId] {
        &self.roots
    }

    pub fn child_ids(&self, id: MessageId) -> &[MessageId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, id: MessageId) -> impl Iterator<Item = &Message> {
        self.child_ids(id).iter().filter_map(|c| self.nodes.get(c))
    }

    /// True if the message declares a parent that is not in this tree.
    pub fn is_orphan(&self, id: MessageId) -> bool {
        self.nodes
            .get(&id)
            .and_then(|m| m.parent_id)
            .is_some_and(|parent| !self.nodes.contains_key(&parent))
    }

    /// Pre-order walk from every root, children in order.
    ///
    /// Every message appears exactly once. Messages unreachable from any root
    /// can only sit on a parent cycle, which is reported as an error.
    pub fn flatten(&self) -> Result<Vec<FlatNode<'_>>, TreeError> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut seen: HashSet<MessageId> = HashSet::with_capacity(self.nodes.len());
        let mut stack: Vec<(MessageId, usize)> =
            self.roots.iter().rev().map(|id| (*id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            if !seen.insert(id) {
                return Err(TreeError::CycleDetected(id));
            }
            let Some(message) = self.nodes.get(&id) else {
                continue;
            };
            out.push(FlatNode { depth, message });
            stack.extend(self.child_ids(id).iter().rev().map(|c| (*c, depth + 1)));
        }

        if let Some(stuck) = self.nodes.keys().filter(|id| !seen.contains(*id)).min() {
            return Err(TreeError::CycleDetected(*stuck));
        }
        Ok(out)
    }

    /// The path from the top of the thread down to `id`, inclusive.
    ///
    /// The walk stops at a root or at an orphan whose parent is missing.
    /// Returns `Ok(None)` if `id` is not in the tree.
    pub fn thread(&self, id: MessageId) -> Result<Option<Vec<&Message>>, TreeError> {
        let Some(mut current) = self.nodes.get(&id) else {
            return Ok(None);
        };
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        loop {
            if !seen.insert(current.id) {
                return Err(TreeError::CycleDetected(current.id));
            }
            path.push(current);
            match current.parent_id.and_then(|p| self.nodes.get(&p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        Ok(Some(path))
    }
}
