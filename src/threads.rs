//! Thread reconstruction
//!
//! Turns the flat message list returned by the history fetcher into
//! conversation threads. A reply whose root was not fetched (it predates the
//! cutoff, or the reply points at an unknown id) ends up in a partial thread
//! grouped by the missing parent id.
//!
//! Reconstruction never fails and never drops a message: every input message
//! appears in exactly one output thread. Duplicate ids are kept as they are.

use crate::types::{Message, MessageThread};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Group messages into threads ordered by last activity
///
/// - Roots (no `reply_to_id`) seed full threads.
/// - Replies attach to the root they point at.
/// - Replies to roots outside the set form partial threads, one per parent id,
///   in first-seen order.
/// - Members of every thread are sorted by creation time; threads are sorted by
///   the creation time of their newest member. Both sorts are stable.
pub fn reconstruct(messages: Vec<Message>) -> Vec<MessageThread> {
    let (roots, replies): (Vec<Message>, Vec<Message>) =
        messages.into_iter().partition(Message::is_root);

    let mut full: Vec<Vec<Message>> = Vec::with_capacity(roots.len());
    let mut root_index: HashMap<String, usize> = HashMap::with_capacity(roots.len());
    for root in roots {
        // first root wins when ids repeat
        root_index.entry(root.id.clone()).or_insert(full.len());
        full.push(vec![root]);
    }

    let mut orphan_groups: Vec<Vec<Message>> = Vec::new();
    let mut orphan_index: HashMap<String, usize> = HashMap::new();
    for reply in replies {
        let parent = reply.reply_to_id.clone().unwrap_or_default();
        if let Some(&slot) = root_index.get(&parent) {
            full[slot].push(reply);
        } else {
            let slot = *orphan_index.entry(parent).or_insert_with(|| {
                orphan_groups.push(Vec::new());
                orphan_groups.len() - 1
            });
            orphan_groups[slot].push(reply);
        }
    }

    let partial_count = orphan_groups.len();
    let mut threads: Vec<MessageThread> = full
        .into_iter()
        .map(|members| into_thread(members, true))
        .chain(orphan_groups.into_iter().map(|members| into_thread(members, false)))
        .collect();
    threads.sort_by_key(|t| t.last_activity);

    tracing::debug!(
        threads = threads.len(),
        partial = partial_count,
        "Reconstructed threads"
    );
    threads
}

fn into_thread(mut messages: Vec<Message>, is_full: bool) -> MessageThread {
    messages.sort_by_key(|m| m.created_date_time);
    let last_activity = messages
        .last()
        .map(|m| m.created_date_time)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    MessageThread {
        is_full,
        messages,
        last_activity,
    }
}
