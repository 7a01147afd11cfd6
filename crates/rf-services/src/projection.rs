//! Annotates a loaded post tree with the viewing user's own votes.
//!
//! Response-shape only: nothing here touches persisted state.

use std::collections::HashMap;

use rf_core::models::{PostView, VoteType};
use uuid::Uuid;

/// Sets `current_user_vote` on `root` and every node of its loaded comment
/// tree from the viewer's vote map. Each node is visited exactly once.
///
/// Uses an explicit stack instead of recursion; comment chains can be
/// arbitrarily deep.
pub fn annotate(root: &mut PostView, votes: &HashMap<Uuid, VoteType>) {
    let mut stack: Vec<&mut PostView> = vec![root];
    while let Some(node) = stack.pop() {
        node.current_user_vote = votes.get(&node.id).copied();
        stack.extend(node.comments.iter_mut());
    }
}
