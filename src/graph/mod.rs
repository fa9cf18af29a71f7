use crate::transcript::{Entry, Transcript};

// ===================================================================
// ConversationGraph: index-based forest over a parsed transcript
// ===================================================================

/// One row of the flattened tree: an index into the transcript's entries
/// and its depth below the root it was reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatNode {
    pub index: usize,
    pub depth: usize,
}

/// Parent/child links resolved from `parentId` references.
///
/// Entries whose `parentId` is absent or names no entry in the transcript
/// are roots. All links are indices into `Transcript::entries()`, so
/// dangling or cyclic references never need special ownership handling.
pub struct ConversationGraph<'a> {
    transcript: &'a Transcript,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl<'a> ConversationGraph<'a> {
    pub fn build(transcript: &'a Transcript) -> Self {
        let n = transcript.len();
        let mut parent = vec![None; n];
        let mut children = vec![Vec::new(); n];
        let mut roots = Vec::new();

        for (i, entry) in transcript.entries().iter().enumerate() {
            let resolved = entry
                .parent_id
                .as_deref()
                .and_then(|p| transcript.index_of(p));
            match resolved {
                Some(p) => {
                    parent[i] = Some(p);
                    children[p].push(i);
                }
                None => roots.push(i),
            }
        }

        Self {
            transcript,
            parent,
            children,
            roots,
        }
    }

    pub fn transcript(&self) -> &'a Transcript {
        self.transcript
    }

    pub fn entry(&self, index: usize) -> &'a Entry {
        &self.transcript.entries()[index]
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Indices of entries whose parent is absent or unresolved, in line order.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// True when more than one entry hangs off `index`.
    pub fn is_branch_point(&self, index: usize) -> bool {
        self.children[index].len() > 1
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    /// Depth-first, pre-order walk of the forest. Siblings keep line order.
    ///
    /// Every entry appears exactly once. Entries only reachable through a
    /// `parentId` cycle are emitted after the real roots, each unvisited one
    /// starting a new depth-0 subtree in line order.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let n = self.len();
        let mut out = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        let mut stack: Vec<FlatNode> = Vec::new();

        let seeds = self.roots.iter().copied().chain(0..n);
        for seed in seeds {
            if visited[seed] {
                continue;
            }
            stack.push(FlatNode {
                index: seed,
                depth: 0,
            });
            while let Some(node) = stack.pop() {
                if visited[node.index] {
                    continue;
                }
                visited[node.index] = true;
                out.push(node);
                for &child in self.children[node.index].iter().rev() {
                    if !visited[child] {
                        stack.push(FlatNode {
                            index: child,
                            depth: node.depth + 1,
                        });
                    }
                }
            }
        }

        out
    }

    /// Ids from `leaf_id` up to its root, leaf first. Only ids that resolve
    /// to entries are included; the walk stops after `len()` steps or on the
    /// first revisited entry.
    pub fn active_path(&self, leaf_id: &str) -> Vec<&'a str> {
        let mut path = Vec::new();
        let mut visited = vec![false; self.len()];
        let mut current = self.transcript.index_of(leaf_id);

        while let Some(i) = current {
            if visited[i] || path.len() >= self.len() {
                break;
            }
            visited[i] = true;
            path.push(self.entry(i).id.as_str());
            current = self.parent[i];
        }

        path
    }

    /// The entry to select when `index` is clicked.
    ///
    /// A message selects itself. Anything else selects its most recent
    /// direct child message by timestamp string, or itself when no child
    /// is newer than it. Only one level is inspected: a message two levels
    /// down is never returned.
    pub fn newest_leaf_index(&self, index: usize) -> usize {
        let entry = self.entry(index);
        if entry.is_message() {
            return index;
        }

        let mut newest = index;
        let mut newest_time = entry.timestamp.as_deref().unwrap_or("");
        for &child in &self.children[index] {
            let candidate = self.entry(child);
            if !candidate.is_message() {
                continue;
            }
            if let Some(ts) = candidate.timestamp.as_deref() {
                if ts > newest_time {
                    newest = child;
                    newest_time = ts;
                }
            }
        }
        newest
    }

    /// Id-based form of [`newest_leaf_index`](Self::newest_leaf_index).
    /// An unknown id is returned unchanged.
    pub fn newest_leaf<'s>(&'s self, id: &'s str) -> &'s str {
        match self.transcript.index_of(id) {
            Some(index) => &self.entry(self.newest_leaf_index(index)).id,
            None => id,
        }
    }
}
