//! Hierarchical byte-range annotations.
//!
//! A `RegionTree` describes which bytes of a `ByteSource` belong to which
//! logical item: a sequence header, a track, a single opcode. Nodes own
//! their children (a strict forest: no cycles, no shared children). A node
//! may be added with length 0 when its end is not yet known; `guess_length`
//! resolves those after the annotation pass.
//!
//! Point lookups return the deepest node containing an offset. Bytes inside
//! a node that none of its children cover form a *hole*: `find_at_offset`
//! deliberately returns `None` there instead of the parent.

/// Category of an annotated region, used by inspectors to colour spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Root,
    Header,
    Pointer,
    Track,
    Note,
    Rest,
    Tie,
    Volume,
    Pan,
    Tempo,
    TimeSignature,
    Program,
    Controller,
    PitchBend,
    Loop,
    Jump,
    Call,
    Transpose,
    Marker,
    Channel,
    Misc,
    EndOfTrack,
    Unknown,
}

impl RegionKind {
    /// Short lowercase name used in listings.
    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Root => "root",
            RegionKind::Header => "header",
            RegionKind::Pointer => "pointer",
            RegionKind::Track => "track",
            RegionKind::Note => "note",
            RegionKind::Rest => "rest",
            RegionKind::Tie => "tie",
            RegionKind::Volume => "volume",
            RegionKind::Pan => "pan",
            RegionKind::Tempo => "tempo",
            RegionKind::TimeSignature => "timesig",
            RegionKind::Program => "program",
            RegionKind::Controller => "control",
            RegionKind::PitchBend => "bend",
            RegionKind::Loop => "loop",
            RegionKind::Jump => "jump",
            RegionKind::Call => "call",
            RegionKind::Transpose => "transpose",
            RegionKind::Marker => "marker",
            RegionKind::Channel => "channel",
            RegionKind::Misc => "misc",
            RegionKind::EndOfTrack => "end",
            RegionKind::Unknown => "unknown",
        }
    }
}

/// One annotated span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionNode {
    pub offset: usize,
    /// Span length; 0 means unresolved until `RegionTree::guess_length`.
    pub length: usize,
    pub label: String,
    pub kind: RegionKind,
    pub children: Vec<RegionNode>,
}

impl RegionNode {
    pub fn new(offset: usize, length: usize, label: impl Into<String>, kind: RegionKind) -> Self {
        RegionNode {
            offset,
            length,
            label: label.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn is_resolved(&self) -> bool {
        self.length != 0
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset < self.end()
    }

    /// Append a child and return it for further nesting.
    pub fn add_child(
        &mut self,
        offset: usize,
        length: usize,
        label: impl Into<String>,
        kind: RegionKind,
    ) -> &mut RegionNode {
        self.children
            .push(RegionNode::new(offset, length, label, kind));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append an already built node.
    pub fn push(&mut self, node: RegionNode) {
        self.children.push(node);
    }

    /// Grow this node so it covers all of its (resolved) children.
    pub fn fit_to_children(&mut self) {
        let Some(start) = self.children.iter().map(|c| c.offset).min() else {
            return;
        };
        let end = self
            .children
            .iter()
            .map(|c| c.end())
            .max()
            .unwrap_or(start);
        let new_start = if self.is_resolved() {
            self.offset.min(start)
        } else {
            start
        };
        let new_end = if self.is_resolved() {
            self.end().max(end)
        } else {
            end
        };
        self.offset = new_start;
        self.length = new_end - new_start;
    }

    fn resolve_children(&mut self) {
        let parent_end = self.end();
        let n = self.children.len();
        for i in 0..n {
            if self.children[i].length == 0 {
                let start = self.children[i].offset;
                let limit = if i + 1 < n {
                    self.children[i + 1].offset
                } else {
                    parent_end
                };
                self.children[i].length = limit.saturating_sub(start);
            }
        }
        for child in &mut self.children {
            child.resolve_children();
        }
    }

    fn find(&self, offset: usize, include_containers: bool) -> Option<&RegionNode> {
        if !self.contains(offset) {
            return None;
        }
        if self.children.is_empty() {
            return Some(self);
        }
        for child in &self.children {
            if let Some(hit) = child.find(offset, include_containers) {
                return Some(hit);
            }
        }
        include_containers.then_some(self)
    }
}

/// A forest of `RegionNode`s under a single root spanning a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTree {
    pub root: RegionNode,
}

impl RegionTree {
    /// Create a tree whose root covers `[offset, offset + length)`.
    pub fn new(offset: usize, length: usize, label: impl Into<String>) -> Self {
        RegionTree {
            root: RegionNode::new(offset, length, label, RegionKind::Root),
        }
    }

    /// Add a top-level node. Always succeeds; `length == 0` is resolved later
    /// by `guess_length`.
    pub fn add_child(
        &mut self,
        offset: usize,
        length: usize,
        label: impl Into<String>,
        kind: RegionKind,
    ) -> &mut RegionNode {
        self.root.add_child(offset, length, label, kind)
    }

    /// Resolve every unresolved length: the next sibling's offset, or the
    /// parent's end for the last child. Parents are resolved before their
    /// children.
    pub fn guess_length(&mut self) {
        if self.root.length == 0 {
            self.root.fit_to_children();
        }
        self.root.resolve_children();
    }

    /// Deepest node containing `offset`, or `None` for a hole or an offset
    /// outside the root.
    ///
    /// Children are searched depth-first in insertion order; the first
    /// containing child wins.
    pub fn find_at_offset(&self, offset: usize) -> Option<&RegionNode> {
        self.root.find(offset, false)
    }

    /// Like `find_at_offset`, but returns the deepest containing node even
    /// when the offset falls in a hole.
    pub fn find_container_at_offset(&self, offset: usize) -> Option<&RegionNode> {
        self.root.find(offset, true)
    }

    /// Pre-order iterator yielding `(depth, node)`, the root at depth 0.
    pub fn iter(&self) -> RegionIter<'_> {
        RegionIter {
            stack: vec![(0, &self.root)],
        }
    }

    /// Number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

/// Pre-order walk over a `RegionTree`.
pub struct RegionIter<'a> {
    stack: Vec<(usize, &'a RegionNode)>,
}

impl<'a> Iterator for RegionIter<'a> {
    type Item = (usize, &'a RegionNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, node))
    }
}

impl<'a> IntoIterator for &'a RegionTree {
    type Item = (usize, &'a RegionNode);
    type IntoIter = RegionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
