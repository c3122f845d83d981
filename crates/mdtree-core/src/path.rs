//! Tree addressing: paths, caret points and selections.
//!
//! A [`Path`] is the sequence of child indices from the document root to a node. Paths are
//! positional: any structural edit before or above a node changes its path, so command code
//! re-derives paths after every mutation (or goes through [`NodeId`](crate::node::NodeId)
//! when it has to remember a node across edits).

use std::cmp::Ordering;
use std::fmt;

/// Child-index path from the document root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Path(Vec<usize>);

impl Path {
    /// The root path (addresses the document itself).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path from indices.
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// The indices.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Depth of the addressed node (root = 0).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Path of the `index`-th child.
    pub fn child(&self, index: usize) -> Path {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Index of the addressed node within its parent.
    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Same parent, different index.
    pub fn with_last(&self, index: usize) -> Option<Path> {
        let mut indices = self.0.clone();
        *indices.last_mut()? = index;
        Some(Self(indices))
    }

    /// The next sibling's path (it may not exist in the tree).
    pub fn next_sibling(&self) -> Option<Path> {
        self.with_last(self.last_index()? + 1)
    }

    /// The previous sibling's path, `None` for a first child.
    pub fn prev_sibling(&self) -> Option<Path> {
        let last = self.last_index()?;
        self.with_last(last.checked_sub(1)?)
    }

    /// The first `depth` indices.
    pub fn truncated(&self, depth: usize) -> Path {
        Self(self.0[..depth.min(self.0.len())].to_vec())
    }

    /// Returns `true` if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Returns `true` if `self` equals `other` or is one of its ancestors.
    pub fn contains(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Deepest path that contains both `self` and `other`.
    pub fn common_ancestor(&self, other: &Path) -> Path {
        let shared = self
            .0
            .iter()
            .zip(&other.0)
            .take_while(|(a, b)| a == b)
            .count();
        self.truncated(shared)
    }

    /// Where `self` ends up after the node at `removed` is taken out of the tree.
    ///
    /// Returns `None` when `self` is `removed` or lies inside it.
    pub fn transform_after_remove(&self, removed: &Path) -> Option<Path> {
        if removed.contains(self) {
            return None;
        }
        let depth = removed.len() - 1;
        let mut indices = self.0.clone();
        if indices.len() > depth
            && indices[..depth] == removed.0[..depth]
            && indices[depth] > removed.0[depth]
        {
            indices[depth] -= 1;
        }
        Some(Self(indices))
    }

    /// Where `self` ends up after a node is inserted at `inserted`.
    pub fn transform_after_insert(&self, inserted: &Path) -> Path {
        let Some(depth) = inserted.len().checked_sub(1) else {
            return self.clone();
        };
        let mut indices = self.0.clone();
        if indices.len() > depth
            && indices[..depth] == inserted.0[..depth]
            && indices[depth] >= inserted.0[depth]
        {
            indices[depth] += 1;
        }
        Self(indices)
    }
}

impl<const N: usize> From<[usize; N]> for Path {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl From<Vec<usize>> for Path {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl From<&[usize]> for Path {
    fn from(indices: &[usize]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{index}")?;
        }
        write!(f, "]")
    }
}

/// A caret position: a text block and a char offset into its inline content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    /// Path to a text block.
    pub path: Path,
    /// Caret offset; inline voids count as one.
    pub offset: usize,
}

impl Point {
    /// Create a point.
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }
}

impl Ord for Point {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An anchor/focus selection; collapsed when both ends are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Where the selection started.
    pub anchor: Point,
    /// Where the caret is.
    pub focus: Point,
}

impl Selection {
    /// A collapsed selection (caret).
    pub fn caret(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    /// A selection between two points.
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// Returns `true` when anchor and focus coincide.
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `(start, end)` in document order.
    pub fn ordered(&self) -> (&Point, &Point) {
        if self.anchor <= self.focus {
            (&self.anchor, &self.focus)
        } else {
            (&self.focus, &self.anchor)
        }
    }

    /// Start point in document order.
    pub fn start(&self) -> &Point {
        self.ordered().0
    }

    /// End point in document order.
    pub fn end(&self) -> &Point {
        self.ordered().1
    }
}
