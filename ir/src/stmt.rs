//! Statements and the order-preserving statement list.
//!
//! Statements carry explicit dependency edges on other statements of the same
//! block. Dependencies and insertion cursors are expressed as [`StmtId`]s:
//! stable typed handles into a [`StmtList`], an append-only slot arena
//! threaded with intrusive prev/next links. Ids survive arbitrary insertion,
//! which the scheduler's reverse scan relies on.

use std::fmt;

use crate::block::Block;

/// Stable handle to a statement within one [`StmtList`].
///
/// Ids are scoped to their list; a sub-block's statements have their own id
/// space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(u32);

impl StmtId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// An insertion cursor: insert before the named statement, or at the end.
pub type Pos = Option<StmtId>;

/// The statement variants of a block body.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Read a refinement into a named value.
    Load { from: String, into: String },
    /// Write a named value to a refinement.
    Store { from: String, into: String },
    /// Define a named integer constant.
    Constant { name: String, value: i64 },
    /// An opaque operation reading and writing whole refinements.
    Special { name: String, inputs: Vec<String>, outputs: Vec<String> },
    /// A scalar operation over named values; touches no refinements.
    Intrinsic { name: String, inputs: Vec<String>, outputs: Vec<String> },
    /// A nested sub-block.
    Block(Block),
}

impl StmtKind {
    /// Refinement names this statement reads, from the enclosing block's
    /// perspective.
    pub fn buffer_reads(&self) -> Vec<&str> {
        match self {
            Self::Load { from, .. } => vec![from.as_str()],
            Self::Special { inputs, .. } => inputs.iter().map(String::as_str).collect(),
            Self::Block(block) => {
                block.refs.iter().filter(|r| r.dir.is_read()).map(|r| r.from.as_str()).collect()
            }
            Self::Store { .. } | Self::Constant { .. } | Self::Intrinsic { .. } => vec![],
        }
    }

    /// Refinement names this statement writes, from the enclosing block's
    /// perspective.
    pub fn buffer_writes(&self) -> Vec<&str> {
        match self {
            Self::Store { into, .. } => vec![into.as_str()],
            Self::Special { outputs, .. } => outputs.iter().map(String::as_str).collect(),
            Self::Block(block) => {
                block.refs.iter().filter(|r| r.dir.is_write()).map(|r| r.from.as_str()).collect()
            }
            Self::Load { .. } | Self::Constant { .. } | Self::Intrinsic { .. } => vec![],
        }
    }
}

/// One statement plus its dependency edges.
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StmtKind,
    pub deps: Vec<StmtId>,
}

impl Statement {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, deps: Vec::new() }
    }
}

impl From<StmtKind> for Statement {
    fn from(kind: StmtKind) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    stmt: Statement,
    prev: Option<u32>,
    next: Option<u32>,
}

/// Ordered statement storage with stable ids.
///
/// Slots are never reused or moved; order lives in the prev/next links, so
/// insertion anywhere is O(1) and never invalidates an id.
#[derive(Debug, Clone, Default)]
pub struct StmtList {
    slots: Vec<Slot>,
    head: Option<u32>,
    tail: Option<u32>,
}

impl StmtList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: StmtId) -> &Statement {
        &self.slots[id.index()].stmt
    }

    pub fn get_mut(&mut self, id: StmtId) -> &mut Statement {
        &mut self.slots[id.index()].stmt
    }

    pub fn first(&self) -> Option<StmtId> {
        self.head.map(StmtId)
    }

    pub fn last(&self) -> Option<StmtId> {
        self.tail.map(StmtId)
    }

    pub fn next(&self, id: StmtId) -> Option<StmtId> {
        self.slots[id.index()].next.map(StmtId)
    }

    pub fn prev(&self, id: StmtId) -> Option<StmtId> {
        self.slots[id.index()].prev.map(StmtId)
    }

    /// Append at the end.
    pub fn push_back(&mut self, stmt: impl Into<Statement>) -> StmtId {
        self.insert_before(None, stmt)
    }

    /// Insert before `pos` (`None` inserts at the end). Returns the new
    /// statement's id.
    pub fn insert_before(&mut self, pos: Pos, stmt: impl Into<Statement>) -> StmtId {
        let new = self.slots.len() as u32;
        let (prev, next) = match pos {
            Some(at) => {
                let at = at.index() as u32;
                (self.slots[at as usize].prev, Some(at))
            }
            None => (self.tail, None),
        };
        self.slots.push(Slot { stmt: stmt.into(), prev, next });
        match prev {
            Some(p) => self.slots[p as usize].next = Some(new),
            None => self.head = Some(new),
        }
        match next {
            Some(n) => self.slots[n as usize].prev = Some(new),
            None => self.tail = Some(new),
        }
        StmtId(new)
    }

    /// Ids in statement order.
    pub fn ids(&self) -> impl Iterator<Item = StmtId> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.slots[id as usize].next;
            Some(StmtId(id))
        })
    }

    /// Statements with their ids, in order.
    pub fn iter(&self) -> impl Iterator<Item = (StmtId, &Statement)> {
        self.ids().map(|id| (id, self.get(id)))
    }

    /// Ordinal position of `id` in the current order.
    pub fn position(&self, id: StmtId) -> Option<usize> {
        self.ids().position(|other| other == id)
    }
}
