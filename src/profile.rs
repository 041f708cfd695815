//! Accumulation of tick samples into per-entry statistics and a
//! bottom-up call tree.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::codemap::Category;


/// The high-level activity the runtime was performing at sample time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VmState {
    /// Executing managed code.
    Js,
    /// Garbage collecting.
    Gc,
    /// Compiling.
    Compiler,
    /// Doing something else inside the runtime.
    Other,
    /// Running native, external code.
    External,
    /// Idling.
    Idle,
}

impl VmState {
    /// All states, in tag order.
    pub const ALL: [Self; 6] = [
        Self::Js,
        Self::Gc,
        Self::Compiler,
        Self::Other,
        Self::External,
        Self::Idle,
    ];

    /// Map a log record's numeric state tag to a state. Tags this
    /// version does not know about classify as [`VmState::Other`].
    pub fn from_tag(tag: u64) -> Self {
        match tag {
            0 => Self::Js,
            1 => Self::Gc,
            2 => Self::Compiler,
            4 => Self::External,
            5 => Self::Idle,
            _ => Self::Other,
        }
    }

    /// The state's position in [`VmState::ALL`].
    pub(crate) fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|state| *state == self)
            .unwrap_or_default()
    }

    /// The label the state is reported under.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Js => "JS",
            Self::Gc => "GC",
            Self::Compiler => "COMPILER",
            Self::Other => "OTHER",
            Self::External => "EXTERNAL",
            Self::Idle => "IDLE",
        }
    }
}


/// The report section an entry is attributed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Section {
    /// Managed code of any category.
    JavaScript,
    /// A named native symbol.
    Cpp,
    /// A library as a whole, for addresses inside a library's window
    /// that no named symbol covers.
    SharedLibrary,
    /// The synthetic entry unresolved innermost frames attribute to.
    Unknown,
}


/// One frame of a tick sample, resolved to a display name.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedFrame {
    pub name: String,
    pub section: Section,
    /// The code category, absent for the synthetic unknown entry.
    pub category: Option<Category>,
}


/// Accumulated per-entry tick counts.
#[derive(Clone, Debug, Default)]
pub(crate) struct EntryStats {
    pub section: Option<Section>,
    /// Ticks with this entry innermost on the stack.
    pub self_ticks: u64,
    /// Samples in which this entry appeared anywhere on the stack,
    /// counted once per sample.
    pub total_ticks: u64,
}


/// A node of the bottom-up call tree. Children represent callers.
#[derive(Debug)]
pub(crate) struct CallNode {
    pub name: String,
    pub self_ticks: u64,
    pub total_ticks: u64,
    children: BTreeMap<String, usize>,
}

impl CallNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            self_ticks: 0,
            total_ticks: 0,
            children: BTreeMap::new(),
        }
    }
}


/// The bottom-up call tree over all samples.
///
/// Nodes live in an arena indexed by position; the per-node child maps
/// and the root map only store indices.
#[derive(Debug, Default)]
pub(crate) struct CallTree {
    nodes: Vec<CallNode>,
    roots: BTreeMap<String, usize>,
}

impl CallTree {
    fn intern_root(&mut self, name: &str) -> usize {
        if let Some(id) = self.roots.get(name) {
            return *id
        }
        let id = self.nodes.len();
        let () = self.nodes.push(CallNode::new(name));
        let _prev = self.roots.insert(name.to_string(), id);
        id
    }

    fn intern_child(&mut self, parent: usize, name: &str) -> usize {
        if let Some(id) = self.nodes[parent].children.get(name) {
            return *id
        }
        let id = self.nodes.len();
        let () = self.nodes.push(CallNode::new(name));
        let _prev = self.nodes[parent].children.insert(name.to_string(), id);
        id
    }

    /// Record one sample's resolved stack, innermost first.
    ///
    /// Every distinct name on the stack contributes a root increment
    /// (so a root's total equals the number of samples the name
    /// appeared in), with the frames above it recorded as its caller
    /// chain.
    fn record(&mut self, frames: &[ResolvedFrame]) {
        for idx in 0..frames.len() {
            let name = frames[idx].name.as_str();
            if frames[..idx].iter().any(|prior| prior.name == name) {
                continue
            }

            let root = self.intern_root(name);
            self.nodes[root].total_ticks += 1;
            if idx == 0 {
                self.nodes[root].self_ticks += 1;
            }

            let mut node = root;
            for caller in &frames[idx + 1..] {
                node = self.intern_child(node, &caller.name);
                self.nodes[node].total_ticks += 1;
            }
        }
    }

    /// Iterate over the tree's roots in name order.
    pub fn roots(&self) -> impl Iterator<Item = &CallNode> + '_ {
        self.roots.values().map(|id| &self.nodes[*id])
    }

    /// Iterate over a node's callers in name order.
    pub fn callers<'tree>(
        &'tree self,
        node: &'tree CallNode,
    ) -> impl Iterator<Item = &'tree CallNode> + 'tree {
        node.children.values().map(|id| &self.nodes[*id])
    }
}


/// The statistics aggregator consuming resolved tick samples.
#[derive(Debug, Default)]
pub(crate) struct Profile {
    entries: HashMap<String, EntryStats>,
    tree: CallTree,
    state_ticks: [u64; VmState::ALL.len()],
    category_ticks: [u64; Category::ALL.len()],
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick sample with its resolved stack, innermost
    /// first. The stack must not be empty.
    pub fn record_sample(&mut self, frames: &[ResolvedFrame], state: VmState) {
        self.state_ticks[state.index()] += 1;

        let Some(innermost) = frames.first() else {
            return
        };

        for (idx, frame) in frames.iter().enumerate() {
            // A name recurring within one sample counts once.
            if frames[..idx].iter().any(|prior| prior.name == frame.name) {
                continue
            }
            let stats = self.entries.entry(frame.name.clone()).or_default();
            stats.section = stats.section.or(Some(frame.section));
            stats.total_ticks += 1;
        }

        if let Some(stats) = self.entries.get_mut(&innermost.name) {
            stats.self_ticks += 1;
        }
        if let Some(category) = innermost.category {
            self.category_ticks[category.index()] += 1;
        }

        let () = self.tree.record(frames);
    }

    /// Iterate over all entries and their statistics.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &EntryStats)> + '_ {
        self.entries.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    /// The number of ticks recorded per VM state.
    pub fn state_ticks(&self, state: VmState) -> u64 {
        self.state_ticks[state.index()]
    }

    /// The number of self ticks attributed per code category.
    pub fn category_ticks(&self, category: Category) -> u64 {
        self.category_ticks[category.index()]
    }

    /// The bottom-up call tree.
    pub fn tree(&self) -> &CallTree {
        &self.tree
    }
}
