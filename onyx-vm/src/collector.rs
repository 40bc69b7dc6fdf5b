//! 递归引用集（RSet）循环收集器。
//!
//! 当一个对象失去一个引用但计数没有归零、且它的成员可能引用其他对象时，
//! 从该对象出发做一次广度优先扫描，得到它可达的对象图，然后：
//!
//! 1. 统计图内部每个对象被其他图内对象引用的次数（内部引用）
//! 2. 普通引用数大于内部引用数（存在外部持有者）、存在真实引用（方法调用进行中）
//!    或者状态不是 `Ok` 的对象是"活"的；从活对象可达的对象也是活的
//! 3. 若起点不是活的，所有不活的对象构成一个没有外部持有者的递归引用集，整体销毁
//!
//! 哈希、列表和闭包通过 `Arc` 共享（写时复制）。只有一个持有者的容器直接视为其
//! 持有者的一部分；被多个 `Arc` 持有的容器作为图中的独立节点，`Arc` 强引用数
//! 大于图内持有次数时它被外部持有，从它可达的对象都是活的。
//!
//! 扫描期间持有进程范围的 `RSECTION` 锁。每个对象都有一个代数计数器，任何引用或成员
//! 的变化都会使其递增；提交销毁前重新校验代数，若快照已过时则重新扫描，
//! 重试次数受 [`crate::config::rset_max_retries`] 限制。

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace, warn};
use rustc_hash::FxHashMap;

use crate::{
    config,
    exception::{ExceptionSink, OnyxException},
    types::object::{ObjectHandle, OnyxObject},
};

/// One outgoing reference found while tracing a value.
pub(crate) enum TraceEdge {
    Object(ObjectHandle),
    /// A container with more than one `Arc` holder.
    Shared {
        addr: usize,
        holders: usize,
        edges: Vec<TraceEdge>,
    },
}

/// Values that can hold object references report them for cycle scans.
pub(crate) trait Traceable {
    fn collect(&self, edges: &mut Vec<TraceEdge>);
}

/// Traces a container behind an `Arc`. A uniquely held container is inlined
/// into its holder.
pub(crate) fn trace_arc<T: Traceable>(container: &Arc<T>, edges: &mut Vec<TraceEdge>) {
    let holders = Arc::strong_count(container);
    if holders == 1 {
        container.collect(edges);
        return;
    }
    let mut inner = Vec::new();
    container.collect(&mut inner);
    edges.push(TraceEdge::Shared {
        addr: Arc::as_ptr(container) as usize,
        holders,
        edges: inner,
    });
}

static RSECTION: Mutex<()> = Mutex::new(());

enum ScanOutcome {
    Live,
    Stale,
    Garbage(Vec<Arc<OnyxObject>>),
}

enum NodeKind {
    Object {
        object: Arc<OnyxObject>,
        generation: u64,
    },
    Shared {
        holders: usize,
    },
}

struct Node {
    kind: NodeKind,
    edges: Vec<usize>,
    internal: usize,
    live: bool,
}

impl Node {
    fn object(object: Arc<OnyxObject>, generation: u64) -> Self {
        Node {
            kind: NodeKind::Object { object, generation },
            edges: Vec::new(),
            internal: 0,
            live: false,
        }
    }

    /// Holders beyond the internal edges mean something outside the graph
    /// still reaches this node.
    fn held_from_outside(&self) -> bool {
        let holders = match &self.kind {
            NodeKind::Object { object, .. } => object.counts().refs,
            NodeKind::Shared { holders } => *holders,
        };
        holders > self.internal
    }

    fn is_stale(&self) -> bool {
        match &self.kind {
            NodeKind::Object { object, generation } => object.generation() != *generation,
            NodeKind::Shared { .. } => false,
        }
    }
}

#[derive(Default)]
struct Graph {
    nodes: Vec<Node>,
    index: FxHashMap<usize, usize>,
}

impl Graph {
    /// Resolves `edges` into node indices, adding unseen targets. Shared
    /// containers get their own edges linked right away.
    fn link(&mut self, edges: Vec<TraceEdge>) -> Vec<usize> {
        let mut targets = Vec::with_capacity(edges.len());
        for edge in edges {
            let target = match edge {
                TraceEdge::Object(handle) => match self.index.get(&handle.addr()) {
                    Some(&i) => i,
                    None => {
                        let i = self.nodes.len();
                        self.index.insert(handle.addr(), i);
                        let generation = handle.generation();
                        self.nodes.push(Node::object(handle.0, generation));
                        i
                    }
                },
                TraceEdge::Shared {
                    addr,
                    holders,
                    edges,
                } => match self.index.get(&addr) {
                    Some(&i) => i,
                    None => {
                        let i = self.nodes.len();
                        self.index.insert(addr, i);
                        self.nodes.push(Node {
                            kind: NodeKind::Shared { holders },
                            edges: Vec::new(),
                            internal: 0,
                            live: false,
                        });
                        let inner = self.link(edges);
                        self.nodes[i].edges = inner;
                        i
                    }
                },
            };
            self.nodes[target].internal += 1;
            targets.push(target);
        }
        targets
    }
}

/// Checks whether `root` only survives through a reference cycle and, if so,
/// destroys the whole cycle.
pub(crate) fn scan(root: &Arc<OnyxObject>) -> Result<(), OnyxException> {
    let retries = config::rset_max_retries();
    for attempt in 0..=retries {
        let guard = RSECTION.lock().unwrap_or_else(PoisonError::into_inner);
        match find_garbage(root)? {
            ScanOutcome::Live => return Ok(()),
            ScanOutcome::Stale => {
                drop(guard);
                trace!(
                    "cycle scan from object #{} went stale (attempt {})",
                    root.id(),
                    attempt + 1
                );
                std::thread::yield_now();
            }
            ScanOutcome::Garbage(set) => {
                for object in &set {
                    object.mark_collecting();
                }
                drop(guard);
                debug!(
                    "collecting a reference cycle of {} object(s) from #{}",
                    set.len(),
                    root.id()
                );
                let mut xsink = ExceptionSink::new();
                for object in &set {
                    xsink.absorb(object.collect_destroy());
                }
                return xsink.into_result();
            }
        }
    }
    warn!(
        "cycle scan from object #{} abandoned after {} retries",
        root.id(),
        retries
    );
    Ok(())
}

fn find_garbage(root: &Arc<OnyxObject>) -> Result<ScanOutcome, OnyxException> {
    let mut graph = Graph::default();
    graph.index.insert(Arc::as_ptr(root) as usize, 0);
    graph.nodes.push(Node::object(root.clone(), root.generation()));

    let mut current = 0;
    while current < graph.nodes.len() {
        let object = match &graph.nodes[current].kind {
            NodeKind::Object { object, .. } => object.clone(),
            NodeKind::Shared { .. } => {
                current += 1;
                continue;
            }
        };
        if object.is_collecting() {
            // another scan owns this part of the graph
            return Ok(ScanOutcome::Live);
        }
        let counts = object.counts();
        let mut traced_edges = Vec::new();
        let traced = object.trace_members(&mut traced_edges)?;
        if !traced || counts.rrefs > 0 {
            graph.nodes[current].live = true;
        }
        let edges = graph.link(traced_edges);
        graph.nodes[current].edges = edges;
        current += 1;
    }

    let Graph { mut nodes, .. } = graph;
    let mut worklist: Vec<usize> = Vec::new();
    for (i, node) in nodes.iter_mut().enumerate() {
        if node.held_from_outside() {
            node.live = true;
        }
        if node.live {
            worklist.push(i);
        }
    }
    while let Some(i) = worklist.pop() {
        for e in 0..nodes[i].edges.len() {
            let target = nodes[i].edges[e];
            if !nodes[target].live {
                nodes[target].live = true;
                worklist.push(target);
            }
        }
    }
    if nodes[0].live {
        return Ok(ScanOutcome::Live);
    }

    if nodes.iter().any(Node::is_stale) {
        return Ok(ScanOutcome::Stale);
    }
    Ok(ScanOutcome::Garbage(
        nodes
            .into_iter()
            .filter(|node| !node.live)
            .filter_map(|node| match node.kind {
                NodeKind::Object { object, .. } => Some(object),
                NodeKind::Shared { .. } => None,
            })
            .collect(),
    ))
}
