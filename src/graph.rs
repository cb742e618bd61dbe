
use crate::errors::{GraphError, GraphResult};
use crate::kmer::KmerKey;
use crate::kmer_table::{EdgeTable, VertexTable};
use crate::read_info::ReadInfo;

use rustc_hash::FxHashMap as HashMap;
use std::io::Write;
use strum_macros::Display;

/// Stable arena index of a vertex; never reused within a region.
pub type VertexId = usize;
/// Stable arena index of an edge; never reused within a region.
pub type EdgeId = usize;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum VertexKind {
    RefStart,
    RefMiddle,
    RefEnd,
    Read
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum EdgeKind {
    Reference,
    Read,
    Variant
}

/// A vertex of the de Bruijn graph. Edges are owned by the graph and only
/// referenced here by ID; the in/out lists keep creation order for
/// deterministic traversal.
pub struct Vertex {
    key: KmerKey,
    kind: VertexKind,
    order: u64,
    /// Offset into the active region; only meaningful for Ref vertices.
    ref_position: usize,
    helper: bool,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
    deleted: bool
}

impl Vertex {
    pub fn key(&self) -> &KmerKey {
        &self.key
    }

    pub fn kind(&self) -> VertexKind {
        self.kind
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn ref_position(&self) -> usize {
        self.ref_position
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, VertexKind::RefStart | VertexKind::RefMiddle | VertexKind::RefEnd)
    }

    pub fn is_helper(&self) -> bool {
        self.helper
    }

    pub fn out_edges(&self) -> &[EdgeId] {
        &self.out_edges
    }

    pub fn in_edges(&self) -> &[EdgeId] {
        &self.in_edges
    }

    pub fn out_degree(&self) -> usize {
        self.out_edges.len()
    }

    pub fn in_degree(&self) -> usize {
        self.in_edges.len()
    }
}

/// Allele evidence carried by a Variant edge after a bubble collapse.
#[derive(Clone, Debug, Default)]
pub struct VariantPayload {
    pub ref_seq: Vec<u8>,
    pub ref_weight: i64,
    pub ref_reads: Vec<usize>,
    pub alt_seq: Vec<u8>,
    pub alt_weight: i64,
    pub alt_reads: Vec<usize>
}

/// An edge of the de Bruijn graph. The sequence payload holds the bases
/// the edge skips beyond a single k-mer step; it is empty right after
/// threading and grows as vertices are elided.
pub struct Edge {
    source: VertexId,
    dest: VertexId,
    kind: EdgeKind,
    order: u64,
    weight: i64,
    seq: Vec<u8>,
    read_info: ReadInfo,
    variant: Option<VariantPayload>,
    deleted: bool
}

impl Edge {
    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn dest(&self) -> VertexId {
        self.dest
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: i64) {
        self.weight = weight;
    }

    pub fn add_weight(&mut self, delta: i64) {
        self.weight += delta;
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn set_seq(&mut self, seq: Vec<u8>) {
        self.seq = seq;
    }

    pub fn read_info(&self) -> &ReadInfo {
        &self.read_info
    }

    pub fn read_info_mut(&mut self) -> &mut ReadInfo {
        &mut self.read_info
    }

    pub fn variant(&self) -> Option<&VariantPayload> {
        self.variant.as_ref()
    }

    pub fn set_variant(&mut self, payload: VariantPayload) {
        self.kind = EdgeKind::Variant;
        self.variant = Some(payload);
    }
}

/// Callback fired whenever an edge is removed, before its slot is
/// tombstoned. Used by simplification passes to invalidate cached
/// edge-pair candidates.
pub type DeleteHook = Box<dyn FnMut(EdgeId, &Edge)>;

/// De Bruijn graph for one active region. Vertices and edges live in
/// append-only arenas addressed by stable IDs; the hash tables map k-mer
/// keys back to IDs, and `by_sequence` provides the disambiguator-blind
/// lookup read threading needs. A per-graph order counter stamps every
/// vertex and edge for deterministic iteration.
pub struct Graph {
    kmer_size: u32,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    vertex_table: VertexTable<VertexId>,
    edge_table: EdgeTable<EdgeId>,
    by_sequence: HashMap<Vec<u8>, Vec<VertexId>>,
    next_order: u64,
    start_vertex: Option<VertexId>,
    end_vertex: Option<VertexId>,
    on_delete: Option<DeleteHook>
}

impl Graph {
    pub fn new(kmer_size: u32) -> Graph {
        Graph {
            kmer_size,
            vertices: vec![],
            edges: vec![],
            vertex_table: VertexTable::new(),
            edge_table: EdgeTable::new(),
            by_sequence: Default::default(),
            next_order: 0,
            start_vertex: None,
            end_vertex: None,
            on_delete: None
        }
    }

    pub fn kmer_size(&self) -> u32 {
        self.kmer_size
    }

    pub fn start_vertex(&self) -> Option<VertexId> {
        self.start_vertex
    }

    pub fn set_start_vertex(&mut self, vertex: VertexId) {
        self.start_vertex = Some(vertex);
    }

    pub fn end_vertex(&self) -> Option<VertexId> {
        self.end_vertex
    }

    pub fn set_end_vertex(&mut self, vertex: VertexId) {
        self.end_vertex = Some(vertex);
    }

    pub fn set_delete_hook(&mut self, hook: Option<DeleteHook>) {
        self.on_delete = hook;
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    pub fn set_ref_position(&mut self, id: VertexId, position: usize) {
        self.vertices[id].ref_position = position;
    }

    /// Number of live (non-deleted) vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertex_table.len()
    }

    /// Number of live (non-deleted) edges.
    pub fn edge_count(&self) -> usize {
        self.edge_table.len()
    }

    /// Upper bound of the edge ID space, for bit-set sizing.
    pub fn edge_id_limit(&self) -> usize {
        self.edges.len()
    }

    pub fn get_vertex(&self, key: &KmerKey) -> Option<VertexId> {
        self.vertex_table.get(key).copied()
    }

    pub fn get_edge(&self, source: VertexId, dest: VertexId) -> Option<EdgeId> {
        let pair = (self.vertices[source].key.clone(), self.vertices[dest].key.clone());
        self.edge_table.get(&pair).copied()
    }

    /// All live vertices whose base sequence matches `seq`, regardless of
    /// disambiguator, in creation order.
    pub fn vertices_by_sequence(&self, seq: &[u8]) -> &[VertexId] {
        self.by_sequence.get(seq)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// IDs of all live vertices in creation order.
    pub fn live_vertices(&self) -> Vec<VertexId> {
        (0..self.vertices.len())
            .filter(|&id| !self.vertices[id].deleted)
            .collect()
    }

    /// IDs of all live edges in creation order.
    pub fn live_edges(&self) -> Vec<EdgeId> {
        (0..self.edges.len())
            .filter(|&id| !self.edges[id].deleted)
            .collect()
    }

    /// Fetches the vertex for `key`, creating it when absent. The second
    /// return value reports whether the vertex already existed.
    pub fn get_or_add_vertex(&mut self, key: KmerKey, kind: VertexKind) -> (VertexId, bool) {
        self.get_or_add_vertex_full(key, kind, false)
    }

    /// Same as `get_or_add_vertex` but allows marking the vertex a helper.
    pub fn get_or_add_vertex_full(&mut self, key: KmerKey, kind: VertexKind, helper: bool) -> (VertexId, bool) {
        let id = self.vertices.len();
        match self.vertex_table.insert(key.clone(), id) {
            Ok(()) => {
                self.by_sequence.entry(key.bases().to_vec())
                    .or_default()
                    .push(id);
                self.vertices.push(Vertex {
                    key,
                    kind,
                    order: self.next_order,
                    ref_position: 0,
                    helper,
                    out_edges: vec![],
                    in_edges: vec![],
                    deleted: false
                });
                self.next_order += 1;
                (id, false)
            },
            Err(GraphError::AlreadyExists) => {
                let existing = *self.vertex_table.get(&key)
                    .unwrap_or_else(|| panic!("vertex table reported an entry it cannot find"));
                (existing, true)
            },
            Err(e) => panic!("unexpected vertex table error: {}", e)
        }
    }

    /// Fetches the edge between two vertices, creating it when absent.
    /// The second return value reports whether the edge already existed.
    pub fn get_or_add_edge(&mut self, source: VertexId, dest: VertexId, kind: EdgeKind, weight: i64) -> (EdgeId, bool) {
        let pair = (self.vertices[source].key.clone(), self.vertices[dest].key.clone());
        let id = self.edges.len();
        match self.edge_table.insert(pair, id) {
            Ok(()) => {
                self.edges.push(Edge {
                    source,
                    dest,
                    kind,
                    order: self.next_order,
                    weight,
                    seq: vec![],
                    read_info: ReadInfo::new(),
                    variant: None,
                    deleted: false
                });
                self.next_order += 1;
                self.vertices[source].out_edges.push(id);
                self.vertices[dest].in_edges.push(id);
                (id, false)
            },
            Err(GraphError::AlreadyExists) => {
                let pair = (self.vertices[source].key.clone(), self.vertices[dest].key.clone());
                let existing = *self.edge_table.get(&pair)
                    .unwrap_or_else(|| panic!("edge table reported an entry it cannot find"));
                (existing, true)
            },
            Err(e) => panic!("unexpected edge table error: {}", e)
        }
    }

    /// Creates an edge carrying an explicit sequence payload; the edge
    /// must not already exist.
    pub fn add_edge_with_seq(&mut self, source: VertexId, dest: VertexId, kind: EdgeKind, weight: i64, seq: Vec<u8>, read_info: ReadInfo) -> GraphResult<EdgeId> {
        let (id, existed) = self.get_or_add_edge(source, dest, kind, weight);
        if existed {
            return Err(GraphError::AlreadyExists);
        }
        self.edges[id].seq = seq;
        self.edges[id].read_info = read_info;
        Ok(id)
    }

    /// Removes an edge, maintaining both endpoints' adjacency lists and
    /// firing the registered on-delete hook.
    pub fn remove_edge(&mut self, id: EdgeId) -> GraphResult<()> {
        if id >= self.edges.len() || self.edges[id].deleted {
            return Err(GraphError::NotFound);
        }
        let source = self.edges[id].source;
        let dest = self.edges[id].dest;
        let pair = (self.vertices[source].key.clone(), self.vertices[dest].key.clone());
        self.edge_table.remove(&pair)?;
        self.vertices[source].out_edges.retain(|&e| e != id);
        self.vertices[dest].in_edges.retain(|&e| e != id);
        self.edges[id].deleted = true;
        // take the hook so it can borrow the edge while we hold &mut self
        let mut hook = self.on_delete.take();
        if let Some(h) = hook.as_mut() {
            h(id, &self.edges[id]);
        }
        self.on_delete = hook;
        Ok(())
    }

    /// Removes an isolated vertex. Callers remove incident edges first.
    pub fn remove_vertex(&mut self, id: VertexId) -> GraphResult<()> {
        if id >= self.vertices.len() || self.vertices[id].deleted {
            return Err(GraphError::NotFound);
        }
        assert!(self.vertices[id].in_edges.is_empty() && self.vertices[id].out_edges.is_empty());
        self.vertex_table.remove(&self.vertices[id].key)?;
        if let Some(list) = self.by_sequence.get_mut(self.vertices[id].key.bases()) {
            list.retain(|&v| v != id);
        }
        self.vertices[id].deleted = true;
        Ok(())
    }

    /// Elides a 1-in/1-out vertex by merging its incident edges into one.
    /// Refuses self-loops (`PredecessorIsSuccessor`) and merges whose
    /// result edge already exists (`EdgeExists`); both leave the graph
    /// untouched.
    pub fn merge_incident_edges(&mut self, vertex: VertexId) -> GraphResult<EdgeId> {
        let v = &self.vertices[vertex];
        if v.in_degree() != 1 || v.out_degree() != 1 {
            return Err(GraphError::NotFound);
        }
        let in_edge = v.in_edges[0];
        let out_edge = v.out_edges[0];
        let pred = self.edges[in_edge].source;
        let succ = self.edges[out_edge].dest;
        if pred == succ || pred == vertex {
            return Err(GraphError::PredecessorIsSuccessor);
        }
        let pair = (self.vertices[pred].key.clone(), self.vertices[succ].key.clone());
        if self.edge_table.contains_key(&pair) {
            return Err(GraphError::EdgeExists);
        }

        // helper vertices contribute no base of their own
        let mut seq: Vec<u8> = self.edges[in_edge].seq.clone();
        if !self.vertices[vertex].helper {
            seq.push(self.vertices[vertex].key.last_base());
        }
        seq.extend_from_slice(&self.edges[out_edge].seq);

        let kind = if self.edges[in_edge].kind == EdgeKind::Reference &&
            self.edges[out_edge].kind == EdgeKind::Reference {
            EdgeKind::Reference
        } else {
            EdgeKind::Read
        };
        let weight = self.edges[in_edge].weight.min(self.edges[out_edge].weight);
        let mut read_info = self.edges[in_edge].read_info.clone();
        read_info.merge(&self.edges[out_edge].read_info);

        self.remove_edge(in_edge)?;
        self.remove_edge(out_edge)?;
        self.remove_vertex(vertex)?;
        self.add_edge_with_seq(pred, succ, kind, weight, seq, read_info)
    }

    /// Reconstructs the bases an edge represents beyond its source vertex:
    /// the skip-sequence plus the destination's own base (unless the
    /// destination is a helper or the region end).
    pub fn edge_bases(&self, id: EdgeId) -> Vec<u8> {
        let edge = &self.edges[id];
        let dest = &self.vertices[edge.dest];
        let mut bases = edge.seq.clone();
        if !dest.helper && dest.kind != VertexKind::RefEnd {
            bases.push(dest.key.last_base());
        }
        bases
    }

    /// Writes the graph as DOT text, vertices and edges in creation order.
    pub fn write_dot<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "digraph kmers {{")?;
        for (key, &id) in self.vertex_table.ordered_entries() {
            let v = &self.vertices[id];
            writeln!(writer, "    v{} [label=\"{:?}\\n{}\"];", id, key, v.kind)?;
        }
        for (_, &id) in self.edge_table.ordered_entries() {
            let e = &self.edges[id];
            writeln!(
                writer,
                "    v{} -> v{} [label=\"{} w={} len={}\"];",
                e.source, e.dest, e.kind, e.weight, e.seq.len()
            )?;
        }
        writeln!(writer, "}}")
    }
}
