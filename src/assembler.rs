
use crate::errors::{GraphError, GraphResult};
use crate::graph::{EdgeKind, Graph, VertexId, VertexKind};
use crate::kmer::{END_SENTINEL, KmerKey, START_SENTINEL};

use log::trace;
use priority_queue::PriorityQueue;
use rustc_hash::FxHashSet as HashSet;
use std::cmp::Reverse;

/// Default quality assigned when a read carries no quality track.
const DEFAULT_QUALITY: u8 = 60;

/// Tunables for threading and disambiguation.
#[derive(Clone, Debug)]
pub struct AssemblerOptions {
    /// Initial weight of Reference edges, also the coverage threshold.
    pub threshold: i64,
    /// Penalty per reference edge a disambiguation jump skips.
    pub missing_edge_penalty: u64,
    /// Penalty for a jump backward in reference coordinates.
    pub backward_penalty: u64,
    /// A reference k-mer sequence repeating this often raises `RefRepeats`.
    pub max_reference_repeats: u32
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            threshold: 4,
            missing_edge_penalty: 3,
            backward_penalty: 8,
            max_reference_repeats: 10
        }
    }
}

/// Threads the reference window through the graph: one RefMiddle vertex
/// per k-mer occurrence with sequential reference positions, connected by
/// Reference edges. The start vertex carries the `B` sentinel, the end
/// vertex the `E` sentinel; the final edge carries the last reference
/// base as its sequence payload so a reference walk reproduces the window
/// exactly. Repeated reference k-mers get fresh disambiguators; a
/// sequence repeating beyond the cap raises `RefRepeats`.
pub fn thread_reference(graph: &mut Graph, ref_seq: &[u8], options: &AssemblerOptions) -> GraphResult<()> {
    let k = graph.kmer_size() as usize;
    if ref_seq.len() < k {
        return Err(GraphError::ReadTooShort(ref_seq.len(), k as u32));
    }

    let mut window = KmerKey::new(&ref_seq[0..k]);
    window.back(START_SENTINEL);
    let (start, _) = graph.get_or_add_vertex(window.clone(), VertexKind::RefStart);
    graph.set_start_vertex(start);
    graph.set_ref_position(start, 0);

    let mut position: usize = 0;
    let mut prev = start;
    for i in (k - 1)..(ref_seq.len() - 1) {
        window.advance(ref_seq[i]);
        let repeats = graph.vertices_by_sequence(window.bases()).len() as u32;
        if repeats >= options.max_reference_repeats {
            return Err(GraphError::RefRepeats(k as u32));
        }
        let key = window.with_number(repeats);
        let (vertex, existed) = graph.get_or_add_vertex(key, VertexKind::RefMiddle);
        if existed {
            // cannot happen: the repeat count always yields a fresh number
            return Err(GraphError::RefRepeats(k as u32));
        }
        position += 1;
        graph.set_ref_position(vertex, position);
        graph.get_or_add_edge(prev, vertex, EdgeKind::Reference, options.threshold);
        prev = vertex;
    }

    // the end vertex consumes the final base plus the sentinel; the base
    // travels on the closing edge's sequence payload
    let last_base = ref_seq[ref_seq.len() - 1];
    window.advance(last_base);
    window.advance(END_SENTINEL);
    let (end, _) = graph.get_or_add_vertex(window, VertexKind::RefEnd);
    position += 1;
    graph.set_ref_position(end, position);
    let (closing, existed) = graph.get_or_add_edge(prev, end, EdgeKind::Reference, options.threshold);
    if !existed {
        graph.edge_mut(closing).set_seq(vec![last_base]);
    }
    graph.set_end_vertex(end);
    Ok(())
}

/// Reads the reference window back out of the graph by walking Reference
/// edges from start to end. Used for round-trip checks and diagnostics.
pub fn reference_sequence(graph: &Graph) -> Option<Vec<u8>> {
    let start = graph.start_vertex()?;
    let end = graph.end_vertex()?;
    let mut sequence: Vec<u8> = graph.vertex(start).key().bases()[1..].to_vec();
    let mut current = start;
    while current != end {
        let next_edge = graph.vertex(current).out_edges().iter()
            .copied()
            .find(|&e| graph.edge(e).kind() == EdgeKind::Reference)?;
        sequence.extend_from_slice(&graph.edge_bases(next_edge));
        current = graph.edge(next_edge).dest();
    }
    Some(sequence)
}

/// One node of the layered disambiguation graph: a read position paired
/// with a choice among the reference vertices matching its window.
type LayerNode = (usize, usize);

/// Resolves which concrete reference vertex each ambiguous read position
/// should thread onto. Layers are the read positions whose candidate sets
/// contain reference vertices; inter-layer edge weights combine a
/// missing-edge penalty per skipped reference edge with a backward-jump
/// penalty, and a shortest path picks one vertex per layer.
fn disambiguate_positions(
    graph: &Graph,
    layers: &[(usize, Vec<VertexId>)],
    options: &AssemblerOptions
) -> Vec<VertexId> {
    assert!(!layers.is_empty());
    let mut distances: Vec<Vec<u64>> = layers.iter()
        .map(|(_, choices)| vec![u64::MAX; choices.len()])
        .collect();
    let mut predecessors: Vec<Vec<usize>> = layers.iter()
        .map(|(_, choices)| vec![usize::MAX; choices.len()])
        .collect();

    let mut queue: PriorityQueue<LayerNode, Reverse<u64>> = PriorityQueue::new();
    for choice in 0..layers[0].1.len() {
        distances[0][choice] = 0;
        queue.push((0, choice), Reverse(0));
    }

    while let Some(((layer, choice), Reverse(distance))) = queue.pop() {
        if distance > distances[layer][choice] {
            continue;
        }
        if layer + 1 >= layers.len() {
            continue;
        }
        let (read_pos, ref choices) = layers[layer];
        let (next_read_pos, ref next_choices) = layers[layer + 1];
        let read_dist = (next_read_pos - read_pos) as i64;
        let here = graph.vertex(choices[choice]).ref_position() as i64;
        for (next_choice, &candidate) in next_choices.iter().enumerate() {
            let delta = graph.vertex(candidate).ref_position() as i64 - here;
            let mut cost: u64 = 0;
            if delta != read_dist {
                cost += options.missing_edge_penalty * delta.abs_diff(read_dist);
                if delta <= 0 {
                    cost += options.backward_penalty;
                }
            }
            let tentative = distance.saturating_add(cost);
            if tentative < distances[layer + 1][next_choice] {
                distances[layer + 1][next_choice] = tentative;
                predecessors[layer + 1][next_choice] = choice;
                queue.push((layer + 1, next_choice), Reverse(tentative));
            }
        }
    }

    // best terminal choice, then backtrack one choice per layer
    let last = layers.len() - 1;
    let mut best_choice = 0;
    for choice in 1..layers[last].1.len() {
        if distances[last][choice] < distances[last][best_choice] {
            best_choice = choice;
        }
    }
    let mut chosen: Vec<VertexId> = vec![0; layers.len()];
    let mut layer = last;
    let mut choice = best_choice;
    loop {
        chosen[layer] = layers[layer].1[choice];
        if layer == 0 {
            break;
        }
        choice = predecessors[layer][choice];
        layer -= 1;
    }
    chosen
}

/// Threads one read through the graph. Each window resolves to a vertex:
/// the unique match when unambiguous, the shortest-path choice when the
/// window's sequence matches several reference vertices, or a fresh Read
/// vertex when nothing matches. Edges along the path accumulate ReadInfo
/// entries and weight; re-traversal never duplicates an edge, and a
/// repeat of the same edge within one read does not double-bump weight.
pub fn thread_read(
    graph: &mut Graph,
    seq: &[u8],
    quals: &[u8],
    read_index: usize,
    options: &AssemblerOptions
) -> GraphResult<()> {
    let k = graph.kmer_size() as usize;
    if seq.len() < k {
        return Err(GraphError::ReadTooShort(seq.len(), k as u32));
    }
    let window_count = seq.len() - k + 1;

    // candidate sets per window position, disambiguator-blind
    let mut candidates: Vec<Vec<VertexId>> = Vec::with_capacity(window_count);
    let mut ambiguous = false;
    for i in 0..window_count {
        let matches = graph.vertices_by_sequence(&seq[i..i + k]).to_vec();
        if matches.len() > 1 {
            ambiguous = true;
        }
        candidates.push(matches);
    }

    let mut chosen: Vec<Option<VertexId>> = candidates.iter()
        .map(|set| if set.len() == 1 { Some(set[0]) } else { None })
        .collect();

    if ambiguous {
        let layers: Vec<(usize, Vec<VertexId>)> = candidates.iter()
            .enumerate()
            .filter_map(|(i, set)| {
                let refs: Vec<VertexId> = set.iter()
                    .copied()
                    .filter(|&v| graph.vertex(v).is_reference())
                    .collect();
                if refs.is_empty() { None } else { Some((i, refs)) }
            })
            .collect();
        if !layers.is_empty() {
            let resolved = disambiguate_positions(graph, &layers, options);
            for ((position, _), vertex) in layers.iter().zip(resolved.into_iter()) {
                trace!("read {}: window {} resolved to vertex {}", read_index, position, vertex);
                chosen[*position] = Some(vertex);
            }
        }
    }

    // walk the resolved path, creating Read vertices for unmatched windows
    let mut within_read: HashSet<(VertexId, VertexId)> = Default::default();
    let mut prev: Option<VertexId> = None;
    for i in 0..window_count {
        let vertex = match chosen[i] {
            Some(v) => v,
            None => graph.get_or_add_vertex(KmerKey::new(&seq[i..i + k]), VertexKind::Read).0
        };
        if let Some(p) = prev {
            let (edge, _) = graph.get_or_add_edge(p, vertex, EdgeKind::Read, 0);
            if within_read.insert((p, vertex)) {
                graph.edge_mut(edge).add_weight(1);
            }
            let quality = quals.get(i + k - 1).copied().unwrap_or(DEFAULT_QUALITY);
            graph.edge_mut(edge).read_info_mut().add(read_index, i - 1, quality);
        }
        prev = Some(vertex);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_round_trip() {
        // no internal k-mer repeats at k = 4
        let ref_seq = b"AAACGTTTGC";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();
        assert_eq!(graph.vertex_count(), ref_seq.len() - 4 + 2);
        assert_eq!(reference_sequence(&graph).unwrap(), ref_seq);
    }

    #[test]
    fn test_reference_round_trip_minimal() {
        let ref_seq = b"ACGT";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();
        // just the two sentinel vertices
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(reference_sequence(&graph).unwrap(), ref_seq);
    }

    #[test]
    fn test_reference_too_short() {
        let mut graph = Graph::new(8);
        let result = thread_reference(&mut graph, b"ACGT", &AssemblerOptions::default());
        assert_eq!(result, Err(GraphError::ReadTooShort(4, 8)));
    }

    #[test]
    fn test_reference_repeat_cap() {
        let mut graph = Graph::new(3);
        let options = AssemblerOptions {
            max_reference_repeats: 2,
            ..Default::default()
        };
        // "ACG" occurs three times among the middle windows
        let result = thread_reference(&mut graph, b"TACGTACGTACGTT", &options);
        assert_eq!(result, Err(GraphError::RefRepeats(3)));
    }

    #[test]
    fn test_read_weight_accumulation() {
        let ref_seq = b"AAACGTTTGC";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();
        let edges_before = graph.edge_count();

        let read = b"AACGTTTG";
        thread_read(&mut graph, read, &[], 0, &AssemblerOptions::default()).unwrap();
        thread_read(&mut graph, read, &[], 1, &AssemblerOptions::default()).unwrap();

        // identical reads reuse the same edges
        assert_eq!(graph.edge_count(), edges_before);
        for edge_id in graph.live_edges().into_iter() {
            let edge = graph.edge(edge_id);
            if !edge.read_info().is_empty() {
                assert_eq!(edge.read_info().read_indices(), vec![0, 1]);
                let base_weight = AssemblerOptions::default().threshold;
                assert_eq!(edge.weight(), base_weight + 2);
            }
        }
    }

    #[test]
    fn test_read_threading_creates_read_vertices() {
        let ref_seq = b"AAACGTTTGC";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();
        let vertices_before = graph.vertex_count();

        // same as the reference except one substitution in the middle
        thread_read(&mut graph, b"AACATTTG", &[], 0, &AssemblerOptions::default()).unwrap();
        assert!(graph.vertex_count() > vertices_before);
    }

    #[test]
    fn test_repeat_disambiguation_prefers_forward_path() {
        // at k = 3, "ACG" appears twice among the middle windows
        let ref_seq = b"ACGTTACGAT";
        let mut graph = Graph::new(3);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();
        let acg_vertices = graph.vertices_by_sequence(b"ACG").to_vec();
        assert_eq!(acg_vertices.len(), 2);
        let early = acg_vertices[0];
        let late = acg_vertices[1];
        assert!(graph.vertex(early).ref_position() < graph.vertex(late).ref_position());

        // this read matches the second occurrence's context
        thread_read(&mut graph, b"TTACGA", &[], 0, &AssemblerOptions::default()).unwrap();
        let tac = graph.vertices_by_sequence(b"TAC")[0];
        assert!(graph.get_edge(tac, late).is_some());
        assert!(graph.get_edge(tac, early).is_none());
    }

    #[test]
    fn test_read_shorter_than_k() {
        let mut graph = Graph::new(6);
        thread_reference(&mut graph, b"AAACGTTTGC", &AssemblerOptions::default()).unwrap();
        let result = thread_read(&mut graph, b"ACG", &[], 0, &AssemblerOptions::default());
        assert_eq!(result, Err(GraphError::ReadTooShort(3, 6)));
    }
}
