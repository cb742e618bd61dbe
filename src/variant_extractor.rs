
use crate::aligner::{AlignOp, SswAligner};
use crate::data_types::variants::VariantCall;
use crate::errors::{GraphError, GraphResult};
use crate::graph::{EdgeId, EdgeKind, Graph, VariantPayload, VertexId, VertexKind};
use crate::read_info::ReadInfo;
use crate::simplifier::{elide_unbranched_vertices, prune_dead_ends};

use bit_vec::BitVec;
use log::trace;

/// Knobs for bubble collapsing.
#[derive(Clone, Debug)]
pub struct ExtractorOptions {
    /// A bubble branch whose bottleneck weight falls below this is ignored.
    pub min_path_weight: i64,
    /// Collapsing more bubbles than this in one region aborts the region.
    pub max_bubbles: usize,
    /// Longest branch, in edges, a bubble walk will follow.
    pub max_path_length: usize
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        ExtractorOptions {
            min_path_weight: 1,
            max_bubbles: 256,
            max_path_length: 10000
        }
    }
}

/// The out-edge continuing the reference walk from `v`: the Reference or
/// Variant edge when one exists, otherwise a Read edge that rejoins a
/// reference vertex.
fn reference_successor(graph: &Graph, v: VertexId) -> Option<EdgeId> {
    let mut fallback: Option<EdgeId> = None;
    for &edge_id in graph.vertex(v).out_edges().iter() {
        let edge = graph.edge(edge_id);
        match edge.kind() {
            EdgeKind::Reference | EdgeKind::Variant => {
                return Some(edge_id);
            },
            EdgeKind::Read => {
                let dest = graph.vertex(edge.dest());
                if dest.is_reference() && !dest.is_helper() && fallback.is_none() {
                    fallback = Some(edge_id);
                }
            }
        };
    }
    fallback
}

/// Follows the read-side branch of a bubble until it rejoins a reference
/// vertex. Returns None when the branch dead-ends, forks, or revisits an
/// edge.
fn follow_alt_path(graph: &Graph, first_edge: EdgeId, visited: &mut BitVec, max_length: usize) -> Option<(Vec<EdgeId>, VertexId)> {
    let mut edges: Vec<EdgeId> = vec![first_edge];
    visited.set(first_edge, true);
    let mut current = graph.edge(first_edge).dest();
    loop {
        let vertex = graph.vertex(current);
        if vertex.is_reference() && !vertex.is_helper() {
            return Some((edges, current));
        }
        if vertex.out_degree() != 1 || edges.len() >= max_length {
            return None;
        }
        let edge_id = vertex.out_edges()[0];
        if visited.get(edge_id) == Some(true) {
            return None;
        }
        visited.set(edge_id, true);
        edges.push(edge_id);
        current = graph.edge(edge_id).dest();
    }
}

/// Follows the reference walk from `first_edge` until it reaches `target`.
fn follow_ref_path(graph: &Graph, first_edge: EdgeId, target: VertexId, max_length: usize) -> Option<Vec<EdgeId>> {
    let mut edges: Vec<EdgeId> = vec![];
    let mut edge_id = first_edge;
    loop {
        edges.push(edge_id);
        let dest = graph.edge(edge_id).dest();
        if dest == target {
            return Some(edges);
        }
        if graph.vertex(dest).kind() == VertexKind::RefEnd || edges.len() >= max_length {
            return None;
        }
        edge_id = reference_successor(graph, dest)?;
    }
}

/// Concatenated bases, bottleneck weight, and distinct supporting reads
/// along a path.
fn path_summary(graph: &Graph, edges: &[EdgeId]) -> (Vec<u8>, i64, Vec<usize>) {
    let mut seq: Vec<u8> = vec![];
    let mut weight = i64::MAX;
    let mut reads: Vec<usize> = vec![];
    for &edge_id in edges.iter() {
        seq.extend(graph.edge_bases(edge_id));
        weight = weight.min(graph.edge(edge_id).weight());
        reads.extend(graph.edge(edge_id).read_info().read_indices());
    }
    reads.sort_unstable();
    reads.dedup();
    (seq, weight, reads)
}

/// Attempts to collapse the bubble branching at `v`. Returns true when a
/// Variant edge replaced the two branches.
fn try_collapse(graph: &mut Graph, v: VertexId, options: &ExtractorOptions) -> GraphResult<bool> {
    let mut ref_edge: Option<EdgeId> = None;
    let mut alt_edge: Option<EdgeId> = None;
    for &edge_id in graph.vertex(v).out_edges().iter() {
        match graph.edge(edge_id).kind() {
            EdgeKind::Reference => {
                ref_edge = Some(edge_id);
            },
            EdgeKind::Read => {
                alt_edge = Some(edge_id);
            },
            EdgeKind::Variant => {
                return Ok(false);
            }
        };
    }
    let (ref_edge, alt_edge) = match (ref_edge, alt_edge) {
        (Some(r), Some(a)) => (r, a),
        _ => {
            return Ok(false);
        }
    };

    let mut visited = BitVec::from_elem(graph.edge_id_limit(), false);
    let (alt_edges, rejoin) = match follow_alt_path(graph, alt_edge, &mut visited, options.max_path_length) {
        Some(result) => result,
        None => {
            return Ok(false);
        }
    };
    if rejoin == v {
        return Ok(false);
    }
    let ref_edges = match follow_ref_path(graph, ref_edge, rejoin, options.max_path_length) {
        Some(result) => result,
        None => {
            return Ok(false);
        }
    };
    // the reference side may run through an earlier collapsed bubble;
    // removing that Variant edge would drop its calls
    if ref_edges.iter().any(|&edge_id| graph.edge(edge_id).kind() == EdgeKind::Variant) {
        return Ok(false);
    }

    let (ref_seq, ref_weight, ref_reads) = path_summary(graph, &ref_edges);
    let (alt_seq, alt_weight, alt_reads) = path_summary(graph, &alt_edges);
    if ref_weight < options.min_path_weight || alt_weight < options.min_path_weight {
        return Ok(false);
    }

    trace!(
        "Collapsing bubble v{} -> v{}: {} vs {}",
        v, rejoin,
        String::from_utf8_lossy(&ref_seq), String::from_utf8_lossy(&alt_seq)
    );

    // the rejoin vertex keeps contributing its own base after the collapse
    let rejoin_contributes = {
        let rv = graph.vertex(rejoin);
        !rv.is_helper() && rv.kind() != VertexKind::RefEnd
    };
    let mut edge_seq = ref_seq.clone();
    if rejoin_contributes {
        edge_seq.pop();
    }

    let mut interior: Vec<VertexId> = vec![];
    for &edge_id in ref_edges.iter().chain(alt_edges.iter()) {
        let edge = graph.edge(edge_id);
        if edge.source() != v && edge.source() != rejoin {
            interior.push(edge.source());
        }
        if edge.dest() != v && edge.dest() != rejoin {
            interior.push(edge.dest());
        }
    }
    interior.sort_unstable();
    interior.dedup();

    for &edge_id in ref_edges.iter().chain(alt_edges.iter()) {
        graph.remove_edge(edge_id)?;
    }
    for &vertex_id in interior.iter() {
        if graph.vertex(vertex_id).in_degree() == 0 && graph.vertex(vertex_id).out_degree() == 0 {
            graph.remove_vertex(vertex_id)?;
        }
    }

    let weight = ref_weight.max(alt_weight);
    let edge_id = graph.add_edge_with_seq(v, rejoin, EdgeKind::Variant, weight, edge_seq, ReadInfo::new())?;
    graph.edge_mut(edge_id).set_variant(VariantPayload {
        ref_seq,
        ref_weight,
        ref_reads,
        alt_seq,
        alt_weight,
        alt_reads
    });
    Ok(true)
}

/// Scans the reference walk for a branch point with one reference and one
/// read out-edge and collapses the first bubble found.
fn collapse_next_bubble(graph: &mut Graph, options: &ExtractorOptions) -> GraphResult<bool> {
    let start = graph.start_vertex().ok_or(GraphError::NotFound)?;
    let mut current = start;
    let mut steps = 0;
    loop {
        if graph.vertex(current).kind() == VertexKind::RefEnd {
            return Ok(false);
        }
        if graph.vertex(current).kind() == VertexKind::RefMiddle &&
            graph.vertex(current).out_degree() == 2 &&
            try_collapse(graph, current, options)? {
            return Ok(true);
        }
        let edge_id = match reference_successor(graph, current) {
            Some(edge_id) => edge_id,
            None => {
                return Ok(false);
            }
        };
        current = graph.edge(edge_id).dest();
        steps += 1;
        if steps > options.max_path_length {
            return Err(GraphError::TooComplex);
        }
    }
}

/// Repeatedly simplifies the graph and collapses bubbles until none
/// remain. Returns the number of bubbles collapsed.
pub fn collapse_bubbles(graph: &mut Graph, options: &ExtractorOptions) -> GraphResult<usize> {
    let mut collapsed = 0;
    loop {
        prune_dead_ends(graph);
        elide_unbranched_vertices(graph);
        if !collapse_next_bubble(graph, options)? {
            break;
        }
        collapsed += 1;
        if collapsed > options.max_bubbles {
            return Err(GraphError::TooComplex);
        }
    }
    Ok(collapsed)
}

/// Converts one Variant edge into calls. The two allele sequences are
/// aligned and each maximal non-match run becomes a call; pure indel runs
/// are anchored on the preceding reference base.
fn expand_variant(
    aligner: &SswAligner,
    chrom: &str,
    region_start: u64,
    consumed: usize,
    anchor_base: u8,
    payload: &VariantPayload
) -> Vec<VariantCall> {
    let alignment = aligner.align(&payload.ref_seq, &payload.alt_seq);
    let quality = ((payload.alt_weight.max(0) as u64) * 10).min(60) as u8;

    let mut calls: Vec<VariantCall> = vec![];
    let mut ref_off = 0;
    let mut alt_off = 0;
    let mut run: Option<(usize, usize)> = None;
    let mut close_run = |run: &mut Option<(usize, usize)>, ref_end: usize, alt_end: usize| {
        let (ref_start, alt_start) = match run.take() {
            Some(r) => r,
            None => {
                return;
            }
        };
        let mut position = region_start + (consumed + ref_start) as u64 + 1;
        let mut ref_allele = payload.ref_seq[ref_start..ref_end].to_vec();
        let mut alt_allele = payload.alt_seq[alt_start..alt_end].to_vec();
        if ref_allele.is_empty() || alt_allele.is_empty() {
            // pure indel, anchor on the base to the left
            let anchor = if ref_start > 0 { payload.ref_seq[ref_start - 1] } else { anchor_base };
            ref_allele.insert(0, anchor);
            alt_allele.insert(0, anchor);
            position -= 1;
        }
        while ref_allele.len() > 1 && alt_allele.len() > 1 && ref_allele.last() == alt_allele.last() {
            ref_allele.pop();
            alt_allele.pop();
        }
        calls.push(VariantCall::new(
            chrom.to_string(), position,
            ref_allele, alt_allele, quality,
            payload.ref_weight.max(0) as u64, payload.alt_weight.max(0) as u64,
            payload.ref_reads.clone(), payload.alt_reads.clone()
        ));
    };

    for op in alignment.ops.iter() {
        match op {
            AlignOp::Match => {
                close_run(&mut run, ref_off, alt_off);
                ref_off += 1;
                alt_off += 1;
            },
            AlignOp::Mismatch => {
                run.get_or_insert((ref_off, alt_off));
                ref_off += 1;
                alt_off += 1;
            },
            AlignOp::Insertion => {
                run.get_or_insert((ref_off, alt_off));
                alt_off += 1;
            },
            AlignOp::Deletion => {
                run.get_or_insert((ref_off, alt_off));
                ref_off += 1;
            }
        };
    }
    close_run(&mut run, ref_off, alt_off);
    calls
}

/// Walks the final reference path and converts every Variant edge into
/// calls with region-absolute 1-based positions.
pub fn collect_variants(graph: &Graph, aligner: &SswAligner, chrom: &str, region_start: u64) -> GraphResult<Vec<VariantCall>> {
    let start = graph.start_vertex().ok_or(GraphError::NotFound)?;
    let k = graph.kmer_size() as usize;

    // bases of the region covered so far, counting the start window
    // without its sentinel
    let mut consumed = k - 1;
    let mut calls: Vec<VariantCall> = vec![];
    let mut current = start;
    let mut steps = 0;
    loop {
        if graph.vertex(current).kind() == VertexKind::RefEnd {
            break;
        }
        let edge_id = match reference_successor(graph, current) {
            Some(edge_id) => edge_id,
            None => {
                break;
            }
        };
        let edge = graph.edge(edge_id);
        if let Some(payload) = edge.variant() {
            let anchor_base = graph.vertex(current).key().last_base();
            calls.extend(expand_variant(aligner, chrom, region_start, consumed, anchor_base, payload));
        }
        consumed += graph.edge_bases(edge_id).len();
        current = edge.dest();
        steps += 1;
        if steps > graph.edge_id_limit() + 1 {
            return Err(GraphError::TooComplex);
        }
    }
    Ok(calls)
}

/// Collapses all bubbles and reports the resulting calls.
pub fn extract_variants(
    graph: &mut Graph,
    aligner: &SswAligner,
    chrom: &str,
    region_start: u64,
    options: &ExtractorOptions
) -> GraphResult<Vec<VariantCall>> {
    collapse_bubbles(graph, options)?;
    collect_variants(graph, aligner, chrom, region_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{thread_read, thread_reference, AssemblerOptions};
    use crate::kmer::KmerKey;

    fn build_graph(reference: &[u8], reads: &[&[u8]], k: u32) -> Graph {
        let mut graph = Graph::new(k);
        let options = AssemblerOptions {
            threshold: 1,
            ..Default::default()
        };
        thread_reference(&mut graph, reference, &options).unwrap();
        for (read_index, read) in reads.iter().enumerate() {
            let quals = vec![30; read.len()];
            thread_read(&mut graph, read, &quals, read_index, &options).unwrap();
        }
        graph
    }

    #[test]
    fn test_substitution_bubble() {
        let mut graph = build_graph(b"AAACGTTT", &[b"AAAGGTTT"], 3);
        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &ExtractorOptions::default()).unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.position(), 4);
        assert_eq!(call.ref_allele(), b"C");
        assert_eq!(call.alt_allele(), b"G");
        assert_eq!(call.ref_allele().len(), 1);
        assert_eq!(call.alt_allele().len(), 1);
        assert_eq!(call.alt_reads(), &[0]);
        assert_eq!(call.ref_reads(), &[] as &[usize]);
    }

    #[test]
    fn test_deletion_bubble() {
        let mut graph = build_graph(b"AAACGTTT", &[b"AAAGTTT"], 3);
        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &ExtractorOptions::default()).unwrap();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.position(), 3);
        assert_eq!(call.ref_allele(), b"AC");
        assert_eq!(call.alt_allele(), b"A");
    }

    #[test]
    fn test_region_offset_applied() {
        let mut graph = build_graph(b"AAACGTTT", &[b"AAAGGTTT"], 3);
        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr2", 1000, &ExtractorOptions::default()).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].chrom(), "chr2");
        assert_eq!(calls[0].position(), 1004);
    }

    #[test]
    fn test_reference_only_graph_is_quiet() {
        let mut graph = build_graph(b"ACGTACCGGTTA", &[], 4);
        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &ExtractorOptions::default()).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_matching_read_creates_no_bubble() {
        let mut graph = build_graph(b"AAACGTTT", &[b"AAACGTT"], 3);
        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &ExtractorOptions::default()).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_collapsed_variant_survives_outer_branch() {
        let mut graph = Graph::new(3);
        let (s, _) = graph.get_or_add_vertex(KmerKey::new(b"BGA"), VertexKind::RefStart);
        let (u, _) = graph.get_or_add_vertex(KmerKey::new(b"GAA"), VertexKind::RefMiddle);
        let (m, _) = graph.get_or_add_vertex(KmerKey::new(b"AAC"), VertexKind::RefMiddle);
        let (r, _) = graph.get_or_add_vertex(KmerKey::new(b"CGT"), VertexKind::RefMiddle);
        let (w, _) = graph.get_or_add_vertex(KmerKey::new(b"GTT"), VertexKind::RefMiddle);
        let (t, _) = graph.get_or_add_vertex(KmerKey::new(b"TTE"), VertexKind::RefEnd);
        graph.set_start_vertex(s);
        graph.set_end_vertex(t);

        graph.get_or_add_edge(s, u, EdgeKind::Reference, 4);
        graph.get_or_add_edge(u, m, EdgeKind::Reference, 4);
        graph.get_or_add_edge(r, w, EdgeKind::Reference, 4);
        graph.get_or_add_edge(w, t, EdgeKind::Reference, 4);

        // a bubble between m and r that has already been collapsed
        let inner = graph.add_edge_with_seq(m, r, EdgeKind::Variant, 4, vec![b'G'], ReadInfo::new()).unwrap();
        graph.edge_mut(inner).set_variant(VariantPayload {
            ref_seq: b"GT".to_vec(),
            ref_weight: 4,
            ref_reads: vec![],
            alt_seq: b"AT".to_vec(),
            alt_weight: 3,
            alt_reads: vec![1]
        });

        // a read branch from u to w whose reference side spans the
        // collapsed edge
        let (x, _) = graph.get_or_add_vertex(KmerKey::new(b"ATT"), VertexKind::Read);
        let mut info = ReadInfo::new();
        info.add(0, 2, 60);
        graph.add_edge_with_seq(u, x, EdgeKind::Read, 2, vec![], info.clone()).unwrap();
        graph.add_edge_with_seq(x, w, EdgeKind::Read, 2, vec![], info).unwrap();

        let aligner = SswAligner::default();
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &ExtractorOptions::default()).unwrap();

        // the outer branch must not swallow the collapsed edge
        assert!(graph.get_edge(m, r).is_some());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].position(), 5);
        assert_eq!(calls[0].ref_allele(), b"G");
        assert_eq!(calls[0].alt_allele(), b"A");
        assert_eq!(calls[0].alt_reads(), &[1]);
    }

    #[test]
    fn test_low_weight_branch_ignored() {
        let mut graph = build_graph(b"AAACGTTT", &[b"AAAGGTTT"], 3);
        let aligner = SswAligner::default();
        let options = ExtractorOptions {
            min_path_weight: 2,
            ..Default::default()
        };
        let calls = extract_variants(&mut graph, &aligner, "chr1", 0, &options).unwrap();
        assert!(calls.is_empty());
    }
}
