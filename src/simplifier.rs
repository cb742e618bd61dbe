
use crate::errors::{GraphError, GraphResult};
use crate::graph::{EdgeId, EdgeKind, Graph, VertexId, VertexKind};
use crate::read_info::{ReadInfo, ReadInfoEntry};

use log::trace;
use rustc_hash::FxHashSet as HashSet;
use std::cell::RefCell;
use std::rc::Rc;

/// Repeatedly elides non-terminal vertices with exactly one predecessor
/// and one successor edge, merging the two edges into one. Vertices whose
/// elision would create a self-loop or duplicate an existing edge are
/// left alone. Returns the number of vertices removed.
pub fn elide_unbranched_vertices(graph: &mut Graph) -> usize {
    let mut removed = 0;
    loop {
        let mut changed = false;
        for id in graph.live_vertices().into_iter() {
            let vertex = graph.vertex(id);
            if matches!(vertex.kind(), VertexKind::RefStart | VertexKind::RefEnd) {
                continue;
            }
            if vertex.in_degree() != 1 || vertex.out_degree() != 1 {
                continue;
            }
            let in_kind = graph.edge(vertex.in_edges()[0]).kind();
            let out_kind = graph.edge(vertex.out_edges()[0]).kind();
            if in_kind == EdgeKind::Variant || out_kind == EdgeKind::Variant {
                continue;
            }
            match graph.merge_incident_edges(id) {
                Ok(_) => {
                    removed += 1;
                    changed = true;
                },
                Err(GraphError::PredecessorIsSuccessor) | Err(GraphError::EdgeExists) => {
                    trace!("skipping elision of vertex {}", id);
                },
                Err(e) => panic!("unexpected merge error: {}", e)
            };
        }
        if !changed {
            return removed;
        }
    }
}

/// Removes dangling chains: vertices with no predecessors (other than the
/// region start) or no successors (other than the region end), propagating
/// outward until no dead end remains. Returns the number of vertices removed.
pub fn prune_dead_ends(graph: &mut Graph) -> usize {
    let is_dead_end = |graph: &Graph, id: VertexId| {
        let vertex = graph.vertex(id);
        (vertex.in_degree() == 0 && vertex.kind() != VertexKind::RefStart) ||
            (vertex.out_degree() == 0 && vertex.kind() != VertexKind::RefEnd)
    };

    let mut stack: Vec<VertexId> = graph.live_vertices().into_iter()
        .filter(|&id| is_dead_end(graph, id))
        .collect();
    let mut removed = 0;
    while let Some(id) = stack.pop() {
        if graph.get_vertex(graph.vertex(id).key()).is_none() {
            // already removed through another chain
            continue;
        }
        if !is_dead_end(graph, id) {
            continue;
        }
        // a self-loop shows up in both lists, so deduplicate
        let mut incident: Vec<EdgeId> = graph.vertex(id).in_edges().iter()
            .chain(graph.vertex(id).out_edges().iter())
            .copied()
            .collect();
        incident.sort_unstable();
        incident.dedup();
        for edge_id in incident.into_iter() {
            let edge = graph.edge(edge_id);
            let neighbor = if edge.dest() == id { edge.source() } else { edge.dest() };
            graph.remove_edge(edge_id).unwrap_or_else(|e| panic!("incident edge vanished: {}", e));
            if neighbor != id && is_dead_end(graph, neighbor) {
                stack.push(neighbor);
            }
        }
        graph.remove_vertex(id).unwrap_or_else(|e| panic!("dead end vanished: {}", e));
        removed += 1;
    }
    removed
}

/// Deletes Read edges that no longer carry any read evidence.
pub fn prune_unsupported_edges(graph: &mut Graph) -> usize {
    let mut removed = 0;
    for edge_id in graph.live_edges().into_iter() {
        let edge = graph.edge(edge_id);
        if edge.kind() == EdgeKind::Read && edge.read_info().is_empty() {
            graph.remove_edge(edge_id).unwrap_or_else(|e| panic!("live edge vanished: {}", e));
            removed += 1;
        }
    }
    removed
}

/// Deletes Read edges whose weight is below the coverage threshold.
pub fn prune_low_weight_edges(graph: &mut Graph, threshold: i64) -> usize {
    let mut removed = 0;
    for edge_id in graph.live_edges().into_iter() {
        let edge = graph.edge(edge_id);
        if edge.kind() == EdgeKind::Read && edge.weight() < threshold {
            graph.remove_edge(edge_id).unwrap_or_else(|e| panic!("live edge vanished: {}", e));
            removed += 1;
        }
    }
    removed
}

/// Resets every Read edge's weight to its number of distinct supporting reads.
pub fn recompute_weights(graph: &mut Graph) {
    for edge_id in graph.live_edges().into_iter() {
        if graph.edge(edge_id).kind() == EdgeKind::Read {
            let supporting = graph.edge(edge_id).read_info().read_indices().len() as i64;
            graph.edge_mut(edge_id).set_weight(supporting);
        }
    }
}

/// Bridges read evidence across repeat junctions. For every vertex with
/// at least two incoming and two outgoing edges, each (incoming, outgoing)
/// pair is checked for reads traversing both at the correct relative
/// offset; an above-threshold intersection materializes a direct bridging
/// edge (routed through a helper vertex when the direct edge already
/// exists) and the consumed evidence is subtracted from the bridged edges.
/// Edges whose remaining evidence falls to or under the threshold are
/// deleted; deletions invalidate not-yet-processed pairs through the
/// graph's on-delete hook. Returns the number of bridges created.
pub fn connect_reads_by_pairs(graph: &mut Graph, read_distance: usize, threshold: i64) -> GraphResult<usize> {
    let deleted: Rc<RefCell<HashSet<EdgeId>>> = Default::default();
    let deleted_hook = deleted.clone();
    graph.set_delete_hook(Some(Box::new(move |id, _edge| {
        deleted_hook.borrow_mut().insert(id);
    })));

    let junctions: Vec<VertexId> = graph.live_vertices().into_iter()
        .filter(|&id| graph.vertex(id).in_degree() >= 2 && graph.vertex(id).out_degree() >= 2)
        .collect();

    let mut bridges = 0;
    for junction in junctions.into_iter() {
        let vertex = graph.vertex(junction);
        if vertex.in_degree() < 2 || vertex.out_degree() < 2 {
            continue;
        }
        let pairs: Vec<(EdgeId, EdgeId)> = vertex.in_edges().iter()
            .flat_map(|&e_in| vertex.out_edges().iter().map(move |&e_out| (e_in, e_out)))
            .collect();

        // subtraction is deferred so one pair cannot starve the next
        let mut subtractions: Vec<(EdgeId, Vec<ReadInfoEntry>)> = vec![];
        for (e_in, e_out) in pairs.into_iter() {
            if e_in == e_out ||
                deleted.borrow().contains(&e_in) ||
                deleted.borrow().contains(&e_out) {
                continue;
            }
            if graph.edge(e_in).kind() == EdgeKind::Variant || graph.edge(e_out).kind() == EdgeKind::Variant {
                continue;
            }
            let source = graph.edge(e_in).source();
            let dest = graph.edge(e_out).dest();
            if source == dest || source == junction || dest == junction {
                continue;
            }

            let junction_base = if graph.vertex(junction).is_helper() { 0 } else { 1 };
            let offset = graph.edge(e_in).seq().len() + junction_base + read_distance;
            let intersection = graph.edge(e_in).read_info()
                .intersect(graph.edge(e_out).read_info(), offset);
            // a read can match with both of its entries, so gate on
            // distinct reads
            let mut supporting: Vec<usize> = intersection.iter().map(|e| e.read_index).collect();
            supporting.dedup();
            if (supporting.len() as i64) <= threshold {
                continue;
            }

            let mut seq: Vec<u8> = graph.edge(e_in).seq().to_vec();
            if junction_base == 1 {
                seq.push(graph.vertex(junction).key().last_base());
            }
            seq.extend_from_slice(graph.edge(e_out).seq());

            let mut read_info = ReadInfo::new();
            for entry in intersection.iter() {
                read_info.add(entry.read_index, entry.read_position, entry.quality);
            }
            let weight = read_info.read_indices().len() as i64;

            if graph.get_edge(source, dest).is_some() {
                // the direct edge exists, so route the parallel connection
                // through a helper vertex
                let base_key = graph.vertex(dest).key().clone();
                let mut number = graph.vertices_by_sequence(base_key.bases()).len() as u32;
                while graph.get_vertex(&base_key.with_number(number)).is_some() {
                    number += 1;
                }
                let (helper, _) = graph.get_or_add_vertex_full(
                    base_key.with_number(number), VertexKind::Read, true
                );
                graph.add_edge_with_seq(source, helper, EdgeKind::Read, weight, seq, read_info.clone())?;
                graph.add_edge_with_seq(helper, dest, EdgeKind::Read, weight, vec![], read_info)?;
            } else {
                graph.add_edge_with_seq(source, dest, EdgeKind::Read, weight, seq, read_info)?;
            }
            bridges += 1;
            subtractions.push((e_in, intersection.clone()));
            subtractions.push((e_out, intersection));
        }

        for (edge_id, entries) in subtractions.into_iter() {
            if deleted.borrow().contains(&edge_id) {
                continue;
            }
            graph.edge_mut(edge_id).read_info_mut().subtract(&entries);
            if graph.edge(edge_id).kind() == EdgeKind::Read {
                let remaining = graph.edge(edge_id).read_info().read_indices().len() as i64;
                graph.edge_mut(edge_id).set_weight(remaining);
                if remaining <= threshold {
                    graph.remove_edge(edge_id)?;
                }
            }
        }
    }

    graph.set_delete_hook(None);
    Ok(bridges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{AssemblerOptions, reference_sequence, thread_reference, thread_read};
    use crate::kmer::KmerKey;

    #[test]
    fn test_elide_reference_chain() {
        let ref_seq = b"AAACGTTTGC";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();

        let removed = elide_unbranched_vertices(&mut graph);
        assert_eq!(removed, ref_seq.len() - 4);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        // the collapsed graph still reads back the reference exactly
        assert_eq!(reference_sequence(&graph).unwrap(), ref_seq);
    }

    #[test]
    fn test_prune_dead_end_chain() {
        let ref_seq = b"AAACGTTTGC";
        let mut graph = Graph::new(4);
        thread_reference(&mut graph, ref_seq, &AssemblerOptions::default()).unwrap();

        // the read's head mismatches, leaving a dangling chain of read
        // vertices that reconnects at TTTG
        thread_read(&mut graph, b"CACATTTG", &[], 0, &AssemblerOptions::default()).unwrap();
        let before = graph.vertex_count();
        let removed = prune_dead_ends(&mut graph);
        assert_eq!(removed, 4);
        assert_eq!(graph.vertex_count(), before - 4);
        assert_eq!(reference_sequence(&graph).unwrap(), ref_seq);
    }

    #[test]
    fn test_prune_unsupported_and_low_weight() {
        let mut graph = Graph::new(4);
        let (v1, _) = graph.get_or_add_vertex(KmerKey::new(b"AAAC"), VertexKind::Read);
        let (v2, _) = graph.get_or_add_vertex(KmerKey::new(b"AACG"), VertexKind::Read);
        let (v3, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGT"), VertexKind::Read);
        let (supported, _) = graph.get_or_add_edge(v1, v2, EdgeKind::Read, 5);
        graph.edge_mut(supported).read_info_mut().add(0, 0, 60);
        graph.get_or_add_edge(v2, v3, EdgeKind::Read, 1);

        assert_eq!(prune_unsupported_edges(&mut graph), 1);
        assert_eq!(prune_low_weight_edges(&mut graph, 4), 0);
        assert_eq!(graph.edge_count(), 1);

        recompute_weights(&mut graph);
        assert_eq!(graph.edge(supported).weight(), 1);
        assert_eq!(prune_low_weight_edges(&mut graph, 4), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_connect_reads_by_pairs() {
        let mut graph = Graph::new(4);
        let (u, _) = graph.get_or_add_vertex(KmerKey::new(b"AAAC"), VertexKind::Read);
        let (x, _) = graph.get_or_add_vertex(KmerKey::new(b"GAAC"), VertexKind::Read);
        let (v, _) = graph.get_or_add_vertex(KmerKey::new(b"AACG"), VertexKind::Read);
        let (w, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGT"), VertexKind::Read);
        let (y, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGA"), VertexKind::Read);

        let (e_in, _) = graph.get_or_add_edge(u, v, EdgeKind::Read, 2);
        graph.get_or_add_edge(x, v, EdgeKind::Read, 1);
        let (e_out, _) = graph.get_or_add_edge(v, w, EdgeKind::Read, 1);
        graph.get_or_add_edge(v, y, EdgeKind::Read, 1);

        // read 1 traverses u -> v -> w; read 2 only u -> v
        graph.edge_mut(e_in).read_info_mut().add(1, 5, 60);
        graph.edge_mut(e_in).read_info_mut().add(2, 5, 60);
        graph.edge_mut(e_out).read_info_mut().add(1, 6, 60);
        graph.edge_mut(e_out).read_info_mut().add(3, 6, 60);

        let bridges = connect_reads_by_pairs(&mut graph, 0, 0).unwrap();
        assert_eq!(bridges, 1);

        let bridge = graph.get_edge(u, w).unwrap();
        assert_eq!(graph.edge(bridge).read_info().read_indices(), vec![1]);
        assert_eq!(graph.edge(bridge).seq(), b"G");

        // consumed evidence is subtracted from the bridged edges
        assert_eq!(graph.edge(e_in).read_info().read_indices(), vec![2]);
        // e_out lost its only shared read but read 3 remains
        assert_eq!(graph.edge(e_out).read_info().read_indices(), vec![3]);
    }

    #[test]
    fn test_connect_reads_routes_through_helper_when_direct_edge_exists() {
        let mut graph = Graph::new(4);
        let (u, _) = graph.get_or_add_vertex(KmerKey::new(b"AAAC"), VertexKind::Read);
        let (x, _) = graph.get_or_add_vertex(KmerKey::new(b"GAAC"), VertexKind::Read);
        let (v, _) = graph.get_or_add_vertex(KmerKey::new(b"AACG"), VertexKind::Read);
        let (w, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGT"), VertexKind::Read);
        let (y, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGA"), VertexKind::Read);

        let (e_in, _) = graph.get_or_add_edge(u, v, EdgeKind::Read, 2);
        graph.get_or_add_edge(x, v, EdgeKind::Read, 1);
        let (e_out, _) = graph.get_or_add_edge(v, w, EdgeKind::Read, 1);
        graph.get_or_add_edge(v, y, EdgeKind::Read, 1);
        // the direct bridging target is already taken
        let (direct, _) = graph.get_or_add_edge(u, w, EdgeKind::Read, 1);

        graph.edge_mut(e_in).read_info_mut().add(1, 5, 60);
        graph.edge_mut(e_in).read_info_mut().add(2, 5, 60);
        graph.edge_mut(e_out).read_info_mut().add(1, 6, 60);
        graph.edge_mut(e_out).read_info_mut().add(3, 6, 60);

        let bridges = connect_reads_by_pairs(&mut graph, 0, 0).unwrap();
        assert_eq!(bridges, 1);

        // the bridge runs through a renumbered helper copy of w's k-mer
        let copies = graph.vertices_by_sequence(b"ACGT").to_vec();
        assert_eq!(copies.len(), 2);
        let helper = copies[1];
        assert!(graph.vertex(helper).is_helper());
        let first = graph.get_edge(u, helper).unwrap();
        let second = graph.get_edge(helper, w).unwrap();
        assert_eq!(graph.edge(first).seq(), b"G");
        assert_eq!(graph.edge(second).seq(), b"");
        assert_eq!(graph.edge(first).read_info().read_indices(), vec![1]);
        assert_eq!(graph.edge(direct).seq(), b"");

        // eliding the helper would recreate the direct edge, so it stays
        assert_eq!(elide_unbranched_vertices(&mut graph), 0);
        assert!(graph.get_edge(u, helper).is_some());
        assert!(graph.get_edge(helper, w).is_some());
    }

    fn pair_junction_graph(helper_junction: bool) -> (Graph, VertexId, VertexId) {
        let mut graph = Graph::new(4);
        let (u, _) = graph.get_or_add_vertex(KmerKey::new(b"AAAC"), VertexKind::Read);
        let (x, _) = graph.get_or_add_vertex(KmerKey::new(b"GAAC"), VertexKind::Read);
        let (v, _) = graph.get_or_add_vertex_full(KmerKey::new(b"AACG"), VertexKind::Read, helper_junction);
        let (w, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGT"), VertexKind::Read);
        let (y, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGA"), VertexKind::Read);
        let (e_in, _) = graph.get_or_add_edge(u, v, EdgeKind::Read, 1);
        graph.edge_mut(e_in).set_seq(vec![b'A']);
        graph.get_or_add_edge(x, v, EdgeKind::Read, 1);
        let (e_out, _) = graph.get_or_add_edge(v, w, EdgeKind::Read, 1);
        graph.get_or_add_edge(v, y, EdgeKind::Read, 1);
        graph.edge_mut(e_in).read_info_mut().add(1, 5, 60);
        graph.edge_mut(e_out).read_info_mut().add(1, 6, 60);
        (graph, u, w)
    }

    #[test]
    fn test_helper_junction_offset_excludes_junction_base() {
        // a helper junction contributes no base, so positions one apart match
        let (mut graph, u, w) = pair_junction_graph(true);
        assert_eq!(connect_reads_by_pairs(&mut graph, 0, 0).unwrap(), 1);
        let bridge = graph.get_edge(u, w).unwrap();
        assert_eq!(graph.edge(bridge).seq(), b"A");

        // an ordinary junction expects one more base between the entries
        let (mut graph, u, w) = pair_junction_graph(false);
        assert_eq!(connect_reads_by_pairs(&mut graph, 0, 0).unwrap(), 0);
        assert!(graph.get_edge(u, w).is_none());
    }

    #[test]
    fn test_connect_reads_below_threshold_is_noop() {
        let mut graph = Graph::new(4);
        let (u, _) = graph.get_or_add_vertex(KmerKey::new(b"AAAC"), VertexKind::Read);
        let (x, _) = graph.get_or_add_vertex(KmerKey::new(b"GAAC"), VertexKind::Read);
        let (v, _) = graph.get_or_add_vertex(KmerKey::new(b"AACG"), VertexKind::Read);
        let (w, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGT"), VertexKind::Read);
        let (y, _) = graph.get_or_add_vertex(KmerKey::new(b"ACGA"), VertexKind::Read);
        let (e_in, _) = graph.get_or_add_edge(u, v, EdgeKind::Read, 1);
        graph.get_or_add_edge(x, v, EdgeKind::Read, 1);
        let (e_out, _) = graph.get_or_add_edge(v, w, EdgeKind::Read, 1);
        graph.get_or_add_edge(v, y, EdgeKind::Read, 1);
        graph.edge_mut(e_in).read_info_mut().add(1, 5, 60);
        graph.edge_mut(e_out).read_info_mut().add(1, 6, 60);

        let bridges = connect_reads_by_pairs(&mut graph, 0, 1).unwrap();
        assert_eq!(bridges, 0);
        assert!(graph.get_edge(u, w).is_none());
        assert_eq!(graph.edge(e_in).read_info().read_indices(), vec![1]);
    }
}
