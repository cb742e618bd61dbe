
use crate::aligner::SswAligner;
use crate::assembler::{thread_read, thread_reference, AssemblerOptions};
use crate::data_types::reads::{ReadCollection, SequencedRead};
use crate::data_types::reference_genome::ReferenceGenome;
use crate::data_types::variants::VariantCall;
use crate::errors::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::region_gen::ActiveRegion;
use crate::simplifier::{connect_reads_by_pairs, prune_dead_ends, prune_low_weight_edges, prune_unsupported_edges, recompute_weights};
use crate::variant_extractor::{extract_variants, ExtractorOptions};
use crate::variant_graph::{phase_variants, PhaserOptions};

use log::{debug, trace, warn};
use std::path::{Path, PathBuf};

/// Full configuration for calling one region.
#[derive(Clone, Debug)]
pub struct CallerOptions {
    /// Starting k-mer size.
    pub kmer_size: u32,
    /// Largest k-mer size the retry ladder may reach.
    pub max_kmer_size: u32,
    /// k-mer size increment on a failed attempt.
    pub kmer_step: u32,
    /// Attempts before a region is given up on.
    pub max_kmer_attempts: u32,
    pub assembler: AssemblerOptions,
    /// Evidence needed to bridge a junction from read pairing; 0 disables
    /// the bridging pass.
    pub paired_threshold: i64,
    /// Extra read-position distance expected across a bridged junction,
    /// on top of the junction's own span.
    pub pair_read_distance: usize,
    pub extractor: ExtractorOptions,
    pub phaser: PhaserOptions,
    /// When set, every assembled graph is dumped as DOT into this
    /// directory before bubble collapsing.
    pub dot_dir: Option<PathBuf>
}

impl Default for CallerOptions {
    fn default() -> Self {
        CallerOptions {
            kmer_size: 21,
            max_kmer_size: 81,
            kmer_step: 10,
            max_kmer_attempts: 8,
            assembler: Default::default(),
            paired_threshold: 2,
            pair_read_distance: 0,
            extractor: Default::default(),
            phaser: Default::default(),
            dot_dir: None
        }
    }
}

fn dump_dot(graph: &Graph, dir: &Path, region: &ActiveRegion) -> std::io::Result<()> {
    let filename = dir.join(format!("{}_{}_{}.dot", region.chrom(), region.start(), region.end()));
    let mut writer = std::io::BufWriter::new(std::fs::File::create(filename)?);
    graph.write_dot(&mut writer)
}

/// One assembly attempt at a fixed k-mer size.
fn assemble_region(
    region: &ActiveRegion,
    ref_seq: &[u8],
    segments: &[&SequencedRead],
    kmer_size: u32,
    options: &CallerOptions
) -> GraphResult<Vec<VariantCall>> {
    let mut graph = Graph::new(kmer_size);
    thread_reference(&mut graph, ref_seq, &options.assembler)?;

    let mut threaded: usize = 0;
    for segment in segments.iter() {
        match thread_read(&mut graph, segment.seq(), segment.quals(), segment.read_id(), &options.assembler) {
            Ok(()) => {
                threaded += 1;
            },
            Err(GraphError::ReadTooShort(len, k)) => {
                trace!("Skipping segment of read {:?}: length {} < k {}", segment.name(), len, k);
            },
            Err(e) => {
                return Err(e);
            }
        };
    }
    trace!(
        "Region {}:{}-{} k={}: threaded {} of {} segments, {} vertices, {} edges",
        region.chrom(), region.start(), region.end(), kmer_size,
        threaded, segments.len(), graph.vertex_count(), graph.edge_count()
    );

    prune_low_weight_edges(&mut graph, options.assembler.threshold);
    prune_dead_ends(&mut graph);
    if options.paired_threshold > 0 {
        connect_reads_by_pairs(&mut graph, options.pair_read_distance, options.paired_threshold)?;
        recompute_weights(&mut graph);
        prune_unsupported_edges(&mut graph);
        prune_dead_ends(&mut graph);
    }

    if let Some(dir) = options.dot_dir.as_ref() {
        if let Err(e) = dump_dot(&graph, dir, region) {
            warn!("Failed to write DOT dump for {}:{}-{}: {}", region.chrom(), region.start(), region.end(), e);
        }
    }

    let aligner = SswAligner::default();
    extract_variants(&mut graph, &aligner, region.chrom(), region.start() as u64, &options.extractor)
}

/// Calls variants in one region, walking the k-mer retry ladder when the
/// region is too repetitive or too tangled at the current size.
pub fn call_region(
    region: &ActiveRegion,
    reference: &ReferenceGenome,
    reads: &ReadCollection,
    options: &CallerOptions
) -> GraphResult<Vec<VariantCall>> {
    let ref_seq = reference.get_slice(region.chrom(), region.start(), region.end());
    let segments = reads.overlapping(region.chrom(), region.start(), region.end());

    let mut kmer_size = options.kmer_size;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let failure = match assemble_region(region, ref_seq, &segments, kmer_size, options) {
            Ok(calls) => {
                return Ok(calls);
            },
            Err(e @ (GraphError::RefRepeats(_) | GraphError::TooComplex)) => e,
            Err(e) => {
                return Err(e);
            }
        };
        let next = kmer_size + options.kmer_step;
        if attempt >= options.max_kmer_attempts || next > options.max_kmer_size {
            return Err(failure);
        }
        debug!(
            "Region {}:{}-{} failed at k={} ({}), retrying with k={}",
            region.chrom(), region.start(), region.end(), kmer_size, failure, next
        );
        kmer_size = next;
    }
}

/// Merges per-region calls: sorts by site and drops duplicate sites from
/// overlapping windows, keeping the best-supported call at each.
pub fn merge_calls(mut calls: Vec<VariantCall>) -> Vec<VariantCall> {
    calls.sort_by(|a, b| {
        a.site_key().cmp(&b.site_key())
            .then(b.alt_weight().cmp(&a.alt_weight()))
    });
    calls.dedup_by(|a, b| a.site_key() == b.site_key());
    calls
}

/// Merges, phases, and filters the combined call set.
pub fn finalize_calls(calls: Vec<VariantCall>, phaser: &PhaserOptions) -> Vec<VariantCall> {
    let mut merged = merge_calls(calls);
    phase_variants(&mut merged, phaser);
    merged.retain(|call| call.is_valid());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::reads::parse_reads;
    use crate::data_types::variants::PhaseType;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn write_reference(name: &str, sequence: &str) -> ReferenceGenome {
        let path: PathBuf = std::env::temp_dir().join(name);
        std::fs::write(&path, format!(">chr1\n{}\n", sequence)).unwrap();
        ReferenceGenome::from_fasta(&path).unwrap()
    }

    fn reads_from_lines(lines: &[String]) -> ReadCollection {
        parse_reads(Cursor::new(lines.join("\n"))).unwrap()
    }

    fn sam_line(name: &str, pos: usize, seq: &str) -> String {
        let quals: String = "I".repeat(seq.len());
        format!("{}\t0\tchr1\t{}\t60\t{}M\t*\t0\t0\t{}\t{}", name, pos, seq.len(), seq, quals)
    }

    fn test_options(kmer_size: u32) -> CallerOptions {
        CallerOptions {
            kmer_size,
            assembler: AssemblerOptions {
                threshold: 1,
                ..Default::default()
            },
            paired_threshold: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_substitution_call_end_to_end() {
        let reference = write_reference("kmervar_pipeline_sub.fa", "AAACGTTT");
        let reads = reads_from_lines(&[
            sam_line("read1", 1, "AAAGGTTT"),
            sam_line("read2", 1, "AAAGGTTT")
        ]);
        let region = crate::region_gen::generate_regions(&reference, 100, 50, 3)
            .into_iter()
            .next()
            .unwrap();
        let options = test_options(3);
        let calls = call_region(&region, &reference, &reads, &options).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].position(), 4);
        assert_eq!(calls[0].ref_allele(), b"C");
        assert_eq!(calls[0].alt_allele(), b"G");
        assert_eq!(calls[0].alt_reads(), &[0, 1]);

        let finalized = finalize_calls(calls, &options.phaser);
        assert_eq!(finalized.len(), 1);
        // no reference-supporting reads, so the alternate is on both haplotypes
        assert_eq!(finalized[0].phase_type(), PhaseType::BothAlt);
        assert_eq!(finalized[0].phase_type().genotype(), "1|1");
    }

    #[test]
    fn test_kmer_retry_ladder() {
        // at k=3 the CGT window repeats past the cap; k=13 resolves it
        let reference = write_reference("kmervar_pipeline_retry.fa", &"ACGT".repeat(12));
        let reads = reads_from_lines(&[]);
        let region = crate::region_gen::generate_regions(&reference, 100, 50, 3)
            .into_iter()
            .next()
            .unwrap();
        let options = test_options(3);
        let calls = call_region(&region, &reference, &reads, &options).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn test_kmer_retry_exhaustion() {
        let reference = write_reference("kmervar_pipeline_exhaust.fa", &"ACGT".repeat(12));
        let reads = reads_from_lines(&[]);
        let region = crate::region_gen::generate_regions(&reference, 100, 50, 3)
            .into_iter()
            .next()
            .unwrap();
        let options = CallerOptions {
            max_kmer_size: 3,
            ..test_options(3)
        };
        assert!(matches!(
            call_region(&region, &reference, &reads, &options),
            Err(GraphError::RefRepeats(_))
        ));
    }

    #[test]
    fn test_merge_deduplicates_sites() {
        let call = |weight: u64| VariantCall::new(
            "chr1".to_string(), 100,
            b"A".to_vec(), b"C".to_vec(), 60,
            1, weight, vec![], vec![0]
        );
        let merged = merge_calls(vec![call(2), call(5), call(3)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].alt_weight(), 5);
    }
}
