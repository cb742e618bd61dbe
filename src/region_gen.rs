
use crate::data_types::reference_genome::ReferenceGenome;

use log::debug;

/// One assembly window on a contig, covering only unambiguous bases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveRegion {
    chrom: String,
    /// 0-based inclusive start.
    start: usize,
    /// 0-based exclusive end.
    end: usize
}

impl ActiveRegion {
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn is_unambiguous(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// Maximal runs of pure ACGT within a contig, as (start, end) pairs.
fn unambiguous_runs(sequence: &[u8]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = vec![];
    let mut run_start: Option<usize> = None;
    for (i, &base) in sequence.iter().enumerate() {
        if is_unambiguous(base) {
            if run_start.is_none() {
                run_start = Some(i);
            }
        } else if let Some(start) = run_start.take() {
            runs.push((start, i));
        }
    }
    if let Some(start) = run_start {
        runs.push((start, sequence.len()));
    }
    runs
}

/// Splits every contig into overlapping assembly windows. Ambiguous bases
/// break a contig into independent runs first; each run then yields
/// windows of `region_size` advancing by `region_step`, the last one
/// truncated at the run end. Runs shorter than `min_length` are skipped.
pub fn generate_regions(
    reference: &ReferenceGenome,
    region_size: usize,
    region_step: usize,
    min_length: usize
) -> Vec<ActiveRegion> {
    assert!(region_step > 0 && region_step <= region_size);
    let mut regions: Vec<ActiveRegion> = vec![];
    for chrom in reference.contig_names().iter() {
        let contig_length = reference.contig_length(chrom).unwrap_or(0);
        let sequence = reference.get_slice(chrom, 0, contig_length);
        for &(run_start, run_end) in unambiguous_runs(sequence).iter() {
            if run_end - run_start < min_length {
                continue;
            }
            let mut start = run_start;
            loop {
                let end = (start + region_size).min(run_end);
                regions.push(ActiveRegion {
                    chrom: chrom.clone(),
                    start,
                    end
                });
                if end == run_end {
                    break;
                }
                start += region_step;
            }
        }
    }
    debug!("Generated {} active regions.", regions.len());
    regions
}
