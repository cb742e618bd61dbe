
use flate2::bufread::MultiGzDecoder;
use log::{debug, info, warn};
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// SAM flag bits that disqualify an alignment record.
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_DUPLICATE: u16 = 0x400;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// Base quality assigned when the record carries no quality string.
const MISSING_QUALITY: u8 = 30;

/// One mapped read segment with soft clips already stripped. Mates from
/// the same template share a `read_id`, which is the identity the graph
/// evidence sets are keyed on.
pub struct SequencedRead {
    name: String,
    read_id: usize,
    chrom: String,
    /// 0-based leftmost reference position.
    ref_start: usize,
    /// Number of reference bases the alignment spans.
    ref_span: usize,
    seq: Vec<u8>,
    quals: Vec<u8>
}

impl SequencedRead {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_id(&self) -> usize {
        self.read_id
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn ref_start(&self) -> usize {
        self.ref_start
    }

    /// 0-based exclusive end of the reference span.
    pub fn ref_end(&self) -> usize {
        self.ref_start + self.ref_span
    }

    pub fn seq(&self) -> &[u8] {
        &self.seq
    }

    pub fn quals(&self) -> &[u8] {
        &self.quals
    }
}

/// All usable read segments from one alignment file.
pub struct ReadCollection {
    segments: Vec<SequencedRead>,
    /// Number of distinct templates observed.
    read_count: usize
}

impl ReadCollection {
    pub fn segments(&self) -> &[SequencedRead] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Segments whose reference span overlaps [start, end).
    pub fn overlapping(&self, chrom: &str, start: usize, end: usize) -> Vec<&SequencedRead> {
        self.segments.iter()
            .filter(|segment| segment.chrom == chrom && segment.ref_start < end && segment.ref_end() > start)
            .collect()
    }
}

/// One parsed CIGAR operation.
fn parse_cigar(cigar: &str) -> Result<Vec<(usize, u8)>, Box<dyn std::error::Error>> {
    if cigar == "*" {
        return Ok(vec![]);
    }
    let mut ops: Vec<(usize, u8)> = vec![];
    let mut length: usize = 0;
    for c in cigar.chars() {
        if c.is_ascii_digit() {
            length = length * 10 + (c as usize - '0' as usize);
        } else {
            if length == 0 {
                bail!("malformed CIGAR string: {:?}", cigar);
            }
            ops.push((length, c as u8));
            length = 0;
        }
    }
    if length != 0 {
        bail!("malformed CIGAR string: {:?}", cigar);
    }
    Ok(ops)
}

fn reference_span(ops: &[(usize, u8)]) -> usize {
    ops.iter()
        .filter(|(_, op)| matches!(op, b'M' | b'D' | b'N' | b'=' | b'X'))
        .map(|(length, _)| length)
        .sum()
}

/// Lengths of the leading and trailing soft clips.
fn soft_clips(ops: &[(usize, u8)]) -> (usize, usize) {
    let mut iter = ops.iter().filter(|(_, op)| *op != b'H');
    let leading = match iter.next() {
        Some(&(length, b'S')) => length,
        _ => 0
    };
    let trailing = match iter.last() {
        Some(&(length, b'S')) if ops.iter().filter(|(_, op)| *op != b'H').count() > 1 => length,
        _ => 0
    };
    (leading, trailing)
}

/// Parses SAM text from any buffered reader; header lines are skipped.
pub fn parse_reads<R: BufRead>(reader: R) -> Result<ReadCollection, Box<dyn std::error::Error>> {
    let mut segments: Vec<SequencedRead> = vec![];
    let mut ids_by_name: HashMap<String, usize> = Default::default();
    let mut skipped: usize = 0;

    for (line_number, entry) in reader.lines().enumerate() {
        let line = entry?;
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 11 {
            bail!("alignment line {} has {} fields, expected at least 11", line_number + 1, fields.len());
        }
        let flag: u16 = fields[1].parse()?;
        if flag & (FLAG_UNMAPPED | FLAG_SECONDARY | FLAG_DUPLICATE | FLAG_SUPPLEMENTARY) != 0 {
            skipped += 1;
            continue;
        }
        if fields[9] == "*" {
            skipped += 1;
            continue;
        }

        let position: usize = fields[3].parse()?;
        if position == 0 {
            skipped += 1;
            continue;
        }
        let ops = parse_cigar(fields[5])?;
        let (leading, trailing) = soft_clips(&ops);

        let mut seq: Vec<u8> = fields[9].as_bytes().to_ascii_uppercase();
        let mut quals: Vec<u8> = if fields[10] == "*" {
            vec![MISSING_QUALITY; seq.len()]
        } else {
            fields[10].bytes().map(|q| q.saturating_sub(33)).collect()
        };
        if quals.len() != seq.len() {
            bail!("alignment line {} has mismatched SEQ and QUAL lengths", line_number + 1);
        }
        if leading + trailing >= seq.len() {
            skipped += 1;
            continue;
        }
        seq.drain(seq.len() - trailing..);
        seq.drain(..leading);
        quals.drain(quals.len() - trailing..);
        quals.drain(..leading);

        let name = fields[0].to_string();
        let next_id = ids_by_name.len();
        let read_id = *ids_by_name.entry(name.clone()).or_insert(next_id);
        segments.push(SequencedRead {
            name,
            read_id,
            chrom: fields[2].to_string(),
            ref_start: position - 1,
            ref_span: reference_span(&ops),
            seq,
            quals
        });
    }

    if skipped > 0 {
        debug!("Skipped {} unusable alignment records.", skipped);
    }
    let read_count = ids_by_name.len();
    Ok(ReadCollection {
        segments,
        read_count
    })
}

/// Loads read segments from a SAM file, gzip allowed. Unmapped,
/// secondary, supplementary, and duplicate records are dropped.
/// # Arguments
/// * `sam_fn` - the SAM filename
/// # Errors
/// File errors and malformed alignment lines are passed through.
pub fn load_sam(sam_fn: &Path) -> Result<ReadCollection, Box<dyn std::error::Error>> {
    info!("Loading {:?}...", sam_fn);
    let sam_file = std::fs::File::open(sam_fn)?;
    let file_reader = BufReader::new(sam_file);
    let collection = if sam_fn.extension().unwrap_or_default() == "gz" {
        let gz_decoder = MultiGzDecoder::new(file_reader);
        parse_reads(BufReader::new(gz_decoder))?
    } else {
        parse_reads(file_reader)?
    };
    if collection.is_empty() {
        warn!("No usable alignment records found in {:?}.", sam_fn);
    } else {
        info!("Finished loading {} segments from {} templates.", collection.len(), collection.read_count());
    }
    Ok(collection)
}
