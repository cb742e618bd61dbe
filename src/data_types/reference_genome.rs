
use bio::io::fasta;
use flate2::bufread::MultiGzDecoder;
use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;
use simple_error::bail;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// In-memory reference genome with contigs kept in file order.
pub struct ReferenceGenome {
    filename: PathBuf,
    contig_names: Vec<String>,
    contig_map: HashMap<String, Vec<u8>>
}

impl ReferenceGenome {
    /// Loads a reference genome from a FASTA file, gzip allowed.
    /// # Arguments
    /// * `fasta_fn` - the FASTA filename
    /// # Errors
    /// Any file or record reading error is passed through, and an empty
    /// FASTA is rejected.
    pub fn from_fasta(fasta_fn: &Path) -> Result<ReferenceGenome, Box<dyn std::error::Error>> {
        info!("Loading {:?}...", fasta_fn);
        let mut contig_names: Vec<String> = Default::default();
        let mut contig_map: HashMap<String, Vec<u8>> = Default::default();

        let fasta_file = std::fs::File::open(fasta_fn)?;
        let file_reader = BufReader::new(fasta_file);
        let fasta_reader: fasta::Reader<Box<dyn BufRead>> = if fasta_fn.extension().unwrap_or_default() == "gz" {
            debug!("Detected gzip extension, loading reference with MultiGzDecoder...");
            let gz_decoder = MultiGzDecoder::new(file_reader);
            fasta::Reader::from_bufread(Box::new(BufReader::new(gz_decoder)))
        } else {
            fasta::Reader::from_bufread(Box::new(file_reader))
        };

        for entry in fasta_reader.records() {
            let record: fasta::Record = entry?;
            let name: String = record.id().to_string();
            let sequence: Vec<u8> = record.seq().to_ascii_uppercase();
            contig_names.push(name.clone());
            contig_map.insert(name, sequence);
        }
        if contig_names.is_empty() {
            bail!("no contigs found in {:?}", fasta_fn);
        }
        info!("Finished loading {} contigs.", contig_names.len());

        Ok(ReferenceGenome {
            filename: fasta_fn.to_path_buf(),
            contig_names,
            contig_map
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Contig names in the order they appeared in the file.
    pub fn contig_names(&self) -> &[String] {
        &self.contig_names
    }

    pub fn contig_length(&self, chromosome: &str) -> Option<usize> {
        self.contig_map.get(chromosome).map(|seq| seq.len())
    }

    /// Retrieves a reference slice by 0-based half-open coordinates.
    /// Coordinates past the contig end are truncated.
    /// # Panics
    /// * if `chromosome` was not in the FASTA file
    /// * if `start` > `end`
    pub fn get_slice(&self, chromosome: &str, start: usize, end: usize) -> &[u8] {
        let full_contig = self.contig_map.get(chromosome).expect("a chromosome from the reference file");
        assert!(start <= end, "start > end: {start} > {end}");
        let truncated_start = start.min(full_contig.len());
        let truncated_end = end.min(full_contig.len());
        &full_contig[truncated_start..truncated_end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fasta(suffix: &str, gzip: bool) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kmervar_ref_{}", suffix));
        let text = b">chr1\nACGTACGT\n>chr2\nACCATGTA\n";
        if gzip {
            let file = std::fs::File::create(&path).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(text).unwrap();
            encoder.finish().unwrap();
        } else {
            std::fs::write(&path, text).unwrap();
        }
        path
    }

    #[test]
    fn test_simple_reference() {
        let references = vec![
            write_fasta("plain.fa", false),
            write_fasta("compressed.fa.gz", true)
        ];
        for reference_fn in references.iter() {
            let reference_genome = ReferenceGenome::from_fasta(reference_fn).unwrap();

            assert_eq!(reference_genome.contig_names(), &[
                "chr1".to_string(),
                "chr2".to_string()
            ]);
            assert_eq!(reference_genome.contig_length("chr1"), Some(8));

            let chr1_string: Vec<u8> = "ACGTACGT".as_bytes().to_vec();
            for i in 0..8 {
                assert_eq!(reference_genome.get_slice("chr1", i, 8), &chr1_string[i..]);
            }
            // truncation past the contig end
            assert_eq!(reference_genome.get_slice("chr2", 6, 100), b"TA");
        }
    }

    #[test]
    fn test_empty_reference_rejected() {
        let path = std::env::temp_dir().join("kmervar_ref_empty.fa");
        std::fs::write(&path, b"").unwrap();
        assert!(ReferenceGenome::from_fasta(&path).is_err());
    }
}
