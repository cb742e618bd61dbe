
use crate::cli::FULL_VERSION;
use crate::data_types::reference_genome::ReferenceGenome;
use crate::data_types::variants::VariantCall;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes the final call set as VCF text, gzip allowed. Records are
/// grouped by contig in reference order; phased calls carry a PS tag.
/// # Arguments
/// * `vcf_fn` - the output filename
/// * `reference` - supplies the contig lines
/// * `sample_name` - the single sample column name
/// * `calls` - the finalized calls, sorted by chromosome and position
/// # Errors
/// File creation and write errors are passed through.
pub fn write_vcf(
    vcf_fn: &Path,
    reference: &ReferenceGenome,
    sample_name: &str,
    calls: &[VariantCall]
) -> Result<(), Box<dyn std::error::Error>> {
    let vcf_file = std::fs::File::create(vcf_fn)?;
    let mut writer: Box<dyn Write> = if vcf_fn.extension().unwrap_or_default() == "gz" {
        Box::new(BufWriter::new(GzEncoder::new(vcf_file, Compression::default())))
    } else {
        Box::new(BufWriter::new(vcf_file))
    };

    writeln!(writer, "##fileformat=VCFv4.2")?;
    writeln!(writer, "##source=kmervar {}", &**FULL_VERSION)?;
    for chrom in reference.contig_names().iter() {
        let length = reference.contig_length(chrom).unwrap_or(0);
        writeln!(writer, "##contig=<ID={},length={}>", chrom, length)?;
    }
    writeln!(writer, "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">")?;
    writeln!(writer, "##FORMAT=<ID=PS,Number=1,Type=Integer,Description=\"Phase set identifier\">")?;
    writeln!(writer, "##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allele weights in the assembly graph\">")?;
    writeln!(writer, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{}", sample_name)?;

    let mut written: usize = 0;
    for chrom in reference.contig_names().iter() {
        for call in calls.iter().filter(|c| c.chrom() == chrom.as_str()) {
            let ref_allele = String::from_utf8_lossy(call.ref_allele());
            let alt_allele = String::from_utf8_lossy(call.alt_allele());
            let genotype = call.phase_type().genotype();
            let (format, sample) = match call.phase_group() {
                Some(group) => (
                    "GT:PS:AD",
                    format!("{}:{}:{},{}", genotype, group, call.ref_weight(), call.alt_weight())
                ),
                None => (
                    "GT:AD",
                    format!("{}:{},{}", genotype, call.ref_weight(), call.alt_weight())
                )
            };
            writeln!(
                writer,
                "{}\t{}\t.\t{}\t{}\t{}\tPASS\t.\t{}\t{}",
                chrom, call.position(), ref_allele, alt_allele, call.quality(), format, sample
            )?;
            written += 1;
        }
    }
    writer.flush()?;
    info!("Wrote {} variant records to {:?}.", written, vcf_fn);
    Ok(())
}
