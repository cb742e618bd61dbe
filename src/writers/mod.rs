
/// Contains the writer for VCF output
pub mod vcf_writer;
