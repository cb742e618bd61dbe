
/// Phase assignment of a heterozygous call, filled in by the phaser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PhaseType {
    /// Unphased.
    #[default]
    None,
    /// The alternate allele sits on the second haplotype.
    OneTwo,
    /// The alternate allele sits on the first haplotype.
    TwoOne,
    /// No discriminating evidence; the alternate is on both haplotypes.
    BothAlt
}

impl PhaseType {
    /// The VCF genotype string for this assignment.
    pub fn genotype(&self) -> &'static str {
        match self {
            PhaseType::None => "0/1",
            PhaseType::OneTwo => "0|1",
            PhaseType::TwoOne => "1|0",
            PhaseType::BothAlt => "1|1"
        }
    }
}

/// One called variant with its read-level evidence.
#[derive(Clone, Debug)]
pub struct VariantCall {
    chrom: String,
    /// 1-based reference position of the first REF base.
    position: u64,
    ref_allele: Vec<u8>,
    alt_allele: Vec<u8>,
    quality: u8,
    ref_weight: u64,
    alt_weight: u64,
    /// Sorted indices of reads supporting the reference allele.
    ref_reads: Vec<usize>,
    /// Sorted indices of reads supporting the alternate allele.
    alt_reads: Vec<usize>,
    valid: bool,
    phase_group: Option<u64>,
    phase_type: PhaseType
}

impl VariantCall {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chrom: String, position: u64,
        ref_allele: Vec<u8>, alt_allele: Vec<u8>, quality: u8,
        ref_weight: u64, alt_weight: u64,
        mut ref_reads: Vec<usize>, mut alt_reads: Vec<usize>
    ) -> VariantCall {
        ref_reads.sort_unstable();
        ref_reads.dedup();
        alt_reads.sort_unstable();
        alt_reads.dedup();
        VariantCall {
            chrom,
            position,
            ref_allele,
            alt_allele,
            quality,
            ref_weight,
            alt_weight,
            ref_reads,
            alt_reads,
            valid: true,
            phase_group: None,
            phase_type: PhaseType::None
        }
    }

    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn ref_allele(&self) -> &[u8] {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &[u8] {
        &self.alt_allele
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn ref_weight(&self) -> u64 {
        self.ref_weight
    }

    pub fn alt_weight(&self) -> u64 {
        self.alt_weight
    }

    pub fn ref_reads(&self) -> &[usize] {
        &self.ref_reads
    }

    pub fn alt_reads(&self) -> &[usize] {
        &self.alt_reads
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn phase_group(&self) -> Option<u64> {
        self.phase_group
    }

    pub fn phase_type(&self) -> PhaseType {
        self.phase_type
    }

    pub fn set_phase(&mut self, group: u64, phase_type: PhaseType) {
        self.phase_group = Some(group);
        self.phase_type = phase_type;
    }

    /// Sort/merge identity across overlapping region windows.
    pub fn site_key(&self) -> (String, u64, Vec<u8>, Vec<u8>) {
        (self.chrom.clone(), self.position, self.ref_allele.clone(), self.alt_allele.clone())
    }
}
