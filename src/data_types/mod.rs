
/// SAM alignment loading and read segments
pub mod reads;
/// Wrapper for an in-memory reference genome
pub mod reference_genome;
/// Contains the VariantCall type and phase definitions
pub mod variants;
