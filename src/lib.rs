
/// Semi-global aligner producing full-consumption operation strings
pub mod aligner;
/// Threads the reference window and reads into the de Bruijn graph
pub mod assembler;
/// CLI functionality and checks
pub mod cli;
/// Contains multiple wrappers for useful data types in kmervar
pub mod data_types;
/// Error taxonomy shared across the graph machinery
pub mod errors;
/// The de Bruijn graph itself: vertices, edges, and their upkeep
pub mod graph;
/// Sliding k-mer windows with repeat disambiguators
pub mod kmer;
/// Open-addressing hash tables with insertion-order tracking
pub mod kmer_table;
/// Organizes the primary workflow for one region, from graph build to variant calls
pub mod pipeline;
/// Read evidence sets attached to graph edges
pub mod read_info;
/// Splits contigs into overlapping assembly windows
pub mod region_gen;
/// Graph cleanup passes: elision, pruning, and paired-read bridging
pub mod simplifier;
/// Bubble detection, collapse, and conversion into variant calls
pub mod variant_extractor;
/// Two-haplotype phasing over the called variants
pub mod variant_graph;
/// Contains all the various output writer functionality
pub mod writers;
