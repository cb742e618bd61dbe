
use clap::Parser;
use chrono::Datelike;
use lazy_static::lazy_static;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

use crate::assembler::AssemblerOptions;
use crate::pipeline::CallerOptions;

lazy_static! {
    /// Stores the full version string we plan to use.
    /// # Examples
    /// * `0.1.0-6bb9635-dirty` - while on a dirty branch
    /// * `0.1.0-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Clone, Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about,
    after_help = format!("Copyright (C) {}
This program comes with ABSOLUTELY NO WARRANTY; it is intended for
Research Use Only and not for use in diagnostic procedures.", chrono::Utc::now().year()))]
pub struct Settings {
    /// Reference FASTA file, gzip allowed
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_filename: PathBuf,

    /// Input alignment file in SAM format, gzip allowed
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "alignments")]
    #[clap(value_name = "SAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub sam_filename: PathBuf,

    /// Output variant file in VCF format
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-vcf")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_vcf_filename: PathBuf,

    /// Sample name reported in the VCF header
    #[clap(short = 's')]
    #[clap(long = "sample-name")]
    #[clap(value_name = "SAMPLE")]
    #[clap(default_value = "SAMPLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub sample_name: String,

    /// Directory for per-region DOT graph dumps (debug only)
    #[clap(long = "dot-dir")]
    #[clap(value_name = "DIR")]
    #[clap(hide = true)]
    #[clap(help_heading = Some("Input/Output"))]
    pub dot_dir: Option<PathBuf>,

    /// Number of threads to use for region assembly
    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Sets the initial k-mer size for graph assembly
    #[clap(short = 'k')]
    #[clap(long = "kmer-size")]
    #[clap(value_name = "SIZE")]
    #[clap(default_value = "21")]
    #[clap(help_heading = Some("Assembly"))]
    pub kmer_size: u32,

    /// Sets the largest k-mer size the retry ladder may reach
    #[clap(long = "max-kmer-size")]
    #[clap(value_name = "SIZE")]
    #[clap(default_value = "81")]
    #[clap(help_heading = Some("Assembly"))]
    pub max_kmer_size: u32,

    /// Sets the minimum read coverage for an edge to survive pruning
    #[clap(long = "min-coverage")]
    #[clap(value_name = "COVERAGE")]
    #[clap(default_value = "4")]
    #[clap(help_heading = Some("Assembly"))]
    pub min_coverage: i64,

    /// Sets the disambiguation penalty per skipped reference edge
    #[clap(long = "missing-edge-penalty")]
    #[clap(value_name = "PENALTY")]
    #[clap(default_value = "3")]
    #[clap(help_heading = Some("Assembly"))]
    pub missing_edge_penalty: u64,

    /// Sets the disambiguation penalty for a backward reference jump
    #[clap(long = "backward-penalty")]
    #[clap(value_name = "PENALTY")]
    #[clap(default_value = "8")]
    #[clap(help_heading = Some("Assembly"))]
    pub backward_penalty: u64,

    /// Sets the assembly window size in bases
    #[clap(long = "region-size")]
    #[clap(value_name = "LENGTH")]
    #[clap(default_value = "2000")]
    #[clap(help_heading = Some("Assembly"))]
    pub region_size: usize,

    /// Sets the step between consecutive assembly windows
    #[clap(long = "region-step")]
    #[clap(value_name = "LENGTH")]
    #[clap(default_value = "1500")]
    #[clap(help_heading = Some("Assembly"))]
    pub region_step: usize,

    /// Sets the paired-read evidence needed to bridge a junction, 0 disables bridging
    #[clap(long = "paired-threshold")]
    #[clap(value_name = "READS")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Assembly"))]
    pub paired_threshold: i64
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
fn check_required_filename(filename: &Path, label: &str) {
    if !filename.exists() {
        error!("{} does not exist: \"{}\"", label, filename.display());
        std::process::exit(exitcode::NOINPUT);
    } else {
        info!("{}: \"{}\"", label, filename.display());
    }
}

impl Settings {
    /// Wrapper function to build the region-calling configuration from our CLI settings
    pub fn caller_options(&self) -> CallerOptions {
        CallerOptions {
            kmer_size: self.kmer_size,
            max_kmer_size: self.max_kmer_size,
            assembler: AssemblerOptions {
                threshold: self.min_coverage,
                missing_edge_penalty: self.missing_edge_penalty,
                backward_penalty: self.backward_penalty,
                ..Default::default()
            },
            paired_threshold: self.paired_threshold,
            dot_dir: self.dot_dir.clone(),
            ..Default::default()
        }
    }
}

pub fn get_raw_settings() -> Settings {
    Settings::parse()
}

/// Do some additional checks here, we may increase these as we go.
/// Also can modify settings if needed since we're passing it around.
/// # Arguments
/// * `settings` - the raw settings, nothing has been checked other than what clap does for us.
pub fn check_settings(mut settings: Settings) -> Settings {
    check_required_filename(&settings.reference_filename, "Reference file");
    check_required_filename(&settings.sam_filename, "Alignment file");
    info!("Output variant file: \"{}\"", settings.output_vcf_filename.display());

    if settings.kmer_size < 3 {
        error!("--kmer-size must be at least 3");
        std::process::exit(exitcode::USAGE);
    }
    if settings.max_kmer_size < settings.kmer_size {
        warn!("--max-kmer-size is below --kmer-size, raising it to {}", settings.kmer_size);
        settings.max_kmer_size = settings.kmer_size;
    }
    if settings.region_step == 0 || settings.region_step > settings.region_size {
        error!("--region-step must be in the range [1, --region-size]");
        std::process::exit(exitcode::USAGE);
    }
    if settings.region_size <= settings.kmer_size as usize {
        error!("--region-size must be larger than --kmer-size");
        std::process::exit(exitcode::USAGE);
    }
    // 0 doesn't make sense, so lets just error proof it up to 1
    if settings.min_coverage == 0 {
        settings.min_coverage = 1;
    }

    info!("Assembly:");
    info!("\tk-mer size: {} (max {})", settings.kmer_size, settings.max_kmer_size);
    info!("\tMinimum coverage: {}", settings.min_coverage);
    info!("\tRegion size / step: {} / {}", settings.region_size, settings.region_step);
    if settings.paired_threshold > 0 {
        info!("\tPaired bridging threshold: {}", settings.paired_threshold);
    } else {
        info!("\tPaired bridging: DISABLED");
    }
    info!("Processing threads: {}", settings.threads);

    settings
}
