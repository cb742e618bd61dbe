
use kmervar::cli::{Settings, check_settings, get_raw_settings};
use kmervar::data_types::reads::ReadCollection;
use kmervar::data_types::reference_genome::ReferenceGenome;
use kmervar::data_types::variants::VariantCall;
use kmervar::errors::GraphResult;
use kmervar::pipeline::{CallerOptions, call_region, finalize_calls};
use kmervar::region_gen::{ActiveRegion, generate_regions};
use kmervar::writers::vcf_writer::write_vcf;

use log::{LevelFilter, debug, error, info, warn};
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

fn main() {
    // get the settings
    let settings: Settings = get_raw_settings();
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };

    // immediately setup logging first
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    // okay, now we can check all the other settings
    let cli_settings: Settings = check_settings(settings);
    let caller_options: CallerOptions = cli_settings.caller_options();

    let reference_genome: ReferenceGenome = match ReferenceGenome::from_fasta(&cli_settings.reference_filename) {
        Ok(rg) => rg,
        Err(e) => {
            error!("Error during reference loading: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    let read_collection: ReadCollection = match kmervar::data_types::reads::load_sam(&cli_settings.sam_filename) {
        Ok(rc) => rc,
        Err(e) => {
            error!("Error during alignment loading: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    // regions shorter than this cannot hold a full k-mer window plus a variant
    let min_region_length = cli_settings.kmer_size as usize + 2;
    let regions: Vec<ActiveRegion> = generate_regions(
        &reference_genome,
        cli_settings.region_size,
        cli_settings.region_step,
        min_region_length
    );
    info!("Generated {} assembly regions.", regions.len());

    // we have to do this because we need access to the reference genome later also
    let arc_reference_genome: Arc<ReferenceGenome> = Arc::new(reference_genome);
    let arc_read_collection: Arc<ReadCollection> = Arc::new(read_collection);
    let arc_caller_options: Arc<CallerOptions> = Arc::new(caller_options);

    let start_time: Instant = Instant::now();
    let mut all_calls: Vec<VariantCall> = vec![];
    let mut failed_regions: u64 = 0;
    let mut results_received: u64 = 0;

    // values related to printing
    const UPDATE_SPEED: u64 = 100;
    info!("Region assembly starting...");

    if cli_settings.threads <= 1 {
        for region in regions.iter() {
            debug!("region {:?}", region);
            let result = call_region(region, &arc_reference_genome, &arc_read_collection, &arc_caller_options);
            process_result(region, result, &mut all_calls, &mut failed_regions);
            results_received += 1;
            if results_received % UPDATE_SPEED == 0 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                info!("Received results for {} regions: {:.4} regions/sec", results_received, regions_per_sec);
            }
        }
    } else {
        //set up job configuration
        info!("Starting job pool with {} threads...", cli_settings.threads);
        let job_slots: u64 = 40 * cli_settings.threads as u64;
        let mut jobs_queued: u64 = 0;

        //we need to set up the multiprocessing components now
        let pool = ThreadPool::new(cli_settings.threads);
        let (tx, rx) = mpsc::channel();

        for region in regions.into_iter() {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            if jobs_queued - results_received >= job_slots {
                let (region, result): (ActiveRegion, GraphResult<Vec<VariantCall>>) = rx.recv().unwrap();
                process_result(&region, result, &mut all_calls, &mut failed_regions);
                results_received += 1;
                if results_received % UPDATE_SPEED == 0 {
                    let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                    let regions_per_sec: f64 = results_received as f64 / time_so_far;
                    info!("Received results for {} regions: {:.4} regions/sec", results_received, regions_per_sec);
                }
            }

            jobs_queued += 1;
            let tx = tx.clone();
            let arc_reference_genome = arc_reference_genome.clone();
            let arc_read_collection = arc_read_collection.clone();
            let arc_caller_options = arc_caller_options.clone();
            pool.execute(move || {
                let result = call_region(&region, &arc_reference_genome, &arc_read_collection, &arc_caller_options);
                tx.send((region, result)).expect("channel will be there waiting for the pool");
            });
        }

        while results_received < jobs_queued {
            // make sure no panics encountered so far
            if pool.panic_count() > 0 {
                error!("Panic detected in ThreadPool, check above for details.");
                std::process::exit(exitcode::SOFTWARE);
            }

            let (region, result): (ActiveRegion, GraphResult<Vec<VariantCall>>) = rx.recv().unwrap();
            process_result(&region, result, &mut all_calls, &mut failed_regions);
            results_received += 1;
            if results_received % UPDATE_SPEED == 0 || (jobs_queued - results_received) < cli_settings.threads as u64 {
                let time_so_far: f64 = start_time.elapsed().as_secs_f64();
                let regions_per_sec: f64 = results_received as f64 / time_so_far;
                info!("Received results for {} / {} regions: {:.4} regions/sec", results_received, jobs_queued, regions_per_sec);
            }
        }
    }

    if failed_regions > 0 {
        warn!("{} regions failed assembly and produced no calls.", failed_regions);
    }

    info!("All regions assembled, merging and phasing...");
    let final_calls: Vec<VariantCall> = finalize_calls(all_calls, &arc_caller_options.phaser);
    info!("{} variant calls after merging and phasing.", final_calls.len());

    match write_vcf(
        &cli_settings.output_vcf_filename,
        &arc_reference_genome,
        &cli_settings.sample_name,
        &final_calls
    ) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while writing VCF file: {}", e);
            std::process::exit(exitcode::IOERR);
        }
    };

    info!("All regions finished successfully after {} seconds.", start_time.elapsed().as_secs_f64());
}

/// Sub-routine to make sure we are always consistently processing results in an identical manner.
/// A failed region only costs its own calls; everything else proceeds.
/// # Arguments
/// * `region` - the region the result belongs to
/// * `result` - the calling result for that region
/// * `all_calls` - mutable reference to the combined call set
/// * `failed_regions` - mutable reference to the failure counter
fn process_result(
    region: &ActiveRegion,
    result: GraphResult<Vec<VariantCall>>,
    all_calls: &mut Vec<VariantCall>,
    failed_regions: &mut u64
) {
    match result {
        Ok(mut calls) => {
            all_calls.append(&mut calls);
        },
        Err(e) => {
            warn!("Region {}:{}-{} failed: {}", region.chrom(), region.start(), region.end(), e);
            *failed_regions += 1;
        }
    };
}
