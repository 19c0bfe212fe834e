use anyhow::Result;
use log::{error, info, trace, warn};
use std::fs::File;
use std::io::Write;
use std::time::Instant;

// Define modules used by main
mod backend;
mod cells;
mod diffusion;
mod forces;
mod graph;
mod grid;
mod simulation;
mod state;
#[cfg(test)]
mod testutil;

use simulation::ColonySimulation;
use stemcell_common::SimulationConfig;

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting stem-cell colony engine...");

    // --- Load Configuration ---
    let config = SimulationConfig::load("config.toml")?;

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    info!("Initializing simulation state...");
    let mut sim = ColonySimulation::new(config)?;
    info!("State initialized with {} cells.", sim.current_cell_count());
    log::debug!("Simulation parameters: {:#?}", sim.params());

    // --- Simulation Loop ---
    let total_steps = sim.config().timing.end_step;
    let record_interval_steps = sim.config().timing.snapshot_interval_steps.max(1);
    info!(
        "Recording snapshot every {} steps ({:.1} seconds of simulated time).",
        record_interval_steps,
        record_interval_steps as f32 * sim.params().step_dt
    );

    info!("Starting simulation loop for {} steps...", total_steps);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    // --- Initial Snapshot (step = 0) ---
    sim.record_snapshot();

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        if let Err(e) = sim.step() {
            error!("Error during simulation step {}: {}", step + 1, e);
            anyhow::bail!("Simulation step failed.");
        }
        let step_duration = step_start_time.elapsed();

        // Print status periodically
        let current_time = Instant::now();
        let print_interval_secs = 5.0;
        let should_print_status =
            current_time.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs;
        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step == total_steps - 1;

        if should_print_status || is_record_step || is_last_step {
            let elapsed_total = start_time.elapsed();
            info!(
                "Step [{}/{}] ({:.1} h) | Cells: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                (step + 1) as f32 * sim.params().step_dt / 3600.0,
                sim.current_cell_count(),
                step_duration.as_secs_f64() * 1000.0,
                elapsed_total.as_secs_f64()
            );
            previous_print_time = current_time;

            if is_record_step || is_last_step {
                sim.record_snapshot();
            }
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms",
                step + 1,
                total_steps,
                step_duration.as_secs_f64() * 1000.0
            );
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    // --- Save Recorded Data ---
    if sim.config().output.save_snapshots {
        info!("Saving recorded data...");
        let output_format = sim.config().output.format.as_deref().unwrap_or("json");
        let snapshots = sim.get_recorded_snapshots();

        match output_format {
            "json" => {
                let filename = format!("{}_snapshots.json", sim.config().output.base_filename);
                match File::create(&filename) {
                    Ok(mut file) => match serde_json::to_string(snapshots) {
                        Ok(json_string) => {
                            if let Err(e) = file.write_all(json_string.as_bytes()) {
                                error!("Error writing snapshot JSON to file '{}': {}", filename, e);
                            } else {
                                info!("All snapshots saved to {}", filename);
                            }
                        }
                        Err(e) => error!("Error serializing snapshots to JSON: {}", e),
                    },
                    Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
                }
            }
            "bincode" => {
                let filename = format!("{}_snapshots.bin", sim.config().output.base_filename);
                match File::create(&filename) {
                    Ok(file) => match bincode::serialize_into(file, snapshots) {
                        Ok(_) => info!("All snapshots saved to {} (binary format)", filename),
                        Err(e) => error!("Error serializing snapshots to bincode: {}", e),
                    },
                    Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
                }
            }
            "messagepack" => {
                let filename = format!("{}_snapshots.msgpack", sim.config().output.base_filename);
                match &mut File::create(&filename) {
                    Ok(file) => match rmp_serde::encode::write(file, snapshots) {
                        Ok(_) => info!("All snapshots saved to {} (MessagePack format)", filename),
                        Err(e) => error!("Error serializing snapshots to MessagePack: {}", e),
                    },
                    Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
                }
            }
            other => {
                warn!("Unknown output format '{}'. Falling back to JSON.", other);
                let filename = format!("{}_snapshots.json", sim.config().output.base_filename);
                match File::create(&filename) {
                    Ok(mut file) => match serde_json::to_string(snapshots) {
                        Ok(json_string) => {
                            if let Err(e) = file.write_all(json_string.as_bytes()) {
                                error!("Error writing snapshot JSON to file '{}': {}", filename, e);
                            } else {
                                info!("All snapshots saved to {}", filename);
                            }
                        }
                        Err(e) => error!("Error serializing snapshots to JSON: {}", e),
                    },
                    Err(e) => error!("Error creating snapshot file '{}': {}", filename, e),
                }
            }
        }
    } else {
        info!("Skipping saving snapshots as per config (save_snapshots is false).");
    }

    // Save the final cell table if requested (separate from full snapshots)
    if sim.config().output.save_final_cells {
        let final_cells = sim.get_results();
        let filename = format!("{}_final_cells.csv", sim.config().output.base_filename);

        match csv::Writer::from_path(&filename) {
            Ok(mut writer) => {
                writer.write_record(["x_m", "y_m", "z_m", "radius_m", "phenotype"])?;
                for (location, radius, phenotype) in final_cells {
                    writer.write_record(&[
                        format!("{:.6e}", location[0]),
                        format!("{:.6e}", location[1]),
                        format!("{:.6e}", location[2]),
                        format!("{:.6e}", radius),
                        phenotype.to_string(),
                    ])?;
                }
                writer.flush()?;
                info!("Final cell table saved to {}", filename);
            }
            Err(e) => error!("Error saving CSV file '{}': {}", filename, e),
        }
    } else {
        info!("Skipping saving the final cell table as per config.");
    }

    info!("Simulation complete.");
    Ok(())
}
