use crate::diffusion::DiffusionField;
use crate::graph::{NearestCells, NeighborGraph, NO_CELL};
use crate::state::{CellState, Phenotype};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{UnitCircle, UnitSphere};
use stemcell_common::rules::{ERK, FGFR, GATA6, NANOG};
use stemcell_common::{GeneNetwork, SimParams, Vec3};

/// Division and removal requests collected during one state-machine pass,
/// applied by the pipeline before the motion phase.
#[derive(Debug, Default)]
pub struct StepQueues {
    pub divisions: Vec<u32>,
    pub removals: Vec<u32>,
}

/// Uniformly random direction: unit circle in planar mode, unit sphere in
/// volumetric mode.
pub fn random_unit_direction(rng: &mut StdRng, is_3d: bool) -> Vec3 {
    if is_3d {
        let [x, y, z]: [f32; 3] = rng.sample(UnitSphere);
        Vec3::new(x, y, z)
    } else {
        let [x, y]: [f32; 2] = rng.sample(UnitCircle);
        Vec3::new(x, y, 0.0)
    }
}

/// One state-machine pass over every cell: lifecycle counters, the throttled
/// regulatory-network update with its FGF4 field exchange, motility intent,
/// and the division/removal queues.
///
/// The pass is serial: cells write to the shared concentration field and the
/// mapping of locations to grid points is many-to-one.
#[allow(clippy::too_many_arguments)]
pub fn update_cells(
    state: &mut CellState,
    neighbors: &NeighborGraph,
    nearest: &NearestCells,
    field: &mut DiffusionField,
    network: &GeneNetwork,
    params: &SimParams,
    rng: &mut StdRng,
    current_step: u32,
) -> StepQueues {
    let mut queues = StepQueues::default();
    state.motility_forces.fill(Vec3::zero());

    for i in 0..state.count() {
        let differentiated = state.phenotypes[i] == Phenotype::Differentiated;
        state.radii[i] = params.radius_for(differentiated, state.div_counters[i]);

        let degree = neighbors.degree(i) as u32;

        // Loneliness-driven death; any company resets the clock.
        if degree < params.lonely_cell {
            state.death_counters[i] += 1.0;
        } else {
            state.death_counters[i] = 0.0;
        }
        if !differentiated && state.death_counters[i] >= params.death_thresh {
            queues.removals.push(i as u32);
        }

        // Crowded pluripotent cells without the fate marker drift toward
        // differentiation anyway.
        if !differentiated
            && state.regulatory[i][GATA6] == 0
            && degree >= params.diff_surround
        {
            state.diff_counters[i] += 1.0;
        }

        // Contact pins a cell for this step regardless of its marker.
        if degree >= 1 {
            state.motion[i] = false;
        }
        if state.motion[i] {
            let target = nearest.differentiated[i];
            let direction = if !differentiated
                && state.regulatory[i][ERK] == 1
                && params.chemotaxis
                && target != NO_CELL
            {
                (state.locations[target as usize] - state.locations[i]).normalize_or_zero()
            } else {
                random_unit_direction(rng, params.is_3d)
            };
            state.motility_forces[i] += direction.scale(params.motility_force);
        }

        // Division: only resting cells progress, and differentiated cells
        // are contact-inhibited.
        if !state.motion[i] {
            if differentiated && state.div_counters[i] >= params.diff_div_thresh {
                if degree < params.contact_inhibit {
                    queue_division(state, &mut queues, i);
                }
            } else if !differentiated && state.div_counters[i] >= params.pluri_div_thresh {
                queue_division(state, &mut queues, i);
            } else {
                state.div_counters[i] += 1.0;
            }
        }

        // The signaling pathway runs once induction has been reached.
        if current_step >= params.dox_step {
            let grid_point = field.index_of(state.locations[i]);

            // NANOG-high cells secrete while the patch has headroom.
            if field.value(grid_point) < params.max_concentration
                && state.regulatory[i][NANOG] == 1
            {
                field.add(grid_point, 1.0);
            }

            let signal = u8::from(field.value(grid_point) > 0.0);
            let receptor_was_off = state.regulatory[i][FGFR] == 0;

            // The network itself runs on a throttle; skipped steps pass the
            // external signal straight through.
            let fgf4_out = if state.throttle_counters[i] % params.boolean_thresh == 0 {
                network.step(signal, &mut state.regulatory[i])
            } else {
                signal
            };
            state.throttle_counters[i] += 1;

            // A receptor switching on in the presence of signal consumes one
            // unit from the patch.
            if receptor_was_off && fgf4_out == 1 && field.value(grid_point) >= 1.0 {
                field.add(grid_point, -1.0);
            }

            if state.regulatory[i][GATA6] == 1 && state.phenotypes[i] == Phenotype::Pluripotent {
                state.diff_counters[i] += 1.0;
                if state.diff_counters[i] >= params.pluri_to_diff {
                    differentiate(state, i);
                }
            }
        }
    }

    queues
}

fn queue_division(state: &mut CellState, queues: &mut StepQueues, cell: usize) {
    state.div_counters[cell] *= 0.5;
    state.throttle_counters[cell] = 0;
    queues.divisions.push(cell as u32);
}

/// The irreversible pluripotent -> differentiated transition.
fn differentiate(state: &mut CellState, cell: usize) {
    state.phenotypes[cell] = Phenotype::Differentiated;
    state.regulatory[cell][GATA6] = 1;
    state.regulatory[cell][NANOG] = 0;
    state.motion[cell] = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NewCell;
    use crate::testutil::planar_params;
    use rand::SeedableRng;
    use stemcell_common::rules::FGF4;

    fn fixed_network(rules: [&str; 5]) -> GeneNetwork {
        let rules: Vec<String> = rules.iter().map(|s| s.to_string()).collect();
        GeneNetwork::compile(&rules, 2).unwrap()
    }

    fn single_cell(regulatory: [u8; 5], motion: bool) -> CellState {
        let mut state = CellState::with_capacity(4);
        state.add_cell(NewCell {
            location: Vec3::new(5.0e-4, 5.0e-4, 0.0),
            radius: 5.0e-6,
            motion,
            regulatory,
            phenotype: Phenotype::Pluripotent,
            diff_counter: 0.0,
            div_counter: 0.0,
            death_counter: 0.0,
        });
        state
    }

    fn run_pass(
        state: &mut CellState,
        field: &mut DiffusionField,
        network: &GeneNetwork,
        params: &stemcell_common::SimParams,
        step: u32,
    ) -> StepQueues {
        let graph = NeighborGraph::build(state.count(), Vec::new());
        let nearest = NearestCells {
            differentiated: vec![NO_CELL; state.count()],
            gata6_high: vec![NO_CELL; state.count()],
            nanog_high: vec![NO_CELL; state.count()],
        };
        let mut rng = StdRng::seed_from_u64(11);
        update_cells(state, &graph, &nearest, field, network, params, &mut rng, step)
    }

    #[test]
    fn gata6_high_cell_differentiates_after_exactly_the_threshold() {
        let params = planar_params();
        // The network pins GATA6 high and NANOG low every evaluation.
        let network = fixed_network(["0", "0", "0", "1", "0"]);
        let mut state = single_cell([0, 0, 0, 1, 0], false);
        let mut field = DiffusionField::new(&params);

        let cycles = params.pluri_to_diff as u32;
        for step in 0..cycles - 1 {
            run_pass(&mut state, &mut field, &network, &params, step);
            assert_eq!(
                state.phenotypes[0],
                Phenotype::Pluripotent,
                "differentiated early at cycle {}",
                step
            );
        }
        run_pass(&mut state, &mut field, &network, &params, cycles - 1);
        assert_eq!(state.phenotypes[0], Phenotype::Differentiated);
        assert!(state.motion[0], "differentiation switches motion on");
        assert_eq!(state.regulatory[0][GATA6], 1);
        assert_eq!(state.regulatory[0][NANOG], 0);

        // Never reverts.
        for step in cycles..cycles + 10 {
            run_pass(&mut state, &mut field, &network, &params, step);
            assert_eq!(state.phenotypes[0], Phenotype::Differentiated);
        }
    }

    #[test]
    fn division_queues_once_and_halves_the_counter() {
        let params = planar_params();
        let network = fixed_network(["0", "0", "0", "0", "0"]);
        let mut state = single_cell([0, 0, 0, 0, 0], false);
        state.div_counters[0] = params.pluri_div_thresh + 2.0;
        let before = state.div_counters[0];
        let mut field = DiffusionField::new(&params);

        let queues = run_pass(&mut state, &mut field, &network, &params, 0);
        assert_eq!(queues.divisions, vec![0]);
        assert_eq!(state.div_counters[0], before * 0.5);
        assert_eq!(state.throttle_counters[0], 1, "throttle restarted before the pathway ran");
    }

    #[test]
    fn moving_cells_do_not_progress_toward_division() {
        let params = planar_params();
        let network = fixed_network(["0", "0", "0", "0", "0"]);
        let mut state = single_cell([0, 0, 0, 0, 0], true);
        state.div_counters[0] = params.pluri_div_thresh + 1.0;
        let mut field = DiffusionField::new(&params);

        let queues = run_pass(&mut state, &mut field, &network, &params, 0);
        assert!(queues.divisions.is_empty());
        // A moving isolated cell accumulates a motility force instead.
        assert!(state.motility_forces[0].length() > 0.0);
    }

    #[test]
    fn crowded_differentiated_cell_is_contact_inhibited() {
        let params = planar_params();
        let network = fixed_network(["0", "0", "0", "0", "0"]);
        let n = params.contact_inhibit as usize + 1;
        let mut state = CellState::with_capacity(n);
        for k in 0..n {
            state.add_cell(NewCell {
                location: Vec3::new(5.0e-4 + k as f32 * 1.0e-6, 5.0e-4, 0.0),
                radius: 5.0e-6,
                motion: false,
                regulatory: [0; 5],
                phenotype: Phenotype::Differentiated,
                diff_counter: 0.0,
                div_counter: params.diff_div_thresh + 1.0,
                death_counter: 0.0,
            });
        }
        // Fully connected clique: every cell has contact_inhibit neighbors.
        let mut edges = Vec::new();
        for a in 0..n as u32 {
            for b in (a + 1)..n as u32 {
                edges.push([a, b]);
            }
        }
        let graph = NeighborGraph::build(n, edges);
        let nearest = NearestCells {
            differentiated: vec![NO_CELL; n],
            gata6_high: vec![NO_CELL; n],
            nanog_high: vec![NO_CELL; n],
        };
        let mut field = DiffusionField::new(&params);
        let mut rng = StdRng::seed_from_u64(5);

        let queues = update_cells(
            &mut state, &graph, &nearest, &mut field, &network, &params, &mut rng, 0,
        );
        assert!(queues.divisions.is_empty(), "crowding must block division");
    }

    #[test]
    fn lonely_pluripotent_cell_is_queued_for_removal() {
        let mut params = planar_params();
        params.death_thresh = 3.0;
        let network = fixed_network(["0", "0", "0", "0", "0"]);
        let mut state = single_cell([0, 0, 0, 0, 0], false);
        let mut field = DiffusionField::new(&params);

        let mut removed_at = None;
        for step in 0..5 {
            let queues = run_pass(&mut state, &mut field, &network, &params, step);
            if !queues.removals.is_empty() {
                removed_at = Some(step);
                break;
            }
        }
        assert_eq!(removed_at, Some(2), "counter crosses the threshold on its third tick");
    }

    #[test]
    fn nanog_secretion_and_receptor_consumption_balance() {
        let params = planar_params();
        // Default-style rules: FGF4 output mirrors NANOG; FGFR follows
        // signal AND GATA6 (zero here), so the receptor stays off and
        // consumption fires every step.
        let network = fixed_network(["x5", "x1 * x4", "x2", "0", "1"]);
        let mut state = single_cell([0, 0, 0, 0, 1], false);
        let mut field = DiffusionField::new(&params);
        let grid_point = field.index_of(state.locations[0]);

        run_pass(&mut state, &mut field, &network, &params, 0);
        // Secreted one unit, then consumed it on the receptor transition.
        assert_eq!(field.value(grid_point), 0.0);
        assert_eq!(state.regulatory[0][FGF4], 1);
    }

    #[test]
    fn throttled_network_passes_the_signal_through() {
        let mut params = planar_params();
        params.boolean_thresh = 3;
        // Would flip everything on if evaluated.
        let network = fixed_network(["1", "1", "1", "1", "1"]);
        let mut state = single_cell([0, 0, 0, 0, 0], false);
        let mut field = DiffusionField::new(&params);

        // Step 0: counter 0 -> evaluates.
        run_pass(&mut state, &mut field, &network, &params, 0);
        assert_eq!(state.regulatory[0], [1, 1, 1, 1, 1]);

        state.regulatory[0] = [0, 0, 0, 0, 0];
        // Steps 1 and 2: throttled, the stored vector must not change.
        run_pass(&mut state, &mut field, &network, &params, 1);
        run_pass(&mut state, &mut field, &network, &params, 2);
        assert_eq!(state.regulatory[0], [0, 0, 0, 0, 0]);
        // Step 3: counter back on the cadence, evaluates again.
        run_pass(&mut state, &mut field, &network, &params, 3);
        assert_eq!(state.regulatory[0], [1, 1, 1, 1, 1]);
    }

    #[test]
    fn surrounded_marker_low_cell_gains_differentiation_progress() {
        let params = planar_params();
        let network = fixed_network(["0", "0", "0", "0", "0"]);
        let n = params.diff_surround as usize + 1;
        let mut state = CellState::with_capacity(n);
        for k in 0..n {
            state.add_cell(NewCell {
                location: Vec3::new(5.0e-4 + k as f32 * 1.0e-6, 5.0e-4, 0.0),
                radius: 5.0e-6,
                motion: false,
                regulatory: [0; 5],
                phenotype: Phenotype::Pluripotent,
                diff_counter: 0.0,
                div_counter: 0.0,
                death_counter: 0.0,
            });
        }
        let mut edges = Vec::new();
        for b in 1..n as u32 {
            edges.push([0, b]);
        }
        let graph = NeighborGraph::build(n, edges);
        let nearest = NearestCells {
            differentiated: vec![NO_CELL; n],
            gata6_high: vec![NO_CELL; n],
            nanog_high: vec![NO_CELL; n],
        };
        let mut field = DiffusionField::new(&params);
        let mut rng = StdRng::seed_from_u64(3);

        update_cells(&mut state, &graph, &nearest, &mut field, &network, &params, &mut rng, 0);
        assert_eq!(state.diff_counters[0], 1.0, "surrounded focus cell progresses");
        assert_eq!(state.diff_counters[1], 0.0, "spoke cells below the surround threshold");
    }
}
