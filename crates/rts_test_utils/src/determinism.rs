//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Two simulations fed the same scenario and orders must agree bit for bit
//! at every tick. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   Positions are packed integers; path scores use
//!   [`rts_kernel::math::Fixed`].
//!
//! - **Iteration order**: Pools are walked in category order, then slot
//!   order. Nothing iterates a hash map.
//!
//! - **System randomness**: The only random source is the simulation's
//!   seeded stream, consumed from entity updates.
//!
//! - **Save/load**: A restored simulation must continue exactly as the
//!   original would have.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Per-module behaviour inside `rts_kernel`
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full scenarios are reproducible
//! 4. **Parallel tests**: Running N simulations on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use rts_kernel::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use rts_test_utils::determinism::verify_determinism;
/// use rts_test_utils::fixtures::battle_scenario;
///
/// let result = verify_determinism(
///     3,
///     50,
///     || battle_scenario(9),
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice from identical setup and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    );
    result.is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations_scoped<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            tracing::warn!(tick, "simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that a save taken mid-run continues exactly like the original.
///
/// Runs `save_at` ticks, saves and restores, then runs both copies for
/// `continue_for` more ticks and compares hashes at every tick.
pub fn verify_save_load_determinism<F>(setup_fn: F, save_at: u64, continue_for: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut original = setup_fn();
    for _ in 0..save_at {
        original.tick();
    }

    let Ok(bytes) = original.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };

    if restored.state_hash() != original.state_hash() {
        return false;
    }
    for _ in 0..continue_for {
        let a = original.tick();
        let b = restored.tick();
        if a != b || original.state_hash() != restored.state_hash() {
            return false;
        }
    }
    true
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for kernel values.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use rts_kernel::coord::{Cell, Coordinate, MAP_CELL_H, MAP_CELL_W};
    use rts_kernel::mission::Mission;
    use rts_kernel::target::{Rtti, Target};
    use rts_kernel::terrain::LandType;

    /// Any on-map cell.
    pub fn arb_cell() -> impl Strategy<Value = Cell> {
        (0..MAP_CELL_W, 0..MAP_CELL_H).prop_map(|(x, y)| Cell::new(x, y))
    }

    /// Any on-map coordinate, leptons included.
    pub fn arb_coordinate() -> impl Strategy<Value = Coordinate> {
        (0..MAP_CELL_W as u8, 0..MAP_CELL_H as u8, any::<u8>(), any::<u8>())
            .prop_map(|(cx, cy, lx, ly)| Coordinate::new(cx, cy, lx, ly))
    }

    /// A pool category.
    pub fn arb_pool_rtti() -> impl Strategy<Value = Rtti> {
        proptest::sample::select(Rtti::POOL_ORDER.to_vec())
    }

    /// A well-formed target: a pool entity (with generation) or a cell.
    pub fn arb_target() -> impl Strategy<Value = Target> {
        prop_oneof![
            (arb_pool_rtti(), 0u16..1000, 0u8..128)
                .prop_map(|(rtti, index, generation)| Target::with_generation(rtti, index, generation)),
            arb_cell().prop_map(Target::from_cell),
        ]
    }

    /// Any mission.
    pub fn arb_mission() -> impl Strategy<Value = Mission> {
        (0u8..22).prop_map(|n| Mission::from_ordinal(n).unwrap_or_default())
    }

    /// Terrain text row of `width` cells with mostly clear ground.
    pub fn arb_map_row(width: usize) -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop_oneof![
                6 => Just(LandType::Clear),
                1 => Just(LandType::Road),
                1 => Just(LandType::Rough),
                1 => Just(LandType::Water),
                1 => Just(LandType::Rock),
                1 => Just(LandType::Tree),
            ],
            width,
        )
        .prop_map(|lands| lands.into_iter().map(LandType::symbol).collect())
    }

    /// Square map of `size` rows.
    pub fn arb_map(size: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(arb_map_row(size), size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        battle_scenario, harvest_scenario, open_field, spawn_rifleman, spawn_tank, ENEMY, PLAYER,
    };
    use proptest::prelude::*;
    use rts_kernel::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        assert!(verify_simulation_determinism(|| open_field(1), 100));
    }

    #[test]
    fn test_battle_determinism() {
        let result = verify_determinism(
            3,
            300,
            || battle_scenario(42),
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_battle_has_casualties() {
        let mut sim = battle_scenario(42);
        let mut destroyed = 0;
        for _ in 0..1500 {
            destroyed += sim.tick().destroyed.len();
        }
        assert!(destroyed > 0, "hunting squads should meet and fight");
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = battle_scenario(1);
        let mut b = battle_scenario(2);
        for _ in 0..400 {
            a.tick();
            b.tick();
        }
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_find_divergence_on_deterministic_sim() {
        assert_eq!(find_first_divergence(|| battle_scenario(5), 200), None);
    }

    #[test]
    fn test_harvest_determinism() {
        assert!(verify_simulation_determinism(|| harvest_scenario(3).0, 600));
    }

    #[test]
    fn test_save_load_mid_battle() {
        assert!(verify_save_load_determinism(|| battle_scenario(8), 150, 200));
    }

    #[test]
    fn test_save_load_mid_harvest() {
        assert!(verify_save_load_determinism(|| harvest_scenario(8).0, 120, 300));
    }

    #[test]
    fn test_parallel_battles() {
        run_parallel_simulations_scoped(|| battle_scenario(77), 4, 200).assert_deterministic();
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Random move orders replay identically.
        #[test]
        fn prop_random_orders_are_deterministic(
            seed in any::<u64>(),
            goals in proptest::collection::vec(strategies::arb_cell(), 1..6),
        ) {
            let setup = move || {
                let mut sim = open_field(seed);
                let tank = spawn_tank(&mut sim, PLAYER, 10, 10);
                let soldier = spawn_rifleman(&mut sim, ENEMY, 30, 30);
                for (i, goal) in goals.iter().enumerate() {
                    let unit = if i % 2 == 0 { tank } else { soldier };
                    let _ = sim.order_move(unit, *goal);
                }
                sim
            };

            let result = verify_determinism(2, 120, setup, |s| { s.tick(); }, Simulation::state_hash);
            prop_assert!(result.is_deterministic);
        }

        /// Random terrain never breaks determinism of a crossing unit.
        #[test]
        fn prop_random_terrain_is_deterministic(map in strategies::arb_map(24)) {
            let rows: Vec<&str> = map.iter().map(String::as_str).collect();
            let setup = || {
                let terrain = Terrain::from_rows(&rows).unwrap();
                let mut sim = Simulation::with_terrain(&KernelConfig::with_seed(3), terrain);
                if let Ok(tank) = sim.create_vehicle(VehicleKind::Tank, PLAYER, Cell::new(30, 0)) {
                    let _ = sim.order_move(tank, Cell::new(30, 40));
                }
                sim
            };
            prop_assert_eq!(find_first_divergence(setup, 80), None);
        }
    }
}
