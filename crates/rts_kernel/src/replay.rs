//! Recording and playing back order streams.
//!
//! A replay stores the serialized starting state and every [`Order`]
//! applied afterwards, keyed by the tick it was applied before. Because the
//! simulation is deterministic, re-applying the orders to the starting
//! state must reproduce the recorded final hash.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::simulation::{Order, Simulation};

/// A single order record for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOrder {
    /// Tick the order was applied before.
    pub tick: u64,
    /// The order.
    pub order: Order,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Seed of the recorded simulation.
    pub seed: u64,
    /// Serialized initial simulation state.
    pub initial_state: Vec<u8>,
    /// Orders in tick order.
    pub orders: Vec<ReplayOrder>,
    /// Tick the recording stopped at.
    pub final_tick: u64,
    /// State hash at `final_tick`.
    pub final_hash: u64,
}

impl Replay {
    /// Start a replay from a simulation's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, initial_state: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed: initial_state.world().rng.seed(),
            initial_state: initial_state.serialize()?,
            orders: Vec::new(),
            final_tick: initial_state.get_tick(),
            final_hash: initial_state.state_hash(),
        })
    }

    /// Record an order applied before `tick`.
    pub fn record_order(&mut self, tick: u64, order: Order) {
        self.orders.push(ReplayOrder { tick, order });
    }

    /// Finalize the replay with end state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        std::fs::write(path.as_ref(), bytes)?;
        tracing::info!(path = %path.as_ref().display(), orders = self.orders.len(), "replay saved");
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if file reading or deserialization fails, and
    /// [`KernelError::ReplayVersion`] for files from another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let replay: Self = bincode::deserialize(&bytes)?;

        if replay.version != REPLAY_VERSION {
            return Err(KernelError::ReplayVersion {
                expected: REPLAY_VERSION,
                found: replay.version,
            });
        }

        tracing::info!(path = %path.as_ref().display(), scenario = %replay.scenario_id, "replay loaded");
        Ok(replay)
    }

    /// Get the initial simulation state for playback.
    ///
    /// # Errors
    ///
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state)
    }

    /// Orders applied before a specific tick.
    #[must_use]
    pub fn orders_at_tick(&self, tick: u64) -> Vec<&ReplayOrder> {
        self.orders.iter().filter(|o| o.tick == tick).collect()
    }

    /// Total number of orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Re-run the replay from its initial state and compare final hashes.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DesyncDetected`] when the re-run ends in a
    /// different state.
    pub fn verify(&self) -> Result<()> {
        ReplayPlayer::new(self.clone())?.verify()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    next_order: usize,
}

impl ReplayPlayer {
    /// Create a player positioned at the replay's initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            next_order: 0,
        })
    }

    /// Apply this tick's orders and advance one tick. Returns `true` while
    /// there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }

        let now = self.simulation.get_tick();
        while let Some(record) = self.replay.orders.get(self.next_order) {
            if record.tick > now {
                break;
            }
            if let Err(err) = self.simulation.apply_order(&record.order) {
                // Recording keeps rejected orders too; they must fail again.
                tracing::debug!(tick = now, %err, "replayed order rejected");
            }
            self.next_order += 1;
        }

        self.simulation.tick();
        !self.is_finished()
    }

    /// Replay from the start up to `target_tick`.
    ///
    /// # Errors
    ///
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.next_order = 0;
        while self.simulation.get_tick() < target_tick && self.advance() {}
        Ok(())
    }

    /// Current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// Current simulation state.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// The replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Whether playback reached the final tick.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Play to the end and compare against the recorded final hash.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DesyncDetected`] on mismatch.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_tick)?;
        let local_hash = self.simulation.state_hash();
        if local_hash != self.replay.final_hash {
            tracing::warn!(tick = self.current_tick(), local_hash, remote_hash = self.replay.final_hash, "replay desync");
            return Err(KernelError::DesyncDetected {
                tick: self.current_tick(),
                local_hash,
                remote_hash: self.replay.final_hash,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::coord::Cell;
    use crate::entity::{HouseId, InfantryKind, VehicleKind};

    fn create_test_simulation() -> (Simulation, Vec<crate::target::Target>) {
        let mut sim = Simulation::new(&KernelConfig::with_seed(12345));
        let tank = sim
            .create_vehicle(VehicleKind::Tank, HouseId(1), Cell::new(5, 5))
            .unwrap();
        let soldier = sim
            .create_infantry(InfantryKind::Rifleman, HouseId(2), Cell::new(20, 8))
            .unwrap();
        (sim, vec![tank, soldier])
    }

    fn record(ticks: u64) -> Replay {
        let (mut sim, units) = create_test_simulation();
        let mut replay = Replay::new("test_scenario", &sim).unwrap();
        let orders = [
            (0, Order::Move { unit: units[0], cell: Cell::new(12, 6) }),
            (10, Order::Attack { unit: units[0], victim: units[1] }),
        ];
        while sim.get_tick() < ticks {
            for (tick, order) in &orders {
                if *tick == sim.get_tick() {
                    let _ = sim.apply_order(order);
                    replay.record_order(*tick, *order);
                }
            }
            sim.tick();
        }
        replay.finalize(sim.get_tick(), sim.state_hash());
        replay
    }

    #[test]
    fn test_replay_create() {
        let (sim, _) = create_test_simulation();
        let replay = Replay::new("test_scenario", &sim).unwrap();
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.scenario_id, "test_scenario");
        assert_eq!(replay.seed, 12345);
        assert!(replay.orders.is_empty());
        assert_eq!(replay.final_hash, sim.state_hash());
    }

    #[test]
    fn test_orders_at_tick() {
        let replay = record(20);
        assert_eq!(replay.order_count(), 2);
        assert_eq!(replay.orders_at_tick(0).len(), 1);
        assert_eq!(replay.orders_at_tick(10).len(), 1);
        assert!(replay.orders_at_tick(7).is_empty());
    }

    #[test]
    fn test_replay_verifies() {
        let replay = record(60);
        assert!(replay.verify().is_ok());
    }

    #[test]
    fn test_tampered_replay_desyncs() {
        let mut replay = record(60);
        replay.final_hash ^= 1;
        assert!(matches!(
            replay.verify(),
            Err(KernelError::DesyncDetected { tick: 60, .. })
        ));
    }

    #[test]
    fn test_player_seek() {
        let replay = record(30);
        let mut player = ReplayPlayer::new(replay).unwrap();
        player.seek(12).unwrap();
        assert_eq!(player.current_tick(), 12);
        assert!(!player.is_finished());
        while player.advance() {}
        assert_eq!(player.current_tick(), 30);
        assert_eq!(player.simulation().state_hash(), player.replay().final_hash);
    }

    #[test]
    fn test_replay_save_load() {
        let replay = record(15);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_replay.bin");
        replay.save(&path).unwrap();

        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded.scenario_id, "test_scenario");
        assert_eq!(loaded.order_count(), 2);
        assert_eq!(loaded.final_tick, 15);
        assert_eq!(loaded.final_hash, replay.final_hash);
    }

    #[test]
    fn test_version_mismatch() {
        let mut replay = record(1);
        replay.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.bin");
        replay.save(&path).unwrap();
        assert!(matches!(
            Replay::load(&path),
            Err(KernelError::ReplayVersion { found, .. }) if found == REPLAY_VERSION + 1
        ));
    }
}
