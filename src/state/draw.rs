use super::{ledger, roster, AppState, PersistOutcome};
use crate::protocol::{DrawStatus, ServerMessage};
use crate::types::*;
use rand::seq::IndexedRandom;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Draw state machine: Idle -> Spinning -> Revealed -> Idle
#[derive(Debug, Default)]
pub struct DrawEngine {
    pub phase: DrawPhase,
    /// Bumped whenever a spin starts or is aborted; a ticker only acts on its own generation
    generation: u64,
    pub spin_name: Option<String>,
    pub current_winner: Option<WinnerRecord>,
    spin: Option<ActiveSpin>,
}

/// Everything captured when the spin started
#[derive(Debug)]
struct ActiveSpin {
    pool: Vec<Entrant>,
    prize: PrizeSlot,
    round: u32,
    ticker: JoinHandle<()>,
}

impl DrawEngine {
    fn is_valid_transition(from: DrawPhase, to: DrawPhase) -> bool {
        use DrawPhase::*;

        matches!(
            (from, to),
            (Idle, Spinning) | (Spinning, Revealed) | (Revealed, Idle) | (Spinning, Idle)
        )
    }

    fn transition(&mut self, to: DrawPhase) -> bool {
        if !Self::is_valid_transition(self.phase, to) {
            tracing::debug!("Ignoring draw transition {:?} -> {:?}", self.phase, to);
            return false;
        }
        self.phase = to;
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel any running spin and go back to Idle.
    ///
    /// Returns true when a spin was actually cancelled.
    pub fn abort(&mut self) -> bool {
        self.generation += 1;
        let cancelled = match self.spin.take() {
            Some(spin) => {
                spin.ticker.abort();
                true
            }
            None => false,
        };
        self.phase = DrawPhase::Idle;
        self.spin_name = None;
        self.current_winner = None;
        cancelled
    }
}

/// Drive the cosmetic name flips, then pick the winner
async fn run_spin(state: AppState, generation: u64, ticks: u32, interval: Duration) {
    for tick in 1..=ticks {
        tokio::time::sleep(interval).await;
        if !state.spin_tick(generation, tick, ticks).await {
            return;
        }
    }
    state.finalize_spin(generation).await;
}

impl AppState {
    /// Start a draw for the current round.
    ///
    /// Ignored unless Idle with at least one eligible entrant. The candidate
    /// pool and the round's prize are captured now; edits made while the
    /// names flip do not change what is being drawn.
    pub async fn start_draw(&self) -> DrawStatus {
        let mut engine = self.engine.write().await;
        if engine.phase != DrawPhase::Idle {
            tracing::debug!("Start ignored, draw is {:?}", engine.phase);
            drop(engine);
            return self.draw_status().await;
        }

        let pool = self.eligible_entrants().await;
        if pool.is_empty() {
            tracing::info!("Start ignored, no eligible entrants");
            drop(engine);
            return self.draw_status().await;
        }

        let round = self.next_round().await;
        let prize = self.schedule.read().await.slot_for(round);

        engine.generation += 1;
        engine.transition(DrawPhase::Spinning);
        engine.spin_name = None;
        engine.current_winner = None;
        let ticker = tokio::spawn(run_spin(
            self.clone(),
            engine.generation,
            self.config.spin_ticks,
            self.config.tick_interval(),
        ));

        tracing::info!(
            "Round {} spinning: {} candidates for {} from {}",
            round,
            pool.len(),
            prize.description,
            prize.sponsor_name
        );
        engine.spin = Some(ActiveSpin {
            pool,
            prize,
            round,
            ticker,
        });
        drop(engine);

        let status = self.draw_status().await;
        self.broadcast_to_all(ServerMessage::Draw {
            status: status.clone(),
        });
        status
    }

    /// Flash a random candidate. Returns false once this spin is stale.
    async fn spin_tick(&self, generation: u64, tick: u32, ticks: u32) -> bool {
        let mut engine = self.engine.write().await;
        if engine.generation != generation || engine.phase != DrawPhase::Spinning {
            return false;
        }

        let name = engine
            .spin
            .as_ref()
            .and_then(|spin| spin.pool.choose(&mut rand::rng()))
            .map(|e| e.name.clone());
        let Some(name) = name else {
            return false;
        };
        engine.spin_name = Some(name.clone());
        drop(engine);

        self.broadcast_to_all(ServerMessage::SpinTick { name, tick, ticks });
        true
    }

    /// Pick the winner, record it and hand it to the shared table
    pub(super) async fn finalize_spin(&self, generation: u64) -> Option<WinnerRecord> {
        let mut engine = self.engine.write().await;
        if engine.generation != generation || engine.phase != DrawPhase::Spinning {
            tracing::debug!("Stale spin {} finished, ignoring", generation);
            return None;
        }
        let spin = engine.spin.take()?;

        // Someone in the pool may have been recorded by another client meanwhile
        let winner_ids = self.winner_ids().await;
        let candidates: Vec<&Entrant> = roster::eligible(&spin.pool, &winner_ids).collect();
        let winner = candidates.choose(&mut rand::rng()).map(|e| (*e).clone());
        let Some(winner) = winner else {
            tracing::warn!("Every candidate of round {} already won, draw dropped", spin.round);
            engine.transition(DrawPhase::Idle);
            engine.spin_name = None;
            drop(engine);
            self.broadcast_draw_status().await;
            return None;
        };

        let mut ledger = self.ledger.write().await;
        let round = ledger.len() as u32 + 1;
        if round != spin.round {
            tracing::warn!(
                "Ledger changed during the spin, round {} recorded as {}",
                spin.round,
                round
            );
        }
        let record = WinnerRecord::stamp(winner, round, &spin.prize, self.config.honor_assigned_prize);
        ledger::append(&mut ledger, record.clone());
        self.mark_unconfirmed(std::iter::once(record.entrant_id())).await;
        drop(ledger);

        engine.transition(DrawPhase::Revealed);
        engine.spin_name = Some(record.entrant.name.clone());
        engine.current_winner = Some(record.clone());
        drop(engine);

        tracing::info!(
            "Round {} won by {} ({}): {}",
            record.round,
            record.entrant.name,
            record.entrant.entry_code,
            record.prize
        );

        self.spawn_persist(record.clone());
        self.broadcast_to_all(ServerMessage::WinnerRevealed {
            winner: record.clone(),
        });
        self.broadcast_ledger().await;
        self.broadcast_draw_status().await;
        Some(record)
    }

    /// Dismiss the revealed winner. Ignored in any other phase.
    pub async fn acknowledge(&self) -> DrawStatus {
        let mut engine = self.engine.write().await;
        if engine.phase == DrawPhase::Revealed && engine.transition(DrawPhase::Idle) {
            engine.spin_name = None;
            engine.current_winner = None;
            drop(engine);
            tracing::info!("Winner acknowledged, ready for the next round");
            self.broadcast_draw_status().await;
        } else {
            drop(engine);
        }
        self.draw_status().await
    }

    /// Write one record to the shared table without blocking the draw
    pub(super) fn spawn_persist(&self, record: WinnerRecord) {
        let store = self.store.clone();
        let outcomes = self.persist_tx.clone();
        tokio::spawn(async move {
            let result = store.insert(&record).await.map_err(|e| e.to_string());
            let _ = outcomes.send(PersistOutcome {
                round: record.round,
                entrant_id: record.entrant.id.clone(),
                result,
            });
        });
    }

    pub async fn get_phase(&self) -> DrawPhase {
        self.engine.read().await.phase
    }

    pub async fn draw_status(&self) -> DrawStatus {
        let engine = self.engine.read().await;
        let (current_round, active_prize) = match (&engine.spin, &engine.current_winner) {
            (Some(spin), _) => (spin.round, spin.prize.clone()),
            (None, Some(winner)) if engine.phase == DrawPhase::Revealed => (
                winner.round,
                PrizeSlot {
                    sponsor_name: winner.sponsor.clone(),
                    description: winner.prize.clone(),
                    sponsor_phone: winner.sponsor_phone.clone(),
                },
            ),
            _ => {
                let round = self.next_round().await;
                (round, self.schedule.read().await.slot_for(round))
            }
        };

        DrawStatus {
            phase: engine.phase,
            current_round,
            active_prize,
            spin_name: engine.spin_name.clone(),
            current_winner: engine.current_winner.clone(),
            counts: self.roster_counts().await,
        }
    }

    pub async fn broadcast_draw_status(&self) {
        let status = self.draw_status().await;
        self.broadcast_to_all(ServerMessage::Draw { status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn quick_config() -> DrawConfig {
        DrawConfig {
            spin_ticks: 3,
            tick_interval_ms: 10,
            ..DrawConfig::default()
        }
    }

    fn entrants(n: usize) -> Vec<Entrant> {
        (1..=n)
            .map(|i| Entrant {
                id: format!("p-{}", i),
                name: format!("Entrant {}", i),
                phone: String::new(),
                entry_code: i.to_string(),
                assigned_prize: None,
                imported_on: None,
            })
            .collect()
    }

    async fn state_with(n: usize) -> AppState {
        let state = AppState::with_services(
            quick_config(),
            Arc::new(MemoryLedgerStore::new()),
            None,
            None,
        );
        state.replace_roster(entrants(n)).await.unwrap();
        state
    }

    async fn wait_for_phase(state: &AppState, phase: DrawPhase) {
        for _ in 0..100 {
            if state.get_phase().await == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Draw never reached {:?}", phase);
    }

    #[test]
    fn test_phase_transitions() {
        use DrawPhase::*;
        assert!(DrawEngine::is_valid_transition(Idle, Spinning));
        assert!(DrawEngine::is_valid_transition(Spinning, Revealed));
        assert!(DrawEngine::is_valid_transition(Revealed, Idle));
        assert!(!DrawEngine::is_valid_transition(Idle, Revealed));
        assert!(!DrawEngine::is_valid_transition(Revealed, Spinning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_draw_cycle() {
        let state = state_with(3).await;

        let status = state.start_draw().await;
        assert_eq!(status.phase, DrawPhase::Spinning);
        assert_eq!(status.current_round, 1);

        wait_for_phase(&state, DrawPhase::Revealed).await;
        let status = state.draw_status().await;
        let winner = status.current_winner.expect("winner revealed");
        assert_eq!(winner.round, 1);
        assert_eq!(winner.prize, "Prize #1");
        assert_eq!(winner.sponsor, DEFAULT_HOUSE_SPONSOR);
        assert_eq!(status.counts.eligible, 2);

        let status = state.acknowledge().await;
        assert_eq!(status.phase, DrawPhase::Idle);
        assert_eq!(status.current_round, 2);
        assert!(status.current_winner.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_entrant_wins_once() {
        let state = state_with(3).await;

        for _ in 0..3 {
            state.start_draw().await;
            wait_for_phase(&state, DrawPhase::Revealed).await;
            state.acknowledge().await;
        }

        let ledger = state.get_ledger().await;
        let rounds: Vec<u32> = ledger.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![3, 2, 1]);
        let ids: HashSet<&str> = ledger.iter().map(|r| r.entrant_id()).collect();
        assert_eq!(ids.len(), 3);

        // Pool exhausted
        let status = state.start_draw().await;
        assert_eq!(status.phase, DrawPhase::Idle);
        assert_eq!(state.get_ledger().await.len(), 3);
    }

    #[tokio::test]
    async fn test_start_with_empty_roster_is_noop() {
        let state = AppState::new();
        let status = state.start_draw().await;
        assert_eq!(status.phase, DrawPhase::Idle);
        assert_eq!(state.engine.read().await.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_busy_is_noop() {
        let state = state_with(2).await;

        state.start_draw().await;
        let generation = state.engine.read().await.generation();
        state.start_draw().await;
        assert_eq!(state.engine.read().await.generation(), generation);

        wait_for_phase(&state, DrawPhase::Revealed).await;
        let status = state.start_draw().await;
        assert_eq!(status.phase, DrawPhase::Revealed);
        assert_eq!(state.get_ledger().await.len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_outside_reveal_is_noop() {
        let state = state_with(1).await;
        let status = state.acknowledge().await;
        assert_eq!(status.phase, DrawPhase::Idle);
        assert_eq!(status.current_round, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_spin_records_nothing() {
        let state = state_with(2).await;

        state.start_draw().await;
        state.clear_roster().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(state.get_phase().await, DrawPhase::Idle);
        assert!(state.get_ledger().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prize_captured_at_spin_start() {
        let state = state_with(1).await;
        state.import_prizes_text("Acme (555-1234): Mug").await;

        state.start_draw().await;
        state.import_prizes_text("Other: Hat").await;
        wait_for_phase(&state, DrawPhase::Revealed).await;

        let winner = state.get_ledger().await.remove(0);
        assert_eq!(winner.prize, "Mug");
        assert_eq!(winner.sponsor, "Acme");
        assert_eq!(winner.sponsor_phone.as_deref(), Some("555-1234"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spin_ticks_broadcast_pool_names() {
        let state = state_with(2).await;
        let mut rx = state.broadcast.subscribe();

        state.start_draw().await;
        wait_for_phase(&state, DrawPhase::Revealed).await;

        let mut ticks = 0;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::SpinTick { name, ticks: total, .. } = msg {
                assert!(name.starts_with("Entrant "));
                assert_eq!(total, 3);
                ticks += 1;
            }
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_winner_is_persisted() {
        let store = Arc::new(MemoryLedgerStore::new());
        let state = AppState::with_services(quick_config(), store.clone(), None, None);
        state.replace_roster(entrants(1)).await.unwrap();
        let mut outcomes = state.take_persist_outcomes().await.unwrap();

        state.start_draw().await;
        let outcome = outcomes.recv().await.unwrap();

        assert_eq!(outcome.round, 1);
        assert_eq!(outcome.entrant_id, "p-1");
        assert!(outcome.result.is_ok());
        assert_eq!(store.len().await, 1);
    }

    /// Slow spin with the ledger sync running against a shared memory table
    async fn synced_state_with(
        n: usize,
    ) -> (Arc<AppState>, Arc<MemoryLedgerStore>, crate::sync::SyncHandle) {
        let store = Arc::new(MemoryLedgerStore::new());
        let config = DrawConfig {
            spin_ticks: 3,
            tick_interval_ms: 1000,
            ..DrawConfig::default()
        };
        let state = Arc::new(AppState::with_services(config, store.clone(), None, None));
        state.replace_roster(entrants(n)).await.unwrap();
        let handle = crate::sync::start(state.clone()).await;
        (state, store, handle)
    }

    /// Another client records `entrant` as round 1 while this spin is running
    async fn record_elsewhere(state: &AppState, store: &MemoryLedgerStore, entrant: Entrant) {
        let slot = PrizeSlot::house_default(1, DEFAULT_HOUSE_SPONSOR);
        store
            .insert(&WinnerRecord::stamp(entrant, 1, &slot, true))
            .await
            .unwrap();
        for _ in 0..50 {
            if state.get_ledger().await.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.get_ledger().await.len(), 1);
        assert_eq!(state.get_phase().await, DrawPhase::Spinning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sole_candidate_won_elsewhere_drops_draw() {
        let (state, store, handle) = synced_state_with(1).await;

        let status = state.start_draw().await;
        assert_eq!(status.current_round, 1);
        record_elsewhere(&state, &store, entrants(1).remove(0)).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = state.draw_status().await;
        assert_eq!(status.phase, DrawPhase::Idle);
        assert!(status.current_winner.is_none());

        // Only the outside record, nothing drawn here
        let ledger = state.get_ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].round, 1);
        assert_eq!(store.len().await, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_winner_elsewhere_during_spin_shifts_round() {
        let (state, store, handle) = synced_state_with(2).await;

        let status = state.start_draw().await;
        assert_eq!(status.current_round, 1);
        record_elsewhere(&state, &store, entrants(1).remove(0)).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = state.draw_status().await;
        assert_eq!(status.phase, DrawPhase::Revealed);
        let winner = status.current_winner.expect("winner");
        assert_eq!(winner.entrant.id, "p-2");
        assert_eq!(winner.round, 2);

        let rounds: Vec<u32> = state.get_ledger().await.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![2, 1]);
        for _ in 0..50 {
            if store.len().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stored: Vec<u32> = store.select_all().await.unwrap().iter().map(|r| r.round).collect();
        assert_eq!(stored, vec![2, 1]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_store_does_not_block_reveal() {
        let store = Arc::new(MemoryLedgerStore::new());
        store.set_reachable(false);
        let state = AppState::with_services(quick_config(), store.clone(), None, None);
        state.replace_roster(entrants(1)).await.unwrap();
        let mut outcomes = state.take_persist_outcomes().await.unwrap();

        state.start_draw().await;
        wait_for_phase(&state, DrawPhase::Revealed).await;

        assert_eq!(state.get_ledger().await.len(), 1);
        assert!(outcomes.recv().await.unwrap().result.is_err());
        assert_eq!(store.len().await, 0);
    }
}
