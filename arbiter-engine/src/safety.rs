//! Account-level safety limits shared by every symbol worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use arbiter_config::RiskConfig;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

#[derive(Debug)]
struct DayState {
    day: NaiveDate,
    realized_pnl: f64,
    consecutive_losses: u32,
}

/// Tracks realized losses and open-position count across all symbols and
/// decides when new entries must pause. Exits are never blocked.
pub struct SafetyMonitor {
    open_positions: AtomicUsize,
    max_open_positions: usize,
    daily_loss_limit: f64,
    max_consecutive_losses: u32,
    state: Mutex<DayState>,
}

impl SafetyMonitor {
    #[must_use]
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            open_positions: AtomicUsize::new(0),
            max_open_positions: config.max_open_positions,
            daily_loss_limit: config.reference_equity * config.daily_max_loss_pct,
            max_consecutive_losses: config.max_consecutive_losses,
            state: Mutex::new(DayState {
                day: Utc::now().date_naive(),
                realized_pnl: 0.0,
                consecutive_losses: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DayState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Reserves an open-position slot. Returns false when the account is
    /// already at its cap; the caller holds instead of entering.
    pub fn try_reserve_slot(&self) -> bool {
        let mut current = self.open_positions.load(Ordering::Acquire);
        loop {
            if current >= self.max_open_positions {
                return false;
            }
            match self.open_positions.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a slot after a close or a rejected entry.
    pub fn release_slot(&self) {
        let previous = self.open_positions.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "slot release without reservation");
    }

    #[must_use]
    pub fn open_positions(&self) -> usize {
        self.open_positions.load(Ordering::Acquire)
    }

    /// Folds a closed trade into the daily ledger.
    pub fn record_close(&self, net_pnl: f64, at: DateTime<Utc>) {
        let mut state = self.lock();
        let day = at.date_naive();
        if day != state.day {
            state.day = day;
            state.realized_pnl = 0.0;
            state.consecutive_losses = 0;
        }
        state.realized_pnl += net_pnl;
        if net_pnl < 0.0 {
            state.consecutive_losses += 1;
            if state.consecutive_losses == self.max_consecutive_losses {
                warn!(
                    target: "arbiter.safety",
                    losses = state.consecutive_losses,
                    "consecutive-loss limit reached, pausing entries"
                );
            }
        } else {
            state.consecutive_losses = 0;
        }
    }

    /// Why entries are currently paused, if they are. The daily ledger
    /// rolls over automatically at UTC midnight.
    #[must_use]
    pub fn entries_paused(&self, now: DateTime<Utc>) -> Option<&'static str> {
        let mut state = self.lock();
        let day = now.date_naive();
        if day != state.day {
            state.day = day;
            state.realized_pnl = 0.0;
            state.consecutive_losses = 0;
            return None;
        }
        if state.realized_pnl <= -self.daily_loss_limit {
            return Some("daily_loss_limit");
        }
        if state.consecutive_losses >= self.max_consecutive_losses {
            return Some("consecutive_losses");
        }
        None
    }
}
