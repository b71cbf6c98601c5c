//! Per-tank subscriber lists for state and percentage changes.

use crate::tank::Tank;
use log::error;
use std::fmt;
use std::sync::Arc;

/// Called after a tank's state field has been updated.
pub trait StateChangeObserver: Send + Sync {
    fn state_changed(&self, tank: &Tank) -> anyhow::Result<()>;
}

/// Called after a tank's percentage has been updated and before the state
/// machine runs. `previous` is the percentage before this reading.
pub trait PercentageChangeObserver: Send + Sync {
    fn percentage_changed(&self, tank: &Tank, previous: Option<u8>) -> anyhow::Result<()>;
}

/// Two independent subscriber lists, notified in registration order.
///
/// A failing subscriber is logged and does not stop the remaining ones.
#[derive(Clone, Default)]
pub struct ObserverBus {
    state: Vec<Arc<dyn StateChangeObserver>>,
    percentage: Vec<Arc<dyn PercentageChangeObserver>>,
}

impl ObserverBus {
    pub fn register_state_observer(&mut self, observer: Arc<dyn StateChangeObserver>) {
        self.state.push(observer);
    }

    pub fn register_percentage_observer(&mut self, observer: Arc<dyn PercentageChangeObserver>) {
        self.percentage.push(observer);
    }

    pub fn clear(&mut self) {
        self.state.clear();
        self.percentage.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty() && self.percentage.is_empty()
    }

    /// Returns the number of subscribers that failed.
    pub fn notify_state_changed(&self, tank: &Tank) -> usize {
        let mut failures = 0;
        for observer in &self.state {
            if let Err(e) = observer.state_changed(tank) {
                error!("State observer failed for water tank {}: {:#}", tank.id, e);
                failures += 1;
            }
        }
        failures
    }

    /// Returns the number of subscribers that failed.
    pub fn notify_percentage_changed(&self, tank: &Tank, previous: Option<u8>) -> usize {
        let mut failures = 0;
        for observer in &self.percentage {
            if let Err(e) = observer.percentage_changed(tank, previous) {
                error!(
                    "Percentage observer failed for water tank {}: {:#}",
                    tank.id, e
                );
                failures += 1;
            }
        }
        failures
    }
}

impl fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBus")
            .field("state", &self.state.len())
            .field("percentage", &self.percentage.len())
            .finish()
    }
}
