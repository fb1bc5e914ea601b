use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// How long a hold stays Active before the sweeper may expire it.
    pub reservation_ttl: chrono::Duration,
    pub sweep_interval: Duration,
    /// `None` waits for a contended variant lock indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_secs(60),
            lock_timeout: None,
        }
    }
}

impl InventoryConfig {
    pub fn ttl_minutes(&self) -> i64 {
        self.reservation_ttl.num_minutes()
    }
}
