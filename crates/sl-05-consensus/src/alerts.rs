//! The protocol alert registry.
//!
//! At most one alert is live at a time. Alerts expire by block height or by
//! block time depending on their type; expiry is checked at every
//! block-end.

/// How an alert's expiry value is interpreted.
const ALERT_EXPIRY_BY_BLOCK: u32 = 1;
const ALERT_EXPIRY_BY_TIME: u32 = 2;

/// A live protocol alert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub alert_type: u32,
    pub expiry: u64,
    pub message: String,
}

/// Holder of the single live alert.
#[derive(Clone, Debug, Default)]
pub struct AlertRegistry {
    current: Option<Alert>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the live alert.
    pub fn set(&mut self, alert: Alert) {
        tracing::warn!(message = %alert.message, "protocol alert raised");
        self.current = Some(alert);
    }

    /// The live alert, if any.
    pub fn current(&self) -> Option<&Alert> {
        self.current.as_ref()
    }

    /// Drop the live alert when its expiry has passed. Returns true when an
    /// alert was cleared.
    pub fn check_expired(&mut self, block_height: u64, block_time: u64) -> bool {
        let expired = match &self.current {
            Some(alert) => match alert.alert_type {
                ALERT_EXPIRY_BY_BLOCK => block_height >= alert.expiry,
                ALERT_EXPIRY_BY_TIME => block_time >= alert.expiry,
                _ => false,
            },
            None => false,
        };
        if expired {
            tracing::info!("protocol alert expired");
            self.current = None;
        }
        expired
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_expiry() {
        let mut alerts = AlertRegistry::new();
        alerts.set(Alert {
            alert_type: 1,
            expiry: 100,
            message: "upgrade required".to_string(),
        });

        assert!(!alerts.check_expired(99, 0));
        assert!(alerts.current().is_some());
        assert!(alerts.check_expired(100, 0));
        assert!(alerts.current().is_none());
    }

    #[test]
    fn test_time_expiry() {
        let mut alerts = AlertRegistry::new();
        alerts.set(Alert {
            alert_type: 2,
            expiry: 1_700_000_000,
            message: "upgrade required".to_string(),
        });

        assert!(!alerts.check_expired(0, 1_699_999_999));
        assert!(alerts.check_expired(0, 1_700_000_000));
    }

    #[test]
    fn test_unknown_type_never_expires() {
        let mut alerts = AlertRegistry::new();
        alerts.set(Alert {
            alert_type: 3,
            expiry: 1,
            message: "version alert".to_string(),
        });

        assert!(!alerts.check_expired(u64::MAX, u64::MAX));
    }
}
