use log::debug;

use crate::{
    config::DatabaseSettings,
    error::GatewayError,
    gateway::{self, Gateway},
};

/// An open gateway plus the database it is pointed at. The connection lives
/// exactly as long as the session.
pub struct Session {
    gateway: Box<dyn Gateway>,
}

impl Session {
    pub fn connect(settings: &DatabaseSettings) -> Result<Self, GatewayError> {
        Ok(Self::with_gateway(gateway::connect(settings)?))
    }

    pub fn with_gateway(gateway: Box<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&mut self) -> &mut dyn Gateway {
        self.gateway.as_mut()
    }

    pub fn active_database(&self) -> Option<&str> {
        self.gateway.current_database()
    }

    pub fn use_database(&mut self, name: &str) -> Result<(), GatewayError> {
        self.gateway.use_database(name)
    }

    /// Fails with [`GatewayError::NoDatabaseSelected`] when nothing is active.
    pub fn require_database(&self) -> Result<&str, GatewayError> {
        self.active_database().ok_or(GatewayError::NoDatabaseSelected)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(
            "Closing {} session (database: {})",
            self.gateway.dialect(),
            self.gateway.current_database().unwrap_or("none")
        );
    }
}
