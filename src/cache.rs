//! ==============================================================================
//! cache.rs - last-reading cache
//! ==============================================================================
//!
//! purpose:
//!     single slot holding the most recent reading. the serial reader is the
//!     only writer; the scheduler, the query facade and the http layer read it
//!     at any time.
//!
//! sharing:
//!     SensorCache is a cheap Clone handle around Arc<RwLock<Reading>>.
//!     Reading is Copy, so a read is one short lock + copy and can never see
//!     a half-written sample. parking_lot locks do not poison, so a panicking
//!     writer cannot take the readers down with it.
//!
//! ==============================================================================

use crate::domain::Reading;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone)]
pub struct SensorCache {
    slot: Arc<RwLock<Reading>>,
}

impl SensorCache {
    /// starts at the zero reading (0°, 0%, now)
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(Reading::zero())),
        }
    }

    /// overwrite temperature, humidity and timestamp in place
    ///
    /// the id of `reading` is ignored; cached readings never carry one.
    pub fn update(&self, reading: &Reading) {
        let mut slot = self.slot.write();
        slot.temperature = reading.temperature;
        slot.humidity = reading.humidity;
        slot.timestamp = reading.timestamp;
    }

    /// consistent snapshot of the latest reading
    pub fn read(&self) -> Reading {
        *self.slot.read()
    }

    /// zero temperature and humidity, keep the timestamp
    pub fn reset(&self) {
        let mut slot = self.slot.write();
        slot.temperature = 0.0;
        slot.humidity = 0.0;
    }
}

impl Default for SensorCache {
    fn default() -> Self {
        Self::new()
    }
}
