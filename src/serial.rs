//! ==============================================================================
//! serial.rs - serial byte source and reader loop
//! ==============================================================================
//!
//! purpose:
//!     opens the byte stream coming from the remote sensor (an xbee explorer
//!     on the usb port) and drives the frame parser with it. every reading the
//!     parser produces lands in the last-reading cache.
//!
//! design philosophy:
//!     - "Compile Anywhere": without the `hardware` feature a mock sensor
//!       prints "25.0,50.0\r\n" every 10s, so the host runs on any machine.
//!     - with `hardware` the real port is opened through tokio-serial
//!       (9600 8N1, no flow control by default).
//!     - no reconnect: a read error or end of stream ends the loop and is
//!       returned to main.rs for the operator to see.
//!
//! relationships:
//!     - feeds: parser.rs
//!     - writes: cache.rs (the only writer)
//!     - configured by: config.rs (SerialConfig)
//!
//! ==============================================================================

use crate::cache::SensorCache;
use crate::config::SerialConfig;
use crate::error::SerialError;
use crate::parser::FrameParser;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info};

/// a raw byte stream from the sensor link
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// read size per call, same as the sensor's largest burst
const CHUNK_SIZE: usize = 1024;

// ==============================================================================================
// MOCK SOURCE (For development machines)
// ==============================================================================================

/// what the mock sensor prints
#[cfg(not(feature = "hardware"))]
pub const MOCK_FRAME: &[u8] = b"25.0,50.0\r\n";

/// how often the mock sensor prints
#[cfg(not(feature = "hardware"))]
pub const MOCK_PERIOD: Duration = Duration::from_secs(10);

#[cfg(not(feature = "hardware"))]
pub fn open(config: &SerialConfig) -> Result<ByteSource, SerialError> {
    use tokio::io::AsyncWriteExt;

    info!(port = %config.port, "Using MOCK serial sensor (no hardware access)");
    let (mut device, host) = tokio::io::duplex(256);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MOCK_PERIOD);
        loop {
            ticker.tick().await;
            if device.write_all(MOCK_FRAME).await.is_err() {
                break;
            }
        }
    });
    Ok(Box::new(host))
}

// ==============================================================================================
// REAL SOURCE (tokio-serial)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub fn open(config: &SerialConfig) -> Result<ByteSource, SerialError> {
    use tokio_serial::SerialPortBuilderExt;

    info!(port = %config.port, baud = config.baud_rate, "Connecting to serial port...");
    let port = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| SerialError::Open {
            port: config.port.clone(),
            reason: e.to_string(),
        })?;
    Ok(Box::new(port))
}

// ==============================================================================
// reader loop
// ==============================================================================

pub struct SerialReader {
    parser: FrameParser,
    cache: SensorCache,
    /// pause after a good frame so trailing bytes of the same burst settle
    settle: Duration,
    show_readings: bool,
}

impl SerialReader {
    pub fn new(cache: SensorCache, config: &SerialConfig, show_readings: bool) -> Self {
        Self {
            parser: FrameParser::new(config.max_buffer_bytes),
            cache,
            settle: Duration::from_millis(config.settle_ms),
            show_readings,
        }
    }

    /// read until the stream fails or closes
    ///
    /// only ever returns an error: Read for i/o failures, Closed at end of
    /// stream.
    pub async fn run<R: AsyncRead + Unpin>(mut self, mut source: R) -> Result<(), SerialError> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => {
                    error!("[SERIAL] stream closed");
                    return Err(SerialError::Closed);
                }
                Ok(n) => n,
                Err(e) => {
                    error!("[SERIAL] read error: {}", e);
                    return Err(SerialError::Read(e));
                }
            };

            let readings = self.parser.feed(&buf[..n]);
            if readings.is_empty() {
                continue;
            }
            for reading in &readings {
                if self.show_readings {
                    info!("[SENSOR] Temp: {:.1}°C | Humidity: {:.1}%", reading.temperature, reading.humidity);
                } else {
                    debug!(temperature = reading.temperature, humidity = reading.humidity, "reading parsed");
                }
                self.cache.update(reading);
            }
            if !self.settle.is_zero() {
                tokio::time::sleep(self.settle).await;
            }
        }
    }
}
