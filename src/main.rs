//! ==============================================================================
//! main.rs - ht-logger host entry point
//! ==============================================================================
//!
//! purpose:
//!     this is the composition root. it builds exactly one cache, one store
//!     and one arbiter, hands clones of them to the three independently timed
//!     activities and waits for ctrl-c.
//!
//! responsibilities:
//!     - load configuration (config/host.toml or defaults)
//!     - initialize logging
//!     - open the history store (fatal if it cannot be opened)
//!     - start the serial reader (xbee on /dev/ttyUSB0, or the mock sensor)
//!     - start the 30s persistence cycle
//!     - serve the query endpoints
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      rust host (this file)                    │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//!     │  │ serial reader│   │ persistence  │   │ web server       │  │
//!     │  │ (~10s frames)│   │ (30s cycle)  │   │ (port 3000)      │  │
//!     │  └──────┬───────┘   └───┬──────┬───┘   └────┬────────┬────┘  │
//!     │         │ update        │ read │ insert     │ read   │ query │
//!     │         ▼               ▼      │            ▼        │       │
//!     │     ┌────────────────────────┐ │                     │       │
//!     │     │   last-reading cache   │ │                     │       │
//!     │     └────────────────────────┘ ▼                     ▼       │
//!     │                        ┌───────────────────────────────┐     │
//!     │                        │ arbiter (one op at a time,    │     │
//!     │                        │ 60s budget) -> history store  │     │
//!     │                        └───────────────────────────────┘     │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use ht_logger::arbiter::StoreArbiter;
use ht_logger::cache::SensorCache;
use ht_logger::config::HostConfig;
use ht_logger::facade::QueryFacade;
use ht_logger::scheduler::PersistenceScheduler;
use ht_logger::serial::{self, SerialReader};
use ht_logger::store::HistoryStore;
use ht_logger::{logging, server};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  HT Logger - Remote Temperature/Humidity Host");
    println!("  serial sensor -> cache -> history -> http");
    println!("===========================================================");

    // step 1: load configuration and logging
    let config = HostConfig::load_or_default();
    config.print_summary();
    logging::init(&config.logging);

    // step 2: open the history store behind its arbiter
    info!("[STARTUP] Opening history store...");
    let store = HistoryStore::open(&config.store.path)
        .with_context(|| format!("failed to open history store {}", config.store.path.display()))?;
    let store = StoreArbiter::new(store);
    let cache = SensorCache::new();
    let facade = QueryFacade::new(cache.clone(), store.clone(), config.store_budget());
    info!("[STARTUP] ✓ History store ready");

    // step 3: serial reader (sole writer of the cache)
    let reader_task = match serial::open(&config.serial) {
        Ok(source) => {
            let reader = SerialReader::new(cache.clone(), &config.serial, config.logging.show_sensor_data);
            info!("[STARTUP] ✓ Serial reader running");
            Some(tokio::spawn(async move {
                if let Err(e) = reader.run(source).await {
                    error!("[SERIAL] reader stopped, serving cached/history data only: {}", e);
                }
            }))
        }
        Err(e) => {
            error!("[SERIAL] {}", e);
            None
        }
    };

    // step 4: persistence cycle
    let scheduler = PersistenceScheduler::new(
        cache,
        store,
        config.persistence_interval(),
        config.store_budget(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    // step 5: web server
    let bind = config.server.bind.clone();
    let web_task = tokio::spawn(async move {
        if let Err(e) = server::run_server(&bind, facade).await {
            error!("[HTTP] web server error: {:#}", e);
        }
    });
    info!("[STARTUP] ✓ Endpoints live at http://{}", config.server.bind);

    // step 6: run until ctrl-c
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("[SHUTDOWN] Closing serial port and stopping persistence cycle");
    if let Some(task) = reader_task {
        task.abort();
    }
    scheduler_task.abort();
    web_task.abort();
    Ok(())
}
