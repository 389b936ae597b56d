use std::sync::{Arc, Mutex};

use anyhow::Result;

mod api;
mod config;
mod db;
mod dispatch;
mod robot;
mod schema;
mod status;
mod store;
mod utils;

#[cfg(test)]
mod testutil;

use crate::api::AppState;
use crate::config::PanelConfig;
use crate::robot::{SessionFactory, SimFactory};

#[actix_web::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cfg = Arc::new(PanelConfig::load()?);
    let db = Arc::new(Mutex::new(db::Db::connect()?));

    db::lock(&db)?.init_settings()?;
    store::seed_catalog(&db, &cfg)?;

    // The vendor SDK adapter plugs in here; the simulator stands in while
    // no robot is linked.
    let factory: Arc<dyn SessionFactory> = Arc::new(SimFactory);

    let state = AppState { db, factory, cfg };
    log::info!("panel listening on {}", state.cfg.bind);
    api::new_http_server(state).await?;
    Ok(())
}
