mod auction;
mod config;
mod persistence;
mod service;
mod store;

use anyhow::Result;
use std::sync::Arc;

use crate::{
    config::Config,
    persistence::Persistence,
    service::{
        bidding_engine::BiddingEngine,
        lifecycle::LifecycleController,
        mailer::{HttpApiMailer, LogMailer, NotificationDispatcher, SharedMailer},
        ui::{AppState, Ui},
        ServiceControl,
    },
    store::{SharedBidHistory, SharedLotStore, SharedSettingsStore},
};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load(std::path::Path::new("gavel.json"))?;

    match config.database_url.clone() {
        Some(url) => {
            let persistence = persistence::postgres::PostgresPersistence::new(&url)?;
            let mut connection = persistence.get_connection()?;
            store::postgres::setup_schema(&mut connection)?;
            drop(connection);

            run(
                config,
                persistence,
                Arc::new(store::postgres::PostgresLotStore),
                Arc::new(store::postgres::PostgresBidHistory),
                Arc::new(store::postgres::PostgresSettingsStore),
            )
        }
        None => run(
            config,
            persistence::InMemoryPersistence::new(),
            store::InMemoryLotStore::new_shared(),
            store::InMemoryBidHistory::new_shared(),
            store::InMemorySettingsStore::new_shared(),
        ),
    }
}

fn run<P: Persistence + 'static>(
    config: Config,
    persistence: P,
    lots: SharedLotStore<P>,
    history: SharedBidHistory<P>,
    settings: SharedSettingsStore<P>,
) -> Result<()> {
    let mailer: SharedMailer = match config.mail.endpoint.clone() {
        Some(endpoint) => HttpApiMailer::new_shared(
            endpoint,
            config.mail.from.clone(),
            config.mail.send_timeout(),
        ),
        None => Arc::new(LogMailer),
    };
    let (dispatcher, dispatch_handle) =
        NotificationDispatcher::new(mailer, config.mail.batch_spacing());

    let engine = Arc::new(BiddingEngine::new(
        persistence.clone(),
        lots.clone(),
        history.clone(),
        settings.clone(),
        dispatch_handle.clone(),
        config.eligibility.clone(),
        config.base_url.clone(),
    ));
    let lifecycle = Arc::new(LifecycleController::new(
        persistence,
        lots,
        history,
        settings,
        dispatch_handle,
        config.admin_email.clone(),
        config.base_url.clone(),
    ));

    let svc_ctr = ServiceControl::new();

    ctrlc::set_handler({
        let svc_ctr = svc_ctr.clone();
        move || {
            eprintln!("Stopping all services...");
            svc_ctr.stop_all();
        }
    })?;

    for handle in vec![
        svc_ctr.spawn_loop(dispatcher),
        svc_ctr.spawn_loop(Ui::new(config.bind, AppState { engine, lifecycle })?),
    ] {
        handle.join()?
    }

    Ok(())
}

#[cfg(test)]
mod tests;
