mod auction;
mod lifecycle;
mod mailer;

use crate::{
    auction::{Amount, Eligibility, IncrementTier, Lot},
    persistence::InMemoryPersistence,
    service::{
        bidding_engine::{BidOutcome, BidRequest, BiddingEngine},
        lifecycle::{LifecycleController, LotFields},
        mailer::{InMemoryMailer, NotificationDispatcher},
        LoopService,
    },
    store::{
        InMemoryBidHistory, InMemoryLotStore, InMemorySettingsStore, SharedBidHistory,
        SharedLotStore, SharedSettingsStore,
    },
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};

/// Everything wired over the in-memory ports, dispatcher not spawned so
/// tests pump mail delivery by hand.
pub(crate) struct Harness {
    pub persistence: InMemoryPersistence,
    pub lots: SharedLotStore<InMemoryPersistence>,
    pub history: SharedBidHistory<InMemoryPersistence>,
    pub settings: SharedSettingsStore<InMemoryPersistence>,
    pub mailer: Arc<InMemoryMailer>,
    pub dispatcher: NotificationDispatcher,
    pub engine: Arc<BiddingEngine<InMemoryPersistence>>,
    pub lifecycle: LifecycleController<InMemoryPersistence>,
}

pub(crate) const BASE_URL: &str = "http://auction.test";

impl Harness {
    pub fn new() -> Self {
        Self::with_eligibility(Eligibility::Open)
    }

    pub fn with_eligibility(eligibility: Eligibility) -> Self {
        let persistence = InMemoryPersistence::new();
        let lots = InMemoryLotStore::new_shared();
        let history = InMemoryBidHistory::new_shared();
        let settings = InMemorySettingsStore::new_shared();
        let mailer = InMemoryMailer::new_shared();
        let (dispatcher, dispatch_handle) =
            NotificationDispatcher::new(mailer.clone(), Duration::ZERO);

        let engine = Arc::new(BiddingEngine::new(
            persistence.clone(),
            lots.clone(),
            history.clone(),
            settings.clone(),
            dispatch_handle.clone(),
            eligibility,
            BASE_URL.to_owned(),
        ));
        let lifecycle = LifecycleController::new(
            persistence.clone(),
            lots.clone(),
            history.clone(),
            settings.clone(),
            dispatch_handle,
            Some("admin@auction.test".to_owned()),
            BASE_URL.to_owned(),
        );

        Self {
            persistence,
            lots,
            history,
            settings,
            mailer,
            dispatcher,
            engine,
            lifecycle,
        }
    }

    pub fn add_lot(&self, id: &str, starting_price: Amount, tier: IncrementTier) -> Result<Lot> {
        Ok(self.lifecycle.create_lot(LotFields {
            id: Some(id.to_owned()),
            name: format!("Lot {}", id),
            description: String::new(),
            image_url: String::new(),
            starting_price,
            tier,
            group_id: None,
            display_order: 0,
        })?)
    }

    pub fn bid(
        &self,
        lot_id: &str,
        amount: Amount,
        name: &str,
        email: &str,
    ) -> Result<BidOutcome> {
        self.engine.submit_bid(BidRequest {
            lot_id: lot_id.to_owned(),
            amount,
            name: name.to_owned(),
            email: email.to_owned(),
        })
    }

    /// Pump the dispatcher: one iteration per queued mail.
    pub fn deliver_mail(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.dispatcher.run_iteration()?;
        }
        Ok(())
    }
}
