//! Auction Lifecycle Controller
//!
//! Owns the auction-wide phase and countdown. The engine re-reads the phase
//! inside its own commit, so transitions here take effect for every bid
//! that commits after them, with no in-flight bid invalidated. The
//! administrative lot operations live here as well: they share the stores
//! and the state mutex.
use crate::auction::{unix_ms, Amount, AuctionState, IncrementTier, Lot, LotId, Phase};
use crate::persistence::{Connection, Persistence, Transaction};
use crate::service::mailer::DispatcherHandle;
use crate::service::settlement::{self, SettlementReport};
use crate::store::{
    BidHistory, LotStore, SettingsStore, SharedBidHistory, SharedLotStore, SharedSettingsStore,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("the auction has already ended")]
    AlreadyEnded,
    #[error("unknown lot: {0}")]
    UnknownLot(LotId),
    #[error("lot already exists: {0}")]
    DuplicateLot(LotId),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Administrative lot fields. `starting_price` only takes effect while the
/// lot has no leader.
#[derive(Clone, Debug, Deserialize)]
pub struct LotFields {
    #[serde(default)]
    pub id: Option<LotId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub starting_price: Amount,
    #[serde(default)]
    pub tier: IncrementTier,
    #[serde(default)]
    pub group_id: Option<u32>,
    #[serde(default)]
    pub display_order: u32,
}

/// A lot listing always carries the auction state, so the caller can render
/// paused/ended banners and the countdown without a second call.
#[derive(Clone, Debug, Serialize)]
pub struct LotListing {
    pub auction: AuctionState,
    pub lots: Vec<Lot>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LotDetail {
    pub auction: AuctionState,
    pub lot: Lot,
}

pub struct LifecycleController<P: Persistence> {
    persistence: P,
    lots: SharedLotStore<P>,
    history: SharedBidHistory<P>,
    settings: SharedSettingsStore<P>,
    dispatcher: DispatcherHandle,
    admin_email: Option<String>,
    base_url: String,
    /// Serializes admin transitions so ending the auction settles exactly
    /// once per Ended transition.
    state_mutex: Mutex<()>,
    lot_counter: AtomicU64,
}

impl<P: Persistence> LifecycleController<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: P,
        lots: SharedLotStore<P>,
        history: SharedBidHistory<P>,
        settings: SharedSettingsStore<P>,
        dispatcher: DispatcherHandle,
        admin_email: Option<String>,
        base_url: String,
    ) -> Self {
        Self {
            persistence,
            lots,
            history,
            settings,
            dispatcher,
            admin_email,
            base_url,
            state_mutex: Mutex::new(()),
            lot_counter: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> Result<AuctionState, AdminError> {
        let mut connection = self.persistence.get_connection()?;
        Ok(self.settings.load(&mut connection)?)
    }

    pub fn pause(&self) -> Result<AuctionState, AdminError> {
        self.update_state(|state| match state.phase {
            Phase::Ended => Err(AdminError::AlreadyEnded),
            _ => Ok(AuctionState {
                phase: Phase::Paused,
                ..state
            }),
        })
    }

    pub fn resume(&self) -> Result<AuctionState, AdminError> {
        self.update_state(|state| match state.phase {
            Phase::Ended => Err(AdminError::AlreadyEnded),
            _ => Ok(AuctionState {
                phase: Phase::Active,
                ..state
            }),
        })
    }

    /// Set the advisory countdown; zero minutes clears it. The deadline is
    /// display state, reaching it never ends the auction by itself.
    pub fn set_countdown(&self, minutes: u64) -> Result<AuctionState, AdminError> {
        self.update_state(|state| match state.phase {
            Phase::Ended => Err(AdminError::AlreadyEnded),
            _ => Ok(AuctionState {
                deadline_unix_ms: if minutes == 0 {
                    None
                } else {
                    Some(unix_ms() + minutes * 60_000)
                },
                ..state
            }),
        })
    }

    /// Flip to Ended and resolve the settlement.
    ///
    /// The flip is the single-execution guard: a second caller gets
    /// `AlreadyEnded` before settlement can run again.
    pub fn end_auction(&self) -> Result<SettlementReport, AdminError> {
        self.update_state(|state| match state.phase {
            Phase::Ended => Err(AdminError::AlreadyEnded),
            _ => Ok(AuctionState {
                phase: Phase::Ended,
                deadline_unix_ms: None,
            }),
        })?;

        let mut connection = self.persistence.get_connection()?;
        let report = settlement::settle(
            &mut connection,
            &*self.lots,
            &*self.history,
            &self.base_url,
        )?;

        settlement::dispatch_report(&report, &self.dispatcher, self.admin_email.as_deref());
        Ok(report)
    }

    /// Destructive full reset: clears all bid history, restores every lot
    /// to its starting price with no leader, back to Active, no countdown.
    pub fn reset(&self) -> Result<(), AdminError> {
        let _guard = self.state_mutex.lock();
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        self.history.clear_tr(&mut transaction)?;
        for lot in self.lots.list_tr(&mut transaction)? {
            self.lots.store_tr(&mut transaction, &lot.cleared())?;
        }
        self.settings
            .store_tr(&mut transaction, AuctionState::default())?;
        transaction.commit()?;

        info!("auction reset, bid history cleared");
        Ok(())
    }

    pub fn list_lots(&self) -> Result<LotListing, AdminError> {
        let mut connection = self.persistence.get_connection()?;
        let auction = self.settings.load(&mut connection)?;
        let lots = self
            .lots
            .list(&mut connection)?
            .into_iter()
            .filter(|lot| !lot.retired)
            .collect();
        Ok(LotListing { auction, lots })
    }

    pub fn list_lots_by_group(&self, group_id: u32) -> Result<LotListing, AdminError> {
        let mut listing = self.list_lots()?;
        listing.lots.retain(|lot| lot.group_id == Some(group_id));
        Ok(listing)
    }

    pub fn get_lot(&self, lot_id: &str) -> Result<LotDetail, AdminError> {
        let mut connection = self.persistence.get_connection()?;
        let auction = self.settings.load(&mut connection)?;
        match self.lots.load(&mut connection, lot_id)? {
            Some(lot) if !lot.retired => Ok(LotDetail { auction, lot }),
            _ => Err(AdminError::UnknownLot(lot_id.to_owned())),
        }
    }

    pub fn create_lot(&self, fields: LotFields) -> Result<Lot, AdminError> {
        let id = fields.id.clone().unwrap_or_else(|| {
            format!(
                "lot-{}-{}",
                unix_ms(),
                self.lot_counter.fetch_add(1, Ordering::Relaxed)
            )
        });

        let _guard = self.state_mutex.lock();
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        if self.lots.load_tr(&mut transaction, &id)?.is_some() {
            return Err(AdminError::DuplicateLot(id));
        }

        let lot = Lot {
            id,
            name: fields.name,
            description: fields.description,
            image_url: fields.image_url,
            starting_price: fields.starting_price,
            current_bid: fields.starting_price,
            leader: None,
            tier: fields.tier,
            group_id: fields.group_id,
            display_order: fields.display_order,
            retired: false,
        };
        self.lots.store_tr(&mut transaction, &lot)?;
        transaction.commit()?;

        info!(lot_id = %lot.id, name = %lot.name, "lot created");
        Ok(lot)
    }

    pub fn edit_lot(&self, lot_id: &str, fields: LotFields) -> Result<Lot, AdminError> {
        let _guard = self.state_mutex.lock();
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let mut lot = match self.lots.load_tr(&mut transaction, lot_id)? {
            Some(lot) if !lot.retired => lot,
            _ => return Err(AdminError::UnknownLot(lot_id.to_owned())),
        };

        lot.name = fields.name;
        lot.description = fields.description;
        lot.image_url = fields.image_url;
        lot.tier = fields.tier;
        lot.group_id = fields.group_id;
        lot.display_order = fields.display_order;
        // The starting price is immutable once someone leads; with no
        // leader the current bid re-derives from it.
        if lot.leader.is_none() {
            lot.starting_price = fields.starting_price;
            lot.current_bid = fields.starting_price;
        }

        self.lots.store_tr(&mut transaction, &lot)?;
        transaction.commit()?;
        Ok(lot)
    }

    /// Soft delete: the lot disappears from listings and settlement but
    /// stays behind its bid history.
    pub fn delete_lot(&self, lot_id: &str) -> Result<(), AdminError> {
        let _guard = self.state_mutex.lock();
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let mut lot = match self.lots.load_tr(&mut transaction, lot_id)? {
            Some(lot) if !lot.retired => lot,
            _ => return Err(AdminError::UnknownLot(lot_id.to_owned())),
        };
        lot.retired = true;

        self.lots.store_tr(&mut transaction, &lot)?;
        transaction.commit()?;

        info!(lot_id = %lot_id, "lot retired");
        Ok(())
    }

    fn update_state<F>(&self, f: F) -> Result<AuctionState, AdminError>
    where
        F: FnOnce(AuctionState) -> Result<AuctionState, AdminError>,
    {
        let _guard = self.state_mutex.lock();
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let state = self.settings.load_tr(&mut transaction)?;
        let new_state = f(state)?;
        self.settings.store_tr(&mut transaction, new_state)?;
        transaction.commit()?;

        info!(
            phase = new_state.phase.as_str(),
            deadline = ?new_state.deadline_unix_ms,
            "auction state changed"
        );
        Ok(new_state)
    }
}
