//! Durable stores behind the engine
//!
//! Three stores, each a trait over the [`crate::persistence`] handles so one
//! transaction can span all of them: the lot table, the append-only bid
//! history log, and the singleton auction-state record.
pub mod postgres;

use crate::auction::{AuctionState, BidRecord, Lot, LotId, LotIdRef};
use crate::persistence::{self, Persistence};
use anyhow::Result;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

/// Position of a record in the bid history log. Monotonic per log, used as
/// the tie-break ordering for runner-up resolution.
pub type Seq = u64;

/// Durable record of each lot's current price/leader state.
pub trait LotStore {
    type Persistence: Persistence;

    fn list(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
    ) -> Result<Vec<Lot>>;

    fn load(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        lot_id: LotIdRef,
    ) -> Result<Option<Lot>>;

    fn list_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
    ) -> Result<Vec<Lot>>;

    fn load_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
        lot_id: LotIdRef,
    ) -> Result<Option<Lot>>;

    fn store_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
        lot: &Lot,
    ) -> Result<()>;
}

pub type SharedLotStore<P> = Arc<dyn LotStore<Persistence = P> + Send + Sync>;

/// Append-only log of every accepted bid.
///
/// Records are never mutated; the whole log is cleared only by the
/// administrator's full reset.
pub trait BidHistory {
    type Persistence: Persistence;

    fn append_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
        record: &BidRecord,
    ) -> Result<Seq>;

    /// All records for a lot, ascending by sequence.
    fn for_lot(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
        lot_id: LotIdRef,
    ) -> Result<Vec<(Seq, BidRecord)>>;

    fn clear_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
    ) -> Result<()>;
}

pub type SharedBidHistory<P> = Arc<dyn BidHistory<Persistence = P> + Send + Sync>;

/// The singleton auction-state record.
pub trait SettingsStore {
    type Persistence: Persistence;

    fn load(
        &self,
        conn: &mut <Self::Persistence as Persistence>::Connection,
    ) -> Result<AuctionState>;

    fn load_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
    ) -> Result<AuctionState>;

    fn store_tr<'a>(
        &self,
        transaction: &mut <Self::Persistence as Persistence>::Transaction<'a>,
        state: AuctionState,
    ) -> Result<()>;
}

pub type SharedSettingsStore<P> = Arc<dyn SettingsStore<Persistence = P> + Send + Sync>;

pub struct InMemoryLotStore(Mutex<BTreeMap<LotId, Lot>>);

impl InMemoryLotStore {
    pub fn new() -> Self {
        Self(Mutex::new(BTreeMap::default()))
    }

    pub fn new_shared() -> SharedLotStore<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }

    fn sorted(&self) -> Vec<Lot> {
        let mut lots: Vec<Lot> = self.0.lock().values().cloned().collect();
        lots.sort_by_key(|lot| (lot.display_order, lot.id.clone()));
        lots
    }
}

impl LotStore for InMemoryLotStore {
    type Persistence = persistence::InMemoryPersistence;

    fn list(&self, _conn: &mut persistence::InMemoryConnection) -> Result<Vec<Lot>> {
        Ok(self.sorted())
    }

    fn load(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        lot_id: LotIdRef,
    ) -> Result<Option<Lot>> {
        Ok(self.0.lock().get(lot_id).cloned())
    }

    fn list_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
    ) -> Result<Vec<Lot>> {
        Ok(self.sorted())
    }

    fn load_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        lot_id: LotIdRef,
    ) -> Result<Option<Lot>> {
        Ok(self.0.lock().get(lot_id).cloned())
    }

    fn store_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        lot: &Lot,
    ) -> Result<()> {
        self.0.lock().insert(lot.id.clone(), lot.clone());
        Ok(())
    }
}

pub struct InMemoryBidHistory(Mutex<Vec<BidRecord>>);

impl InMemoryBidHistory {
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    pub fn new_shared() -> SharedBidHistory<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl BidHistory for InMemoryBidHistory {
    type Persistence = persistence::InMemoryPersistence;

    fn append_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        record: &BidRecord,
    ) -> Result<Seq> {
        let mut log = self.0.lock();
        log.push(record.clone());
        Ok(log.len() as Seq - 1)
    }

    fn for_lot(
        &self,
        _conn: &mut persistence::InMemoryConnection,
        lot_id: LotIdRef,
    ) -> Result<Vec<(Seq, BidRecord)>> {
        Ok(self
            .0
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, record)| record.lot_id == lot_id)
            .map(|(i, record)| (i as Seq, record.clone()))
            .collect())
    }

    fn clear_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
    ) -> Result<()> {
        self.0.lock().clear();
        Ok(())
    }
}

pub struct InMemorySettingsStore(Mutex<AuctionState>);

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self(Mutex::new(AuctionState::default()))
    }

    pub fn new_shared() -> SharedSettingsStore<persistence::InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl SettingsStore for InMemorySettingsStore {
    type Persistence = persistence::InMemoryPersistence;

    fn load(&self, _conn: &mut persistence::InMemoryConnection) -> Result<AuctionState> {
        Ok(*self.0.lock())
    }

    fn load_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
    ) -> Result<AuctionState> {
        Ok(*self.0.lock())
    }

    fn store_tr<'a>(
        &self,
        _transaction: &mut persistence::InMemoryTransaction<'a>,
        state: AuctionState,
    ) -> Result<()> {
        *self.0.lock() = state;
        Ok(())
    }
}
