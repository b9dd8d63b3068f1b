//! Bid Processing Engine
//!
//! The rules that decide whether a submitted bid is valid, and the commit
//! step that atomically promotes it to leading status. Everything here is
//! synchronous: one lot, one logical writer at a time, with the lot update
//! and the history append in a single storage transaction. Notifications
//! are queued after the commit and can neither block nor fail it.
use crate::auction::{
    format_usd, unix_ms, Amount, BidRecord, Bidder, Eligibility, Lot, LotId, Phase, RejectReason,
};
use crate::persistence::{Connection, Persistence, Transaction};
use crate::service::mailer::{DispatcherHandle, Mail};
use crate::store::{
    BidHistory, LotStore, SettingsStore, SharedBidHistory, SharedLotStore, SharedSettingsStore,
};
use anyhow::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

/// A typed, validated bid submission.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BidRequest {
    pub lot_id: LotId,
    pub amount: Amount,
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AcceptedBid {
    /// Lot state right after the commit.
    pub lot: Lot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BidOutcome {
    Accepted(AcceptedBid),
    Rejected(RejectReason),
}

enum Commit {
    Accepted { lot: Lot, previous: Option<Bidder> },
    Rejected(RejectReason),
}

pub struct BiddingEngine<P: Persistence> {
    persistence: P,
    lots: SharedLotStore<P>,
    history: SharedBidHistory<P>,
    settings: SharedSettingsStore<P>,
    dispatcher: DispatcherHandle,
    eligibility: Eligibility,
    base_url: String,
    /// One logical writer per lot: the whole read-validate-write for a lot
    /// happens under its entry here. Different lots proceed in parallel.
    lot_locks: Mutex<BTreeMap<LotId, Arc<Mutex<()>>>>,
}

impl<P: Persistence> BiddingEngine<P> {
    pub fn new(
        persistence: P,
        lots: SharedLotStore<P>,
        history: SharedBidHistory<P>,
        settings: SharedSettingsStore<P>,
        dispatcher: DispatcherHandle,
        eligibility: Eligibility,
        base_url: String,
    ) -> Self {
        Self {
            persistence,
            lots,
            history,
            settings,
            dispatcher,
            eligibility,
            base_url,
            lot_locks: Mutex::new(BTreeMap::new()),
        }
    }

    fn lot_lock(&self, lot_id: &str) -> Arc<Mutex<()>> {
        self.lot_locks
            .lock()
            .entry(lot_id.to_owned())
            .or_default()
            .clone()
    }

    /// Submit a bid. `Ok(Rejected(..))` is the business "no"; `Err(..)` is a
    /// storage failure. Either way the lot and its history stay consistent:
    /// nothing is visible unless the whole commit went through.
    pub fn submit_bid(&self, request: BidRequest) -> Result<BidOutcome> {
        if request.name.trim().is_empty() {
            return Ok(BidOutcome::Rejected(RejectReason::MissingName));
        }

        let lock = self.lot_lock(&request.lot_id);
        let commit = {
            let _guard = lock.lock();
            self.commit(&request)?
        };

        Ok(match commit {
            Commit::Accepted { lot, previous } => {
                info!(
                    lot_id = %lot.id,
                    amount = %format_usd(lot.current_bid),
                    bidder = %request.email,
                    "bid accepted"
                );
                self.queue_notifications(&lot, previous.as_ref());
                BidOutcome::Accepted(AcceptedBid { lot })
            }
            Commit::Rejected(reason) => {
                debug!(lot_id = %request.lot_id, %reason, "bid rejected");
                BidOutcome::Rejected(reason)
            }
        })
    }

    /// The atomic part: phase re-check, lot load, validation and the
    /// write of lot + history record, all against commit-time state.
    fn commit(&self, request: &BidRequest) -> Result<Commit> {
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        // A pause or end that lands between request entry and here wins:
        // the phase the commit sees is the one that counts.
        let state = self.settings.load_tr(&mut transaction)?;
        match state.phase {
            Phase::Active => (),
            Phase::Paused => return Ok(Commit::Rejected(RejectReason::Paused)),
            Phase::Ended => return Ok(Commit::Rejected(RejectReason::Ended)),
        }

        let lot = match self.lots.load_tr(&mut transaction, &request.lot_id)? {
            Some(lot) if !lot.retired => lot,
            _ => {
                return Ok(Commit::Rejected(RejectReason::UnknownLot {
                    lot_id: request.lot_id.clone(),
                }))
            }
        };

        if let Err(reason) = self.eligibility.check(&request.email) {
            return Ok(Commit::Rejected(reason));
        }

        if let Err(reason) = lot.valid_range().check(request.amount) {
            return Ok(Commit::Rejected(reason));
        }

        let bidder = Bidder {
            name: request.name.trim().to_owned(),
            email: request.email.clone(),
        };
        let previous = lot.leader.clone();
        let lot = lot.with_leader(bidder.clone(), request.amount);

        self.lots.store_tr(&mut transaction, &lot)?;
        self.history.append_tr(
            &mut transaction,
            &BidRecord {
                lot_id: lot.id.clone(),
                amount: request.amount,
                bidder,
                at_unix_ms: unix_ms(),
            },
        )?;
        transaction.commit()?;

        Ok(Commit::Accepted { lot, previous })
    }

    fn queue_notifications(&self, lot: &Lot, previous: Option<&Bidder>) {
        let leader = lot.leader.as_ref().expect("accepted bid has a leader");
        // Same subject per lot threads the whole conversation in the
        // bidders' mail clients.
        let subject = format!("Auction Status: {}", lot.name);
        let link = format!("{}/lots/{}", self.base_url.trim_end_matches('/'), lot.id);

        self.dispatcher.enqueue(Mail {
            to: leader.email.clone(),
            subject: subject.clone(),
            body: format!(
                "<h3>Bid Confirmed!</h3>\
                 <p>Hello {},</p>\
                 <p>You have successfully placed a bid of <strong>{}</strong> on \"{}\".</p>\
                 <p>We will notify you in this thread if you get outbid.</p>\
                 <a href=\"{}\">View lot</a>",
                leader.name,
                format_usd(lot.current_bid),
                lot.name,
                link,
            ),
            attachment: None,
        });

        if let Some(previous) = previous {
            if !previous.same_email(&leader.email) {
                self.dispatcher.enqueue(Mail {
                    to: previous.email.clone(),
                    subject,
                    body: format!(
                        "<h3>You have been outbid!</h3>\
                         <p>Hello {},</p>\
                         <p>Someone just bid <strong>{}</strong> on \"{}\".</p>\
                         <p>Don't lose this piece! Click below to bid again.</p>\
                         <a href=\"{}\">Bid Higher Now</a>",
                        previous.name,
                        format_usd(lot.current_bid),
                        lot.name,
                        link,
                    ),
                    attachment: None,
                });
            }
        }
    }
}
