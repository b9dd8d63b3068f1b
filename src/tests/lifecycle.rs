use super::Harness;
use crate::auction::{unix_ms, AuctionState, IncrementTier, Phase, RejectReason};
use crate::persistence::{Connection, Persistence, Transaction};
use crate::service::bidding_engine::BidOutcome;
use crate::service::lifecycle::{AdminError, LotFields};
use crate::store::{BidHistory, SettingsStore};
use anyhow::Result;

#[test]
fn pause_resume_roundtrip() -> Result<()> {
    let h = Harness::new();

    assert_eq!(h.lifecycle.state()?.phase, Phase::Active);
    assert_eq!(h.lifecycle.pause()?.phase, Phase::Paused);
    assert_eq!(h.lifecycle.resume()?.phase, Phase::Active);
    Ok(())
}

#[test]
fn countdown_set_and_clear() -> Result<()> {
    let h = Harness::new();

    let before = unix_ms();
    let state = h.lifecycle.set_countdown(5)?;
    let deadline = state.deadline_unix_ms.unwrap();
    assert!(deadline >= before + 5 * 60_000);

    assert_eq!(h.lifecycle.set_countdown(0)?.deadline_unix_ms, None);
    Ok(())
}

#[test]
fn expired_countdown_does_not_end_the_auction() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;

    {
        let mut connection = h.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;
        h.settings.store_tr(
            &mut transaction,
            AuctionState {
                phase: Phase::Active,
                deadline_unix_ms: Some(unix_ms() - 10_000),
            },
        )?;
        transaction.commit()?;
    }

    // the deadline is advisory display state; bids still go through
    assert!(matches!(
        h.bid("art-1", 5000, "Alice", "alice@x.test")?,
        BidOutcome::Accepted(_)
    ));
    assert_eq!(h.lifecycle.state()?.phase, Phase::Active);
    Ok(())
}

#[test]
fn ending_is_terminal() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;
    h.lifecycle.set_countdown(10)?;

    h.lifecycle.end_auction()?;

    let state = h.lifecycle.state()?;
    assert_eq!(state.phase, Phase::Ended);
    assert_eq!(state.deadline_unix_ms, None);

    assert!(matches!(
        h.lifecycle.end_auction(),
        Err(AdminError::AlreadyEnded)
    ));
    assert!(matches!(h.lifecycle.pause(), Err(AdminError::AlreadyEnded)));
    assert!(matches!(
        h.bid("art-1", 5000, "Alice", "alice@x.test")?,
        BidOutcome::Rejected(RejectReason::Ended)
    ));
    Ok(())
}

#[test]
fn reset_restores_everything() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;
    h.bid("art-1", 5000, "Alice", "alice@x.test")?;
    h.bid("art-1", 5500, "Bob", "bob@x.test")?;
    h.lifecycle.end_auction()?;

    h.lifecycle.reset()?;

    assert_eq!(h.lifecycle.state()?.phase, Phase::Active);

    let lot = h.lifecycle.get_lot("art-1")?.lot;
    assert_eq!(lot.current_bid, 5000);
    assert_eq!(lot.leader, None);

    let mut connection = h.persistence.get_connection()?;
    assert!(h.history.for_lot(&mut connection, "art-1")?.is_empty());
    drop(connection);

    // a fresh auction: the starting price is biddable again
    assert!(matches!(
        h.bid("art-1", 5000, "Carol", "carol@x.test")?,
        BidOutcome::Accepted(_)
    ));
    Ok(())
}

#[test]
fn edit_rederives_current_bid_only_without_leader() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;

    let fields = |price| LotFields {
        id: None,
        name: "Renamed".to_owned(),
        description: "New".to_owned(),
        image_url: String::new(),
        starting_price: price,
        tier: IncrementTier::Small,
        group_id: Some(4),
        display_order: 7,
    };

    let lot = h.lifecycle.edit_lot("art-1", fields(6000))?;
    assert_eq!(lot.starting_price, 6000);
    assert_eq!(lot.current_bid, 6000);
    assert_eq!(lot.name, "Renamed");
    assert_eq!(lot.group_id, Some(4));

    h.bid("art-1", 6000, "Alice", "alice@x.test")?;

    // leader exists now: the price fields are frozen
    let lot = h.lifecycle.edit_lot("art-1", fields(9000))?;
    assert_eq!(lot.starting_price, 6000);
    assert_eq!(lot.current_bid, 6000);
    Ok(())
}

#[test]
fn delete_is_soft() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;
    h.bid("art-1", 5000, "Alice", "alice@x.test")?;

    h.lifecycle.delete_lot("art-1")?;

    assert!(h.lifecycle.list_lots()?.lots.is_empty());
    assert!(matches!(
        h.lifecycle.get_lot("art-1"),
        Err(AdminError::UnknownLot(_))
    ));
    assert!(matches!(
        h.bid("art-1", 5100, "Bob", "bob@x.test")?,
        BidOutcome::Rejected(RejectReason::UnknownLot { .. })
    ));

    // the bid history stays behind the retired lot
    let mut connection = h.persistence.get_connection()?;
    assert_eq!(h.history.for_lot(&mut connection, "art-1")?.len(), 1);
    Ok(())
}

#[test]
fn duplicate_lot_id_is_refused() -> Result<()> {
    let h = Harness::new();
    h.add_lot("art-1", 5000, IncrementTier::Large)?;

    let again = h.lifecycle.create_lot(LotFields {
        id: Some("art-1".to_owned()),
        name: "Imposter".to_owned(),
        description: String::new(),
        image_url: String::new(),
        starting_price: 6000,
        tier: IncrementTier::Small,
        group_id: None,
        display_order: 0,
    });
    assert!(matches!(again, Err(AdminError::DuplicateLot(_))));
    Ok(())
}

#[test]
fn listing_carries_state_and_display_order() -> Result<()> {
    let h = Harness::new();
    h.lifecycle.create_lot(LotFields {
        id: Some("b".to_owned()),
        name: "Second".to_owned(),
        description: String::new(),
        image_url: String::new(),
        starting_price: 1000,
        tier: IncrementTier::Standard,
        group_id: Some(2),
        display_order: 2,
    })?;
    h.lifecycle.create_lot(LotFields {
        id: Some("a".to_owned()),
        name: "First".to_owned(),
        description: String::new(),
        image_url: String::new(),
        starting_price: 1000,
        tier: IncrementTier::Standard,
        group_id: Some(1),
        display_order: 1,
    })?;

    h.lifecycle.pause()?;

    let listing = h.lifecycle.list_lots()?;
    assert_eq!(listing.auction.phase, Phase::Paused);
    assert_eq!(
        listing.lots.iter().map(|lot| lot.id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );

    let grouped = h.lifecycle.list_lots_by_group(2)?;
    assert_eq!(grouped.lots.len(), 1);
    assert_eq!(grouped.lots[0].id, "b");
    Ok(())
}
