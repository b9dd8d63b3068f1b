use crate::auction::*;

fn lot_at(starting_price: Amount, tier: IncrementTier) -> Lot {
    Lot {
        id: "l1".to_owned(),
        name: "Lot".to_owned(),
        description: String::new(),
        image_url: String::new(),
        starting_price,
        current_bid: starting_price,
        leader: None,
        tier,
        group_id: None,
        display_order: 0,
        retired: false,
    }
}

fn bidder(email: &str) -> Bidder {
    Bidder {
        name: "Someone".to_owned(),
        email: email.to_owned(),
    }
}

#[test]
fn increment_tier_table() {
    assert_eq!(IncrementTier::Small.increments(), (25, 100));
    assert_eq!(IncrementTier::Medium.increments(), (50, 500));
    assert_eq!(IncrementTier::Large.increments(), (100, 2500));
    assert_eq!(IncrementTier::Standard.increments(), (100, 1000));
    assert_eq!(IncrementTier::default(), IncrementTier::Standard);
}

#[test]
fn range_without_leader_starts_at_starting_price() {
    let lot = lot_at(5000, IncrementTier::Large);
    assert_eq!(lot.valid_range(), BidRange { min: 5000, max: 7500 });
}

#[test]
fn range_with_leader_steps_from_current_bid() {
    let lot = lot_at(5000, IncrementTier::Large).with_leader(bidder("a@x.test"), 5500);
    assert_eq!(lot.valid_range(), BidRange { min: 5600, max: 8000 });
}

#[test]
fn range_check_reports_the_violated_boundary() {
    let range = BidRange { min: 5100, max: 7500 };

    assert_eq!(
        range.check(5000),
        Err(RejectReason::TooLow {
            amount: 5000,
            min: 5100,
            max: 7500,
        })
    );
    assert_eq!(
        range.check(9500),
        Err(RejectReason::TooHigh {
            amount: 9500,
            min: 5100,
            max: 7500,
        })
    );
    assert_eq!(range.check(5100), Ok(()));
    assert_eq!(range.check(7500), Ok(()));
}

#[test]
fn cleared_lot_returns_to_starting_price() {
    let lot = lot_at(5000, IncrementTier::Large)
        .with_leader(bidder("a@x.test"), 6000)
        .cleared();
    assert_eq!(lot.current_bid, 5000);
    assert_eq!(lot.leader, None);
}

#[test]
fn open_eligibility_still_wants_an_address() {
    assert_eq!(Eligibility::Open.check("alice@x.test"), Ok(()));
    assert!(Eligibility::Open.check("not-an-address").is_err());
}

#[test]
fn domain_eligibility_is_case_insensitive() {
    let policy = Eligibility::EnforceDomain("@school.org".to_owned());
    assert_eq!(policy.check("kid@School.ORG"), Ok(()));
    assert!(policy.check("kid@elsewhere.org").is_err());
}

#[test]
fn usd_formatting() {
    assert_eq!(format_usd(5000), "$50.00");
    assert_eq!(format_usd(55), "$0.55");
    assert_eq!(format_usd(9501), "$95.01");
}
