use super::*;
use crate::listing::Bids;

#[test]
fn first_bid_needs_only_to_be_positive() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[])?;

    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "alice", "0")),
        Some(ErrorKind::InvalidAmount)
    );

    let listing = market.ledger.place_bid(&listing.id, "alice", "50")?;
    assert_eq!(listing.bids.get("alice"), Some(amount("50")));
    assert_eq!(listing.bids.len(), 1);
    Ok(())
}

#[test]
fn new_bidder_must_beat_every_existing_bid() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "120"), ("bob", "150")])?;

    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "carol", "140")),
        Some(ErrorKind::BidTooLow)
    );
    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "carol", "150")),
        Some(ErrorKind::BidTooLow)
    );

    let listing = market.ledger.place_bid(&listing.id, "carol", "200")?;
    let expected: Bids = [
        ("alice", amount("120")),
        ("bob", amount("150")),
        ("carol", amount("200")),
    ]
    .into_iter()
    .collect();
    assert_eq!(listing.bids, expected);
    Ok(())
}

#[test]
fn raising_replaces_the_bidders_entry() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "120"), ("bob", "150")])?;

    let listing = market.ledger.place_bid(&listing.id, "alice", "175.25")?;
    assert_eq!(listing.bids.len(), 2);
    assert_eq!(listing.bids.get("alice"), Some(amount("175.25")));
    assert_eq!(listing.bids.get("bob"), Some(amount("150")));

    // the current leader has to beat themselves too
    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "alice", "175.25")),
        Some(ErrorKind::BidTooLow)
    );
    Ok(())
}

#[test]
fn amounts_are_compared_as_numbers() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "9")])?;

    // lexically "10" < "9"
    let listing = market.ledger.place_bid(&listing.id, "bob", "10")?;
    assert_eq!(listing.bids.highest(), Some(amount("10")));

    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "carol", "10.00")),
        Some(ErrorKind::BidTooLow)
    );
    Ok(())
}

#[test]
fn invalid_amounts_are_rejected_whatever_the_bids() -> Result<()> {
    let market = Market::new();
    let empty = market.listing_with_bids(&[])?;
    let busy = market.listing_with_bids(&[("alice", "120")])?;

    for listing in [&empty, &busy] {
        for bad in ["abc", "", "0", "-10", "1,000", "1_000", "1__0", "5_"] {
            assert_eq!(
                kind(market.ledger.place_bid(&listing.id, "bob", bad)),
                Some(ErrorKind::InvalidAmount),
                "{bad:?}"
            );
        }
    }

    assert_eq!(market.directory.get_by_id(&busy.id)?.bids, busy.bids);
    Ok(())
}

#[test]
fn rejected_bid_changes_nothing() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "120"), ("bob", "150")])?;

    assert!(market.ledger.place_bid(&listing.id, "carol", "100").is_err());
    assert_eq!(market.directory.get_by_id(&listing.id)?, listing);
    Ok(())
}

#[test]
fn bidding_on_a_missing_listing_is_not_found() {
    let market = Market::new();
    assert_eq!(
        kind(market.ledger.place_bid("nope", "alice", "10")),
        Some(ErrorKind::NotFound)
    );
    // existence is checked before the amount
    assert_eq!(
        kind(market.ledger.place_bid("nope", "alice", "abc")),
        Some(ErrorKind::NotFound)
    );
}

#[test]
fn owner_bid_follows_the_ordinary_rules() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "120")])?;

    // the marketplace hides own listings; the ledger itself does not refuse
    assert!(market.directory.list_marketplace("owner")?.is_empty());
    assert_eq!(
        kind(market.ledger.place_bid(&listing.id, "owner", "100")),
        Some(ErrorKind::BidTooLow)
    );
    let listing = market.ledger.place_bid(&listing.id, "owner", "130")?;
    assert_eq!(listing.bids.get("owner"), Some(amount("130")));
    Ok(())
}

#[test]
fn cancelling_lowers_the_baseline() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("bob", "150"), ("alice", "300")])?;

    let listing = market.ledger.cancel_bid(&listing.id, "alice")?;
    assert_eq!(
        listing.bids,
        [("bob", amount("150"))].into_iter().collect::<Bids>()
    );

    let listing = market.ledger.place_bid(&listing.id, "carol", "200")?;
    assert_eq!(listing.bids.highest(), Some(amount("200")));

    // alice comes back with the old amount and is ahead again
    let listing = market.ledger.place_bid(&listing.id, "alice", "300")?;
    assert_eq!(listing.bids.get("alice"), Some(amount("300")));
    Ok(())
}

#[test]
fn cancelling_without_a_bid_fails_every_time() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("bob", "150")])?;

    for _ in 0..2 {
        assert_eq!(
            kind(market.ledger.cancel_bid(&listing.id, "alice")),
            Some(ErrorKind::NoBidToCancel)
        );
    }
    assert_eq!(market.directory.get_by_id(&listing.id)?.bids.len(), 1);

    market.ledger.cancel_bid(&listing.id, "bob")?;
    assert_eq!(
        kind(market.ledger.cancel_bid(&listing.id, "bob")),
        Some(ErrorKind::NoBidToCancel)
    );
    Ok(())
}

#[test]
fn cancelling_on_a_missing_listing_is_not_found() {
    let market = Market::new();
    assert_eq!(
        kind(market.ledger.cancel_bid("nope", "alice")),
        Some(ErrorKind::NotFound)
    );
}

#[test]
fn bids_are_persisted() -> Result<()> {
    let market = Market::new();
    let listing = market.listing_with_bids(&[("alice", "120")])?;

    let stored = market.directory.get_by_id(&listing.id)?;
    assert_eq!(stored.bids.get("alice"), Some(amount("120")));
    assert!(stored.updated_at >= stored.created_at);
    Ok(())
}
