//! Bid Ledger
//!
//! All changes to a listing's bids go through here. Per (listing, bidder)
//! the states are: no bid, or one active amount. Placing again raises,
//! cancelling goes back to no bid. There is no won/lost state.
//!
//! The highest-bid check and the write happen inside one transaction that
//! holds the listing for update, so two concurrent bids can't both pass
//! the check against the same old maximum.
use super::modify_listing;
use crate::error::{ListingError, ListingResult};
use crate::listing::{Amount, Listing, ListingIdRef, UserIdRef};
use crate::persistence::Persistence;
use crate::store::SharedListingStore;
use chrono::Utc;
use tracing::{debug, info};

pub struct BidLedger<P: Persistence> {
    persistence: P,
    store: SharedListingStore<P>,
}

impl<P: Persistence> BidLedger<P> {
    pub fn new(persistence: P, store: SharedListingStore<P>) -> Self {
        Self { persistence, store }
    }

    /// Record `bidder`'s offer, replacing their previous one
    ///
    /// The offer has to beat the current highest bid of *anyone*,
    /// the bidder's own previous bid included. Ownership is not checked
    /// here: owners never see their own listings in the marketplace.
    pub fn place_bid(
        &self,
        listing_id: ListingIdRef,
        bidder: UserIdRef,
        amount: &str,
    ) -> ListingResult<Listing> {
        debug!(listing_id, bidder, amount, "placing bid");

        let (listing, previous) =
            modify_listing(&self.persistence, &self.store, listing_id, |listing| {
                let amount = Amount::parse_bid(amount)?;
                if let Some(highest) = listing.bids.highest() {
                    if amount <= highest {
                        return Err(ListingError::BidTooLow { highest });
                    }
                }
                let previous = listing.bids.place(bidder, amount);
                listing.updated_at = Utc::now();
                Ok(previous)
            })?;

        info!(
            listing_id,
            bidder,
            amount = %listing.bids.get(bidder).unwrap_or(Amount::ZERO),
            previous = ?previous.map(|a| a.to_string()),
            "bid placed"
        );
        Ok(listing)
    }

    /// Withdraw `bidder`'s offer. Nobody is promoted in its place; the next
    /// bid just has to beat whatever is highest afterwards.
    pub fn cancel_bid(&self, listing_id: ListingIdRef, bidder: UserIdRef) -> ListingResult<Listing> {
        let (listing, withdrawn) =
            modify_listing(&self.persistence, &self.store, listing_id, |listing| {
                let withdrawn = listing
                    .bids
                    .withdraw(bidder)
                    .ok_or(ListingError::NoBidToCancel)?;
                listing.updated_at = Utc::now();
                Ok(withdrawn)
            })?;

        info!(listing_id, bidder, %withdrawn, "bid cancelled");
        Ok(listing)
    }
}
