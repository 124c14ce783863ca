mod bid_ledger;

use crate::{
    error::{ErrorKind, ListingResult},
    listing::{Amount, Listing, NewListing},
    persistence::InMemoryPersistence,
    service::{BidLedger, Directory},
    store::InMemoryListingStore,
};
use anyhow::Result;

/// Directory and ledger sharing one in-memory store
pub struct Market {
    pub directory: Directory<InMemoryPersistence>,
    pub ledger: BidLedger<InMemoryPersistence>,
}

impl Market {
    pub fn new() -> Self {
        let persistence = InMemoryPersistence::new();
        let store = InMemoryListingStore::new_shared();
        Self {
            directory: Directory::new(persistence.clone(), store.clone()),
            ledger: BidLedger::new(persistence, store),
        }
    }

    pub fn listing(&self, owner: &str, title: &str) -> Result<Listing> {
        Ok(self.directory.create(
            owner,
            NewListing {
                title: Some(title.to_owned()),
                starting_price: Some("100".into()),
                ..Default::default()
            },
        )?)
    }

    /// A listing owned by `"owner"` with `bids` placed in order
    pub fn listing_with_bids(&self, bids: &[(&str, &str)]) -> Result<Listing> {
        let mut listing = self.listing("owner", "Bicycle")?;
        for (bidder, amount) in bids {
            listing = self.ledger.place_bid(&listing.id, bidder, amount)?;
        }
        Ok(listing)
    }
}

pub fn amount(s: &str) -> Amount {
    Amount::parse(s).expect("valid amount")
}

pub fn kind<T>(res: ListingResult<T>) -> Option<ErrorKind> {
    res.err().map(|e| e.kind())
}
