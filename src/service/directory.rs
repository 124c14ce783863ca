//! Listing Directory
//!
//! Owner-side management of listings and the two read views: "mine" and
//! the marketplace (everything the caller does not own). No bidding logic
//! lives here.
use super::modify_listing;
use crate::error::{ListingError, ListingResult};
use crate::listing::{Listing, ListingIdRef, ListingPatch, NewListing, UserIdRef};
use crate::persistence::{Connection, Persistence, Transaction};
use crate::store::{OwnerFilter, SharedListingStore};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

const NOT_OWNER: &str = "not authorized to access this listing";

pub struct Directory<P: Persistence> {
    persistence: P,
    store: SharedListingStore<P>,
}

impl<P: Persistence> Directory<P> {
    pub fn new(persistence: P, store: SharedListingStore<P>) -> Self {
        Self { persistence, store }
    }

    pub fn list_mine(&self, owner: UserIdRef) -> ListingResult<Vec<Listing>> {
        self.find(OwnerFilter::Owner(owner.to_owned()))
    }

    /// Listings `caller` may bid on, including ones they already bid on
    pub fn list_marketplace(&self, caller: UserIdRef) -> ListingResult<Vec<Listing>> {
        self.find(OwnerFilter::NotOwner(caller.to_owned()))
    }

    fn find(&self, filter: OwnerFilter) -> ListingResult<Vec<Listing>> {
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;
        let listings = self.store.find_tr(&mut transaction, &filter)?;
        transaction.commit()?;
        debug!(?filter, count = listings.len(), "listed");
        Ok(listings)
    }

    pub fn get_by_id(&self, id: ListingIdRef) -> ListingResult<Listing> {
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;
        let listing = self.store.find_by_id_tr(&mut transaction, id)?;
        transaction.commit()?;
        listing.ok_or_else(|| ListingError::NotFound(id.to_owned()))
    }

    pub fn create(&self, owner: UserIdRef, fields: NewListing) -> ListingResult<Listing> {
        let listing = fields.into_listing(Uuid::new_v4().to_string(), owner.to_owned(), Utc::now())?;

        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;
        self.store.insert_tr(&mut transaction, &listing)?;
        transaction.commit()?;

        info!(listing_id = %listing.id, owner, "listing created");
        Ok(listing)
    }

    /// Apply owner edits. See [`ListingPatch`] for which values count as
    /// "no change".
    pub fn update(
        &self,
        id: ListingIdRef,
        caller: UserIdRef,
        patch: ListingPatch,
    ) -> ListingResult<Listing> {
        let (listing, ()) = modify_listing(&self.persistence, &self.store, id, |listing| {
            if !listing.is_owned_by(caller) {
                return Err(ListingError::Unauthorized(NOT_OWNER));
            }
            patch.apply(listing, Utc::now())
        })?;

        info!(listing_id = id, "listing updated");
        Ok(listing)
    }

    /// Remove a listing together with all of its bids
    pub fn delete(&self, id: ListingIdRef, caller: UserIdRef) -> ListingResult<()> {
        let mut connection = self.persistence.get_connection()?;
        let mut transaction = connection.start_transaction()?;

        let listing = self
            .store
            .find_by_id_for_update_tr(&mut transaction, id)?
            .ok_or_else(|| ListingError::NotFound(id.to_owned()))?;
        if !listing.is_owned_by(caller) {
            return Err(ListingError::Unauthorized(NOT_OWNER));
        }
        if !self.store.remove_tr(&mut transaction, id)? {
            return Err(ListingError::NotFound(id.to_owned()));
        }
        transaction.commit()?;

        info!(listing_id = id, bids = listing.bids.len(), "listing deleted");
        Ok(())
    }
}
