//! Listing storage
mod in_memory;
mod postgres;

pub use self::in_memory::*;
pub use self::postgres::*;

use crate::listing::{Listing, ListingIdRef, UserId};
use crate::persistence;
use anyhow::Result;
use std::sync::Arc;

/// Which listings [`ListingStore::find_tr`] returns
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Listings owned by this user
    Owner(UserId),
    /// Listings owned by anyone but this user
    NotOwner(UserId),
}

impl OwnerFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        match self {
            OwnerFilter::Owner(user) => listing.owner_id == *user,
            OwnerFilter::NotOwner(user) => listing.owner_id != *user,
        }
    }
}

/// A store for listings together with their bids
pub trait ListingStore {
    type Persistence: persistence::Persistence;

    fn find_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        filter: &OwnerFilter,
    ) -> Result<Vec<Listing>>;

    fn find_by_id_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>>;

    /// Like [`Self::find_by_id_tr`], but no other transaction may modify or
    /// remove the listing until `tr` ends
    fn find_by_id_for_update_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>>;

    fn insert_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        listing: &Listing,
    ) -> Result<()>;

    /// Overwrite a stored listing, bids included
    fn save_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        listing: &Listing,
    ) -> Result<()>;

    /// Returns `false` if there was nothing to remove
    fn remove_tr<'a>(
        &self,
        tr: &mut <Self::Persistence as persistence::Persistence>::Transaction<'a>,
        id: ListingIdRef,
    ) -> Result<bool>;
}

pub type SharedListingStore<P> = Arc<dyn ListingStore<Persistence = P> + Send + Sync>;
