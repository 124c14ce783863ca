use super::*;
use crate::listing::ListingId;
use crate::persistence::{InMemoryPersistence, InMemoryTransaction};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Listings kept in a map, for tests and for running without a database
///
/// Writes land immediately. Atomicity of read-then-write sequences comes
/// from [`InMemoryTransaction`], which holds the persistence-wide lock.
#[derive(Default)]
pub struct InMemoryListingStore(Mutex<BTreeMap<ListingId, Listing>>);

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> SharedListingStore<InMemoryPersistence> {
        Arc::new(Self::new())
    }
}

impl ListingStore for InMemoryListingStore {
    type Persistence = InMemoryPersistence;

    fn find_tr<'a>(
        &self,
        _tr: &mut InMemoryTransaction<'a>,
        filter: &OwnerFilter,
    ) -> Result<Vec<Listing>> {
        let mut listings: Vec<_> = self
            .0
            .lock()
            .values()
            .filter(|listing| filter.matches(listing))
            .cloned()
            .collect();
        listings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(listings)
    }

    fn find_by_id_tr<'a>(
        &self,
        _tr: &mut InMemoryTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        Ok(self.0.lock().get(id).cloned())
    }

    // the transaction already excludes everyone else
    fn find_by_id_for_update_tr<'a>(
        &self,
        tr: &mut InMemoryTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        self.find_by_id_tr(tr, id)
    }

    fn insert_tr<'a>(&self, _tr: &mut InMemoryTransaction<'a>, listing: &Listing) -> Result<()> {
        let mut listings = self.0.lock();
        if listings.contains_key(&listing.id) {
            anyhow::bail!("duplicate listing id: {}", listing.id);
        }
        listings.insert(listing.id.clone(), listing.clone());
        Ok(())
    }

    fn save_tr<'a>(&self, _tr: &mut InMemoryTransaction<'a>, listing: &Listing) -> Result<()> {
        match self.0.lock().get_mut(&listing.id) {
            Some(stored) => {
                *stored = listing.clone();
                Ok(())
            }
            None => anyhow::bail!("saving a listing that does not exist: {}", listing.id),
        }
    }

    fn remove_tr<'a>(&self, _tr: &mut InMemoryTransaction<'a>, id: ListingIdRef) -> Result<bool> {
        Ok(self.0.lock().remove(id).is_some())
    }
}
