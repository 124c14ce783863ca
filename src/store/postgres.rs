use super::*;
use crate::listing::{Amount, Bids, ListingId};
use crate::persistence::{PostgresConnection, PostgresPersistence, PostgresTransaction};
use anyhow::{bail, format_err, Context};
use r2d2_postgres::postgres::Row;
use std::collections::BTreeMap;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    starting_price TEXT NOT NULL,
    deadline TIMESTAMPTZ,
    completed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS listings_owner_status_idx ON listings (owner_id, completed, deadline);
CREATE TABLE IF NOT EXISTS bids (
    listing_id TEXT NOT NULL REFERENCES listings (id) ON DELETE CASCADE,
    bidder_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (listing_id, bidder_id)
);
"#;

const LISTING_COLUMNS: &str =
    "id, owner_id, title, description, starting_price, deadline, completed, created_at, updated_at";

pub struct PostgresListingStore;

impl PostgresListingStore {
    pub fn new_shared() -> SharedListingStore<PostgresPersistence> {
        Arc::new(Self)
    }

    pub fn init_schema(conn: &mut PostgresConnection) -> Result<()> {
        debug!("creating listing tables");
        conn.batch_execute(SCHEMA)
            .context("failed to create listing tables")
    }

    fn listing_from_row(row: &Row, bids: Bids) -> Result<Listing> {
        let starting_price: String = row.try_get("starting_price")?;
        Ok(Listing {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            starting_price: Amount::parse(&starting_price)
                .map_err(|_| format_err!("corrupt starting price: {starting_price:?}"))?,
            deadline: row.try_get("deadline")?,
            completed: row.try_get("completed")?,
            bids,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn load_bids(
        tr: &mut PostgresTransaction<'_>,
        ids: &[ListingId],
    ) -> Result<BTreeMap<ListingId, Bids>> {
        let mut by_listing: BTreeMap<ListingId, Vec<(String, Amount)>> = BTreeMap::new();
        for row in tr.query(
            "SELECT listing_id, bidder_id, amount FROM bids WHERE listing_id = ANY($1)",
            &[&ids],
        )? {
            let amount: String = row.try_get("amount")?;
            let amount = Amount::parse(&amount)
                .map_err(|_| format_err!("corrupt bid amount: {amount:?}"))?;
            by_listing
                .entry(row.try_get("listing_id")?)
                .or_default()
                .push((row.try_get("bidder_id")?, amount));
        }
        Ok(by_listing
            .into_iter()
            .map(|(id, bids)| (id, bids.into_iter().collect()))
            .collect())
    }

    fn listings_from_rows(tr: &mut PostgresTransaction<'_>, rows: Vec<Row>) -> Result<Vec<Listing>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get("id"))
            .collect::<Result<Vec<ListingId>, _>>()?;
        let mut bids = Self::load_bids(tr, &ids)?;
        rows.iter()
            .zip(ids.iter())
            .map(|(row, id)| Self::listing_from_row(row, bids.remove(id).unwrap_or_default()))
            .collect()
    }

    fn find_one(
        tr: &mut PostgresTransaction<'_>,
        id: ListingIdRef,
        lock: bool,
    ) -> Result<Option<Listing>> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let rows = tr.query(sql.as_str(), &[&id])?;
        Ok(Self::listings_from_rows(tr, rows)?.pop())
    }

    fn write_bids(tr: &mut PostgresTransaction<'_>, listing: &Listing) -> Result<()> {
        tr.execute("DELETE FROM bids WHERE listing_id = $1", &[&listing.id])?;
        for (bidder, amount) in listing.bids.iter() {
            tr.execute(
                "INSERT INTO bids (listing_id, bidder_id, amount) VALUES ($1, $2, $3)",
                &[&listing.id, &bidder, &amount.to_string()],
            )?;
        }
        Ok(())
    }
}

impl ListingStore for PostgresListingStore {
    type Persistence = PostgresPersistence;

    fn find_tr<'a>(
        &self,
        tr: &mut PostgresTransaction<'a>,
        filter: &OwnerFilter,
    ) -> Result<Vec<Listing>> {
        let (op, user) = match filter {
            OwnerFilter::Owner(user) => ("=", user),
            OwnerFilter::NotOwner(user) => ("<>", user),
        };
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE owner_id {op} $1 ORDER BY created_at, id"
        );
        let rows = tr.query(sql.as_str(), &[user])?;
        Self::listings_from_rows(tr, rows)
    }

    fn find_by_id_tr<'a>(
        &self,
        tr: &mut PostgresTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        Self::find_one(tr, id, false)
    }

    fn find_by_id_for_update_tr<'a>(
        &self,
        tr: &mut PostgresTransaction<'a>,
        id: ListingIdRef,
    ) -> Result<Option<Listing>> {
        Self::find_one(tr, id, true)
    }

    fn insert_tr<'a>(&self, tr: &mut PostgresTransaction<'a>, listing: &Listing) -> Result<()> {
        tr.execute(
            "INSERT INTO listings (id, owner_id, title, description, starting_price, deadline, completed, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &listing.id,
                &listing.owner_id,
                &listing.title,
                &listing.description,
                &listing.starting_price.to_string(),
                &listing.deadline,
                &listing.completed,
                &listing.created_at,
                &listing.updated_at,
            ],
        )?;
        Self::write_bids(tr, listing)
    }

    fn save_tr<'a>(&self, tr: &mut PostgresTransaction<'a>, listing: &Listing) -> Result<()> {
        let updated = tr.execute(
            "UPDATE listings SET title = $2, description = $3, starting_price = $4, deadline = $5, completed = $6, updated_at = $7 \
             WHERE id = $1",
            &[
                &listing.id,
                &listing.title,
                &listing.description,
                &listing.starting_price.to_string(),
                &listing.deadline,
                &listing.completed,
                &listing.updated_at,
            ],
        )?;
        if updated != 1 {
            bail!("saving a listing that does not exist: {}", listing.id);
        }
        Self::write_bids(tr, listing)
    }

    fn remove_tr<'a>(&self, tr: &mut PostgresTransaction<'a>, id: ListingIdRef) -> Result<bool> {
        Ok(tr.execute("DELETE FROM listings WHERE id = $1", &[&id])? > 0)
    }
}
