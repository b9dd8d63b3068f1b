use super::*;
use crate::auction::{Bidder, IncrementTier, Phase};
use crate::persistence::postgres::{PostgresConnection, PostgresPersistence};
use std::str::FromStr;

/// Bring the schema up on a fresh database. Idempotent.
pub fn setup_schema(conn: &mut PostgresConnection) -> Result<()> {
    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS lots (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL DEFAULT '',
            starting_price BIGINT NOT NULL,
            current_bid BIGINT NOT NULL,
            bidder_name TEXT,
            bidder_email TEXT,
            tier TEXT NOT NULL,
            group_id INTEGER,
            display_order INTEGER NOT NULL DEFAULT 0,
            retired BOOLEAN NOT NULL DEFAULT FALSE
        );
        CREATE TABLE IF NOT EXISTS bid_history (
            seq BIGSERIAL PRIMARY KEY,
            lot_id TEXT NOT NULL,
            amount BIGINT NOT NULL,
            bidder_name TEXT NOT NULL,
            bidder_email TEXT NOT NULL,
            at_unix_ms BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS bid_history_lot_id ON bid_history (lot_id);
        CREATE TABLE IF NOT EXISTS settings (
            only_row BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (only_row),
            phase TEXT NOT NULL,
            deadline_unix_ms BIGINT
        );",
    )?;
    Ok(())
}

fn lot_from_row(row: &::postgres::Row) -> Result<Lot> {
    let leader = match (
        row.get::<_, Option<String>>("bidder_name"),
        row.get::<_, Option<String>>("bidder_email"),
    ) {
        (Some(name), Some(email)) => Some(Bidder { name, email }),
        _ => None,
    };

    Ok(Lot {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        image_url: row.get("image_url"),
        starting_price: u64::try_from(row.get::<_, i64>("starting_price"))?,
        current_bid: u64::try_from(row.get::<_, i64>("current_bid"))?,
        leader,
        tier: IncrementTier::from_str(row.get::<_, &str>("tier"))?,
        group_id: row
            .get::<_, Option<i32>>("group_id")
            .map(u32::try_from)
            .transpose()?,
        display_order: u32::try_from(row.get::<_, i32>("display_order"))?,
        retired: row.get("retired"),
    })
}

const LOT_COLUMNS: &str =
    "id, name, description, image_url, starting_price, current_bid, \
     bidder_name, bidder_email, tier, group_id, display_order, retired";

pub struct PostgresLotStore;

impl LotStore for PostgresLotStore {
    type Persistence = PostgresPersistence;

    fn list(&self, conn: &mut PostgresConnection) -> Result<Vec<Lot>> {
        conn.query(
            &format!("SELECT {} FROM lots ORDER BY display_order, id", LOT_COLUMNS),
            &[],
        )?
        .iter()
        .map(lot_from_row)
        .collect()
    }

    fn load(&self, conn: &mut PostgresConnection, lot_id: LotIdRef) -> Result<Option<Lot>> {
        conn.query_opt(
            &format!("SELECT {} FROM lots WHERE id = $1", LOT_COLUMNS),
            &[&lot_id],
        )?
        .as_ref()
        .map(lot_from_row)
        .transpose()
    }

    fn list_tr<'a>(&self, transaction: &mut ::postgres::Transaction<'a>) -> Result<Vec<Lot>> {
        transaction
            .query(
                &format!("SELECT {} FROM lots ORDER BY display_order, id", LOT_COLUMNS),
                &[],
            )?
            .iter()
            .map(lot_from_row)
            .collect()
    }

    fn load_tr<'a>(
        &self,
        transaction: &mut ::postgres::Transaction<'a>,
        lot_id: LotIdRef,
    ) -> Result<Option<Lot>> {
        transaction
            .query_opt(
                &format!("SELECT {} FROM lots WHERE id = $1", LOT_COLUMNS),
                &[&lot_id],
            )?
            .as_ref()
            .map(lot_from_row)
            .transpose()
    }

    fn store_tr<'a>(
        &self,
        transaction: &mut ::postgres::Transaction<'a>,
        lot: &Lot,
    ) -> Result<()> {
        transaction.execute(
            "INSERT INTO lots (id, name, description, image_url, starting_price, \
             current_bid, bidder_name, bidder_email, tier, group_id, display_order, retired) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (id) DO UPDATE SET \
             name = EXCLUDED.name, description = EXCLUDED.description, \
             image_url = EXCLUDED.image_url, starting_price = EXCLUDED.starting_price, \
             current_bid = EXCLUDED.current_bid, bidder_name = EXCLUDED.bidder_name, \
             bidder_email = EXCLUDED.bidder_email, tier = EXCLUDED.tier, \
             group_id = EXCLUDED.group_id, display_order = EXCLUDED.display_order, \
             retired = EXCLUDED.retired",
            &[
                &lot.id,
                &lot.name,
                &lot.description,
                &lot.image_url,
                &i64::try_from(lot.starting_price)?,
                &i64::try_from(lot.current_bid)?,
                &lot.leader.as_ref().map(|bidder| bidder.name.as_str()),
                &lot.leader.as_ref().map(|bidder| bidder.email.as_str()),
                &lot.tier.as_str(),
                &lot.group_id.map(i32::try_from).transpose()?,
                &i32::try_from(lot.display_order)?,
                &lot.retired,
            ],
        )?;
        Ok(())
    }
}

pub struct PostgresBidHistory;

impl BidHistory for PostgresBidHistory {
    type Persistence = PostgresPersistence;

    fn append_tr<'a>(
        &self,
        transaction: &mut ::postgres::Transaction<'a>,
        record: &BidRecord,
    ) -> Result<Seq> {
        let row = transaction.query_one(
            "INSERT INTO bid_history (lot_id, amount, bidder_name, bidder_email, at_unix_ms) \
             VALUES ($1, $2, $3, $4, $5) RETURNING seq",
            &[
                &record.lot_id,
                &i64::try_from(record.amount)?,
                &record.bidder.name,
                &record.bidder.email,
                &i64::try_from(record.at_unix_ms)?,
            ],
        )?;
        Ok(u64::try_from(row.get::<_, i64>("seq"))?)
    }

    fn for_lot(
        &self,
        conn: &mut PostgresConnection,
        lot_id: LotIdRef,
    ) -> Result<Vec<(Seq, BidRecord)>> {
        conn.query(
            "SELECT seq, lot_id, amount, bidder_name, bidder_email, at_unix_ms \
             FROM bid_history WHERE lot_id = $1 ORDER BY seq",
            &[&lot_id],
        )?
        .iter()
        .map(|row| {
            Ok((
                u64::try_from(row.get::<_, i64>("seq"))?,
                BidRecord {
                    lot_id: row.get("lot_id"),
                    amount: u64::try_from(row.get::<_, i64>("amount"))?,
                    bidder: Bidder {
                        name: row.get("bidder_name"),
                        email: row.get("bidder_email"),
                    },
                    at_unix_ms: u64::try_from(row.get::<_, i64>("at_unix_ms"))?,
                },
            ))
        })
        .collect()
    }

    fn clear_tr<'a>(&self, transaction: &mut ::postgres::Transaction<'a>) -> Result<()> {
        transaction.execute("DELETE FROM bid_history", &[])?;
        Ok(())
    }
}

pub struct PostgresSettingsStore;

fn state_from_row(row: &::postgres::Row) -> Result<AuctionState> {
    Ok(AuctionState {
        phase: Phase::from_str(row.get::<_, &str>("phase"))?,
        deadline_unix_ms: row
            .get::<_, Option<i64>>("deadline_unix_ms")
            .map(u64::try_from)
            .transpose()?,
    })
}

impl SettingsStore for PostgresSettingsStore {
    type Persistence = PostgresPersistence;

    fn load(&self, conn: &mut PostgresConnection) -> Result<AuctionState> {
        conn.query_opt("SELECT phase, deadline_unix_ms FROM settings", &[])?
            .as_ref()
            .map(state_from_row)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn load_tr<'a>(
        &self,
        transaction: &mut ::postgres::Transaction<'a>,
    ) -> Result<AuctionState> {
        transaction
            .query_opt("SELECT phase, deadline_unix_ms FROM settings FOR UPDATE", &[])?
            .as_ref()
            .map(state_from_row)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn store_tr<'a>(
        &self,
        transaction: &mut ::postgres::Transaction<'a>,
        state: AuctionState,
    ) -> Result<()> {
        transaction.execute(
            "INSERT INTO settings (only_row, phase, deadline_unix_ms) VALUES (TRUE, $1, $2) \
             ON CONFLICT (only_row) DO UPDATE SET \
             phase = EXCLUDED.phase, deadline_unix_ms = EXCLUDED.deadline_unix_ms",
            &[
                &state.phase.as_str(),
                &state.deadline_unix_ms.map(i64::try_from).transpose()?,
            ],
        )?;
        Ok(())
    }
}
