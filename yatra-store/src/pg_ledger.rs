use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;
use yatra_booking::{
    Booking, BookingCommit, BookingError, BookingFilter, BookingRepository, BookingState, BookingStatus, ContactInfo,
    LedgerSnapshot, Payment, PaymentStatus, Proof, Refund, SeatEffect,
};
use yatra_catalog::{Batch, BatchRepository, BatchStatus, InventoryError, Trip};
use yatra_core::{AuditFilter, AuditLogEntry, AuditRepository, CoreError};
use yatra_shared::Masked;

/// PostgreSQL implementation of every repository seam. Seat counters move
/// only through conditional updates, and each booking commit is one
/// transaction.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> CoreError {
    CoreError::StorageFailure(e.to_string())
}

fn booking_storage(e: sqlx::Error) -> BookingError {
    BookingError::Storage(e.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> CoreError {
    CoreError::StorageFailure(format!("corrupt {} row: {}", what, detail))
}

/// Serialize a unit enum to its snake_case text.
fn to_text<T: Serialize>(value: &T) -> Result<String, CoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Err(CoreError::StorageFailure(format!("expected a text enum, got {}", other))),
        Err(e) => Err(CoreError::StorageFailure(e.to_string())),
    }
}

/// Postgres stores seat counts as `INTEGER`.
fn to_int(what: &str, value: u32) -> Result<i32, CoreError> {
    i32::try_from(value).map_err(|_| CoreError::ValidationError(format!("{} {} is out of range", what, value)))
}

fn from_text<T: DeserializeOwned>(what: &str, text: String) -> Result<T, CoreError> {
    serde_json::from_value(Value::String(text)).map_err(|e| corrupt(what, e))
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    name: String,
    default_price: i64,
    origin_prices: Value,
    default_capacity: i32,
    is_active: bool,
    is_bookable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = CoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let origin_prices: BTreeMap<String, i64> =
            serde_json::from_value(row.origin_prices).map_err(|e| corrupt("trip", e))?;
        Ok(Trip {
            id: row.id,
            name: row.name,
            default_price: row.default_price,
            origin_prices,
            default_capacity: row.default_capacity.max(0) as u32,
            is_active: row.is_active,
            is_bookable: row.is_bookable,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BATCH_COLUMNS: &str =
    "id, trip_id, start_date, end_date, batch_size, seats_booked, available_seats, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    trip_id: Uuid,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    batch_size: i32,
    seats_booked: i32,
    available_seats: Option<i32>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for Batch {
    type Error = CoreError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let status: BatchStatus = row.status.parse().map_err(|e: String| corrupt("batch", e))?;
        Ok(Batch {
            id: row.id,
            trip_id: row.trip_id,
            start_date: row.start_date,
            end_date: row.end_date,
            batch_size: row.batch_size.max(0) as u32,
            seats_booked: row.seats_booked.max(0) as u32,
            available_seats: row.available_seats.map(|a| a.max(0) as u32),
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, trip_id, batch_id, traveller_id, traveller_count, total_amount, advance_due, \
     advance_paid, balance_paid, pickup_location, contact_name, contact_phone, contact_email, booking_status, \
     payment_status, advance_proof, balance_proof, seats_held, cancellation_reason, is_deleted, version, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    trip_id: Uuid,
    batch_id: Option<Uuid>,
    traveller_id: String,
    traveller_count: i32,
    total_amount: i64,
    advance_due: i64,
    advance_paid: i64,
    balance_paid: i64,
    pickup_location: Option<String>,
    contact_name: String,
    contact_phone: String,
    contact_email: Option<String>,
    booking_status: String,
    payment_status: String,
    advance_proof: Value,
    balance_proof: Value,
    seats_held: i32,
    cancellation_reason: Option<String>,
    is_deleted: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let booking_status: BookingStatus = row.booking_status.parse().map_err(|e: String| corrupt("booking", e))?;
        let payment_status: PaymentStatus = row.payment_status.parse().map_err(|e: String| corrupt("booking", e))?;
        let advance_proof: Proof = serde_json::from_value(row.advance_proof).map_err(|e| corrupt("booking", e))?;
        let balance_proof: Proof = serde_json::from_value(row.balance_proof).map_err(|e| corrupt("booking", e))?;

        Ok(Booking {
            id: row.id,
            trip_id: row.trip_id,
            batch_id: row.batch_id,
            traveller_id: row.traveller_id,
            traveller_count: row.traveller_count.max(0) as u32,
            total_amount: row.total_amount,
            advance_due: row.advance_due,
            advance_paid: row.advance_paid,
            balance_paid: row.balance_paid,
            pickup_location: row.pickup_location,
            contact: ContactInfo {
                name: row.contact_name,
                phone: Masked::new(row.contact_phone),
                email: row.contact_email,
            },
            state: BookingState::from_parts(booking_status, payment_status),
            advance_proof,
            balance_proof,
            seats_held: row.seats_held.max(0) as u32,
            cancellation_reason: row.cancellation_reason,
            is_deleted: row.is_deleted,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str =
    "id, booking_id, stage, amount, method, status, external_transaction_id, recorded_by, created_at";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    stage: Option<String>,
    amount: i64,
    method: String,
    status: String,
    external_transaction_id: Option<String>,
    recorded_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = CoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let stage = match row.stage {
            Some(s) => Some(s.parse().map_err(|e: String| corrupt("payment", e))?),
            None => None,
        };
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            stage,
            amount: row.amount,
            method: row.method.parse().map_err(|e: String| corrupt("payment", e))?,
            status: row.status.parse().map_err(|e: String| corrupt("payment", e))?,
            external_transaction_id: row.external_transaction_id,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
        })
    }
}

const REFUND_COLUMNS: &str = "id, booking_id, amount, status, reason, created_at, processed_at, processed_by";

#[derive(sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    booking_id: Uuid,
    amount: i64,
    status: String,
    reason: String,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    processed_by: Option<String>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = CoreError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        Ok(Refund {
            id: row.id,
            booking_id: row.booking_id,
            amount: row.amount,
            status: row.status.parse().map_err(|e: String| corrupt("refund", e))?,
            reason: row.reason,
            created_at: row.created_at,
            processed_at: row.processed_at,
            processed_by: row.processed_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: String,
    action: String,
    entity_type: String,
    entity_id: Uuid,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLogEntry {
    type Error = CoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLogEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: from_text("audit", row.action)?,
            entity_type: from_text("audit", row.entity_type)?,
            entity_id: row.entity_id,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn fetch_batch(conn: &mut PgConnection, batch_id: Uuid) -> Result<Option<Batch>, CoreError> {
    let row: Option<BatchRow> = sqlx::query_as(&format!("SELECT {} FROM batches WHERE id = $1", BATCH_COLUMNS))
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage)?;
    row.map(Batch::try_from).transpose()
}

/// Atomic check-and-increment. The `WHERE` clause is re-evaluated after the
/// row lock, so concurrent callers can never push `seats_booked` past
/// `batch_size`.
async fn reserve_on(conn: &mut PgConnection, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
    if count == 0 {
        return Err(InventoryError::InvalidCount("seat count must be positive".to_string()));
    }
    let row: Option<BatchRow> = sqlx::query_as(&format!(
        "UPDATE batches
         SET seats_booked = seats_booked + $2,
             available_seats = batch_size - (seats_booked + $2),
             updated_at = NOW()
         WHERE id = $1 AND status = 'active' AND seats_booked + $2 <= batch_size
         RETURNING {}",
        BATCH_COLUMNS
    ))
    .bind(batch_id)
    .bind(to_int("seat count", count)?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    if let Some(row) = row {
        return Ok(Batch::try_from(row)?);
    }

    // Nothing changed; work out why.
    let batch = fetch_batch(conn, batch_id)
        .await?
        .ok_or(InventoryError::NotFound(batch_id))?;
    if !batch.is_active() {
        return Err(InventoryError::BatchNotActive(batch_id));
    }
    Err(InventoryError::SeatsUnavailable {
        batch_id,
        requested: count,
        available: batch.remaining(),
    })
}

async fn release_on(conn: &mut PgConnection, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
    let row: Option<BatchRow> = sqlx::query_as(&format!(
        "UPDATE batches
         SET seats_booked = GREATEST(seats_booked - $2, 0),
             available_seats = batch_size - GREATEST(seats_booked - $2, 0),
             updated_at = NOW()
         WHERE id = $1
         RETURNING {}",
        BATCH_COLUMNS
    ))
    .bind(batch_id)
    .bind(to_int("seat count", count)?)
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?;

    match row {
        Some(row) => Ok(Batch::try_from(row)?),
        None => Err(InventoryError::NotFound(batch_id)),
    }
}

async fn apply_seats(conn: &mut PgConnection, seats: SeatEffect) -> Result<(), BookingError> {
    match seats {
        SeatEffect::None => {}
        SeatEffect::Reserve { batch_id, seats } => {
            reserve_on(conn, batch_id, seats).await?;
        }
        SeatEffect::Release { batch_id, seats } => {
            release_on(conn, batch_id, seats).await?;
        }
    }
    Ok(())
}

async fn insert_audit(conn: &mut PgConnection, entry: &AuditLogEntry) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(entry.id)
    .bind(&entry.actor_id)
    .bind(to_text(&entry.action)?)
    .bind(to_text(&entry.entity_type)?)
    .bind(entry.entity_id)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(())
}

fn proof_json(proof: &Proof) -> Result<Value, BookingError> {
    serde_json::to_value(proof).map_err(|e| BookingError::Storage(e.to_string()))
}

async fn insert_booking(conn: &mut PgConnection, b: &Booking) -> Result<bool, BookingError> {
    let result = sqlx::query(
        "INSERT INTO bookings (id, trip_id, batch_id, traveller_id, traveller_count, total_amount, advance_due,
             advance_paid, balance_paid, pickup_location, contact_name, contact_phone, contact_email,
             booking_status, payment_status, advance_proof, balance_proof, seats_held, cancellation_reason,
             is_deleted, version, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(b.id)
    .bind(b.trip_id)
    .bind(b.batch_id)
    .bind(&b.traveller_id)
    .bind(to_int("traveller_count", b.traveller_count)?)
    .bind(b.total_amount)
    .bind(b.advance_due)
    .bind(b.advance_paid)
    .bind(b.balance_paid)
    .bind(&b.pickup_location)
    .bind(&b.contact.name)
    .bind(b.contact.phone.expose())
    .bind(&b.contact.email)
    .bind(b.booking_status().as_str())
    .bind(b.payment_status().as_str())
    .bind(proof_json(&b.advance_proof)?)
    .bind(proof_json(&b.balance_proof)?)
    .bind(to_int("seats_held", b.seats_held)?)
    .bind(&b.cancellation_reason)
    .bind(b.is_deleted)
    .bind(b.version)
    .bind(b.created_at)
    .bind(b.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(booking_storage)?;
    Ok(result.rows_affected() == 1)
}

/// Compare-and-swap on `version`. Returns false if the stored row moved on.
async fn update_booking(conn: &mut PgConnection, b: &Booking, expected_version: i64) -> Result<bool, BookingError> {
    let result = sqlx::query(
        "UPDATE bookings SET
             batch_id = $2, traveller_count = $3, total_amount = $4, advance_due = $5, advance_paid = $6,
             balance_paid = $7, pickup_location = $8, contact_name = $9, contact_phone = $10, contact_email = $11,
             booking_status = $12, payment_status = $13, advance_proof = $14, balance_proof = $15,
             seats_held = $16, cancellation_reason = $17, is_deleted = $18, version = $19, updated_at = $20
         WHERE id = $1 AND version = $21",
    )
    .bind(b.id)
    .bind(b.batch_id)
    .bind(to_int("traveller_count", b.traveller_count)?)
    .bind(b.total_amount)
    .bind(b.advance_due)
    .bind(b.advance_paid)
    .bind(b.balance_paid)
    .bind(&b.pickup_location)
    .bind(&b.contact.name)
    .bind(b.contact.phone.expose())
    .bind(&b.contact.email)
    .bind(b.booking_status().as_str())
    .bind(b.payment_status().as_str())
    .bind(proof_json(&b.advance_proof)?)
    .bind(proof_json(&b.balance_proof)?)
    .bind(to_int("seats_held", b.seats_held)?)
    .bind(&b.cancellation_reason)
    .bind(b.is_deleted)
    .bind(b.version)
    .bind(b.updated_at)
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(booking_storage)?;
    Ok(result.rows_affected() == 1)
}

async fn insert_payment(conn: &mut PgConnection, p: &Payment) -> Result<(), BookingError> {
    sqlx::query(
        "INSERT INTO payments (id, booking_id, stage, amount, method, status, external_transaction_id, recorded_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(p.id)
    .bind(p.booking_id)
    .bind(p.stage.map(|s| s.as_str()))
    .bind(p.amount)
    .bind(p.method.as_str())
    .bind(p.status.as_str())
    .bind(&p.external_transaction_id)
    .bind(&p.recorded_by)
    .bind(p.created_at)
    .execute(&mut *conn)
    .await
    .map_err(booking_storage)?;
    Ok(())
}

/// Insert, or update a refund that is still pending. Processed refunds are
/// never rewritten.
async fn upsert_refund(conn: &mut PgConnection, r: &Refund) -> Result<(), BookingError> {
    let result = sqlx::query(
        "INSERT INTO refunds (id, booking_id, amount, status, reason, created_at, processed_at, processed_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (id) DO UPDATE SET
             status = EXCLUDED.status,
             processed_at = EXCLUDED.processed_at,
             processed_by = EXCLUDED.processed_by
         WHERE refunds.status = 'pending'",
    )
    .bind(r.id)
    .bind(r.booking_id)
    .bind(r.amount)
    .bind(r.status.as_str())
    .bind(&r.reason)
    .bind(r.created_at)
    .bind(r.processed_at)
    .bind(&r.processed_by)
    .execute(&mut *conn)
    .await
    .map_err(booking_storage)?;

    if result.rows_affected() == 0 {
        return Err(BookingError::RefundAlreadyProcessed(r.id));
    }
    Ok(())
}

#[async_trait]
impl BatchRepository for PgLedger {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, CoreError> {
        let row: Option<TripRow> = sqlx::query_as(
            "SELECT id, name, default_price, origin_prices, default_capacity, is_active, is_bookable, created_at, updated_at
             FROM trips WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.map(Trip::try_from).transpose()
    }

    async fn save_trip(&self, trip: &Trip) -> Result<(), CoreError> {
        let origin_prices = serde_json::to_value(&trip.origin_prices).map_err(|e| corrupt("trip", e))?;
        sqlx::query(
            "INSERT INTO trips (id, name, default_price, origin_prices, default_capacity, is_active, is_bookable, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 default_price = EXCLUDED.default_price,
                 origin_prices = EXCLUDED.origin_prices,
                 default_capacity = EXCLUDED.default_capacity,
                 is_active = EXCLUDED.is_active,
                 is_bookable = EXCLUDED.is_bookable,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(trip.id)
        .bind(&trip.name)
        .bind(trip.default_price)
        .bind(origin_prices)
        .bind(to_int("default_capacity", trip.default_capacity)?)
        .bind(trip.is_active)
        .bind(trip.is_bookable)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, CoreError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        fetch_batch(&mut conn, id).await
    }

    async fn save_batch(&self, batch: &Batch) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO batches (id, trip_id, start_date, end_date, batch_size, seats_booked, available_seats, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                 start_date = EXCLUDED.start_date,
                 end_date = EXCLUDED.end_date,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(batch.id)
        .bind(batch.trip_id)
        .bind(batch.start_date)
        .bind(batch.end_date)
        .bind(to_int("batch_size", batch.batch_size)?)
        .bind(to_int("seats_booked", batch.seats_booked)?)
        .bind(batch.available_seats.map(|a| to_int("available_seats", a)).transpose()?)
        .bind(batch.status.as_str())
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_batches(&self, trip_id: Uuid) -> Result<Vec<Batch>, CoreError> {
        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM batches WHERE trip_id = $1 ORDER BY start_date",
            BATCH_COLUMNS
        ))
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        convert(rows)
    }

    async fn reserve_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        reserve_on(&mut conn, batch_id, count).await
    }

    async fn release_seats(&self, batch_id: Uuid, count: u32) -> Result<Batch, InventoryError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        release_on(&mut conn, batch_id, count).await
    }

    async fn set_seats_booked(&self, batch_id: Uuid, seats_booked: u32) -> Result<Batch, InventoryError> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "UPDATE batches
             SET seats_booked = $2, available_seats = batch_size - $2, updated_at = NOW()
             WHERE id = $1 AND $2 <= batch_size
             RETURNING {}",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .bind(to_int("seats_booked", seats_booked)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => Ok(Batch::try_from(row)?),
            None => match self.get_batch(batch_id).await? {
                Some(batch) => Err(InventoryError::InvalidCount(format!(
                    "seats_booked {} exceeds batch size {}",
                    seats_booked, batch.batch_size
                ))),
                None => Err(InventoryError::NotFound(batch_id)),
            },
        }
    }

    async fn set_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<Batch, InventoryError> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "UPDATE batches
             SET status = $2, available_seats = batch_size - seats_booked, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => Ok(Batch::try_from(row)?),
            None => Err(InventoryError::NotFound(batch_id)),
        }
    }
}

#[async_trait]
impl BookingRepository for PgLedger {
    async fn commit(&self, commit: BookingCommit) -> Result<Booking, BookingError> {
        let mut tx = self.pool.begin().await.map_err(booking_storage)?;
        let booking_id = commit.booking.id;

        match commit.expected_version {
            None => {
                if !insert_booking(&mut tx, &commit.booking).await? {
                    return Err(BookingError::Conflict(booking_id));
                }
            }
            Some(expected) => {
                if !update_booking(&mut tx, &commit.booking, expected).await? {
                    let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM bookings WHERE id = $1")
                        .bind(booking_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(booking_storage)?;
                    return Err(match exists {
                        Some(_) => BookingError::Conflict(booking_id),
                        None => BookingError::NotFound(booking_id),
                    });
                }
            }
        }

        apply_seats(&mut tx, commit.seats).await?;
        if let Some(payment) = &commit.payment {
            insert_payment(&mut tx, payment).await?;
        }
        if let Some(refund) = &commit.refund {
            upsert_refund(&mut tx, refund).await?;
        }
        if let Some(entry) = &commit.audit {
            insert_audit(&mut tx, entry).await?;
        }

        // Dropping `tx` on any early return above rolls everything back.
        tx.commit().await.map_err(booking_storage)?;
        Ok(commit.booking)
    }

    async fn purge(
        &self,
        booking_id: Uuid,
        expected_version: i64,
        seats: SeatEffect,
        audit: AuditLogEntry,
    ) -> Result<(), BookingError> {
        let mut tx = self.pool.begin().await.map_err(booking_storage)?;

        let current: Option<(i64,)> = sqlx::query_as("SELECT version FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(booking_storage)?;
        match current {
            None => return Err(BookingError::NotFound(booking_id)),
            Some((version,)) if version != expected_version => return Err(BookingError::Conflict(booking_id)),
            Some(_) => {}
        }

        apply_seats(&mut tx, seats).await?;
        for table in ["payments", "refunds"] {
            sqlx::query(&format!("DELETE FROM {} WHERE booking_id = $1", table))
                .bind(booking_id)
                .execute(&mut *tx)
                .await
                .map_err(booking_storage)?;
        }
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(booking_storage)?;
        insert_audit(&mut tx, &audit).await?;

        tx.commit().await.map_err(booking_storage)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, CoreError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, CoreError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings
             WHERE ($1::uuid IS NULL OR trip_id = $1)
               AND ($2::uuid IS NULL OR batch_id = $2)
               AND ($3::text IS NULL OR booking_status = $3)
               AND ($4::timestamptz IS NULL OR created_at >= $4)
               AND ($5::timestamptz IS NULL OR created_at <= $5)
               AND ($6 OR NOT is_deleted)
             ORDER BY created_at",
            BOOKING_COLUMNS
        ))
        .bind(filter.trip_id)
        .bind(filter.batch_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.created_from)
        .bind(filter.created_to)
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        convert(rows)
    }

    async fn payments_for(&self, booking_id: Uuid) -> Result<Vec<Payment>, CoreError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        convert(rows)
    }

    async fn refunds_for(&self, booking_id: Uuid) -> Result<Vec<Refund>, CoreError> {
        let rows: Vec<RefundRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE booking_id = $1 ORDER BY created_at",
            REFUND_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        convert(rows)
    }

    async fn get_refund(&self, id: Uuid) -> Result<Option<Refund>, CoreError> {
        let row: Option<RefundRow> = sqlx::query_as(&format!("SELECT {} FROM refunds WHERE id = $1", REFUND_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Refund::try_from).transpose()
    }

    async fn snapshot(&self, filter: &BookingFilter) -> Result<LedgerSnapshot, CoreError> {
        let bookings = self.list_bookings(filter).await?;
        let ids: Vec<Uuid> = bookings.iter().map(|b| b.id).collect();

        let payments: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE booking_id = ANY($1)",
            PAYMENT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        let refunds: Vec<RefundRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refunds WHERE booking_id = ANY($1)",
            REFUND_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(LedgerSnapshot {
            bookings,
            payments: convert(payments)?,
            refunds: convert(refunds)?,
        })
    }
}

#[async_trait]
impl AuditRepository for PgLedger {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), CoreError> {
        let mut conn = self.pool.acquire().await.map_err(storage)?;
        insert_audit(&mut conn, entry).await
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, CoreError> {
        let entity_type = filter.entity_type.as_ref().map(to_text).transpose()?;
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, actor_id, action, entity_type, entity_id, metadata, created_at FROM audit_log
             WHERE ($1::text IS NULL OR entity_type = $1)
               AND ($2::uuid IS NULL OR entity_id = $2)
             ORDER BY created_at DESC",
        )
        .bind(entity_type)
        .bind(filter.entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        convert(rows)
    }
}
