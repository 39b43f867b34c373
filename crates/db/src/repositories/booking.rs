use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;

use claimdesk_core::domain::booking::{
    clock_time, BookingId, BookingStatus, RoomBooking, RoomId,
};

use super::codec::{
    bool_column, date_column, encode_date, encode_json, enum_column, get, json_column,
    time_column, timestamp_column, u32_column,
};
use super::notification::insert_deliveries;
use super::{BookingCommit, BookingRepository, RepositoryError};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id, booking_number, room_id, room_name, employee_name,
     employee_email, purpose, booking_date, start_time, end_time, status, attendees_count,
     attendees_list, pre_setup_required, pre_setup_minutes, post_cleanup_required,
     post_cleanup_minutes, document_urls, rejection_reason, send_back_reason, version,
     created_at, updated_at";

/// Pending or approved bookings in the same room and date whose half-open
/// window overlaps `[start, end)`. Binds: room, date, two statuses, end, start.
const OVERLAP_QUERY: &str = "SELECT booking_number FROM room_booking
     WHERE room_id = ? AND booking_date = ? AND status IN (?, ?)
       AND start_time < ? AND ? < end_time";

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_booking(row: &SqliteRow) -> Result<RoomBooking, RepositoryError> {
    Ok(RoomBooking {
        id: BookingId(get(row, "id")?),
        booking_number: get(row, "booking_number")?,
        room_id: RoomId(get(row, "room_id")?),
        room_name: get(row, "room_name")?,
        employee_name: get(row, "employee_name")?,
        employee_email: get(row, "employee_email")?,
        purpose: get(row, "purpose")?,
        booking_date: date_column(row, "booking_date")?,
        start_time: time_column(row, "start_time")?,
        end_time: time_column(row, "end_time")?,
        status: enum_column(row, "status", BookingStatus::parse)?,
        attendees_count: u32_column(row, "attendees_count")?,
        attendees_list: json_column(row, "attendees_list")?,
        pre_setup_required: bool_column(row, "pre_setup_required")?,
        pre_setup_minutes: u32_column(row, "pre_setup_minutes")?,
        post_cleanup_required: bool_column(row, "post_cleanup_required")?,
        post_cleanup_minutes: u32_column(row, "post_cleanup_minutes")?,
        document_urls: json_column(row, "document_urls")?,
        rejection_reason: get(row, "rejection_reason")?,
        send_back_reason: get(row, "send_back_reason")?,
        version: u32_column(row, "version")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<RoomBooking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM room_booking WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    async fn list_all(&self) -> Result<Vec<RoomBooking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM room_booking
             ORDER BY booking_date DESC, start_time ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn list_by_status(
        &self,
        status: BookingStatus,
    ) -> Result<Vec<RoomBooking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM room_booking WHERE status = ?
             ORDER BY booking_date ASC, start_time ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn list_for_room_date(
        &self,
        room_id: &RoomId,
        date: NaiveDate,
    ) -> Result<Vec<RoomBooking>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM room_booking
             WHERE room_id = ? AND booking_date = ?
             ORDER BY start_time ASC"
        ))
        .bind(&room_id.0)
        .bind(encode_date(date))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_booking).collect()
    }

    async fn create(&self, commit: BookingCommit) -> Result<(), RepositoryError> {
        let booking = &commit.booking;
        let start_time = clock_time::format(&booking.start_time);
        let end_time = clock_time::format(&booking.end_time);
        let mut tx = self.pool.begin().await?;

        // The overlap test and the insert are one statement, so the write lock
        // is held from the read onwards and two racing requests cannot both land.
        let inserted = sqlx::query(&format!(
            "INSERT INTO room_booking ({BOOKING_COLUMNS})
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE NOT EXISTS ({OVERLAP_QUERY})"
        ))
        .bind(&booking.id.0)
        .bind(&booking.booking_number)
        .bind(&booking.room_id.0)
        .bind(&booking.room_name)
        .bind(&booking.employee_name)
        .bind(&booking.employee_email)
        .bind(&booking.purpose)
        .bind(encode_date(booking.booking_date))
        .bind(&start_time)
        .bind(&end_time)
        .bind(booking.status.as_str())
        .bind(i64::from(booking.attendees_count))
        .bind(encode_json(&booking.attendees_list)?)
        .bind(booking.pre_setup_required)
        .bind(i64::from(booking.pre_setup_minutes))
        .bind(booking.post_cleanup_required)
        .bind(i64::from(booking.post_cleanup_minutes))
        .bind(encode_json(&booking.document_urls)?)
        .bind(&booking.rejection_reason)
        .bind(&booking.send_back_reason)
        .bind(i64::from(booking.version))
        .bind(booking.created_at.to_rfc3339())
        .bind(booking.updated_at.to_rfc3339())
        .bind(&booking.room_id.0)
        .bind(encode_date(booking.booking_date))
        .bind(BookingStatus::Pending.as_str())
        .bind(BookingStatus::Approved.as_str())
        .bind(&end_time)
        .bind(&start_time)
        .execute(&mut *tx)
        .await
        .map_err(|error| match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Duplicate { entity: "booking", id: booking.id.0.clone() }
            }
            _ => RepositoryError::Database(error),
        })?;

        if inserted.rows_affected() == 0 {
            let holders: Vec<String> = sqlx::query_scalar(&format!(
                "SELECT booking_number FROM ({OVERLAP_QUERY}) ORDER BY booking_number"
            ))
            .bind(&booking.room_id.0)
            .bind(encode_date(booking.booking_date))
            .bind(BookingStatus::Pending.as_str())
            .bind(BookingStatus::Approved.as_str())
            .bind(&end_time)
            .bind(&start_time)
            .fetch_all(&mut *tx)
            .await?;
            return Err(RepositoryError::SlotTaken {
                room_id: booking.room_id.0.clone(),
                conflicting: holders.join(", "),
            });
        }

        insert_deliveries(&mut tx, &commit.deliveries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, commit: BookingCommit) -> Result<(), RepositoryError> {
        let booking = &commit.booking;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE room_booking SET
                 status = ?, rejection_reason = ?, send_back_reason = ?,
                 version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(booking.status.as_str())
        .bind(&booking.rejection_reason)
        .bind(&booking.send_back_reason)
        .bind(i64::from(booking.version))
        .bind(booking.updated_at.to_rfc3339())
        .bind(&booking.id.0)
        .bind(i64::from(commit.expected_version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_booking WHERE id = ?")
                .bind(&booking.id.0)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists == 0 {
                RepositoryError::NotFound { entity: "booking", id: booking.id.0.clone() }
            } else {
                RepositoryError::VersionConflict {
                    entity: "booking",
                    id: booking.id.0.clone(),
                    expected: commit.expected_version,
                }
            });
        }

        insert_deliveries(&mut tx, &commit.deliveries).await?;
        tx.commit().await?;

        tracing::debug!(
            event_name = "booking.committed",
            booking_id = %booking.id.0,
            status = booking.status.as_str(),
            version = booking.version,
            "booking change committed"
        );
        Ok(())
    }
}
