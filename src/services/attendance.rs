use crate::{
    db::DbPool,
    entities::{
        attendance, attendance::Entity as Attendance, user::Entity as User, AttendanceStatus,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::instrument;

/// How a worked span is split into regular and overtime hours. Company
/// rules (shift length, breaks) live behind this seam so payroll policy can
/// change without touching the attendance records themselves.
pub trait WorkPolicy: Send + Sync {
    /// Returns `(working_hours, overtime_hours)`, both rounded to 2 dp.
    fn split_hours(&self, check_in: DateTime<Utc>, check_out: DateTime<Utc>)
        -> (Decimal, Decimal);
}

/// Eight regular hours per day with a one-hour unpaid break; everything
/// beyond that counts as overtime.
#[derive(Debug, Clone)]
pub struct StandardWorkPolicy {
    pub regular_hours: Decimal,
    pub break_hours: Decimal,
}

impl Default for StandardWorkPolicy {
    fn default() -> Self {
        Self {
            regular_hours: dec!(8),
            break_hours: dec!(1),
        }
    }
}

impl WorkPolicy for StandardWorkPolicy {
    fn split_hours(
        &self,
        check_in: DateTime<Utc>,
        check_out: DateTime<Utc>,
    ) -> (Decimal, Decimal) {
        let minutes = (check_out - check_in).num_minutes().max(0);
        let total = (Decimal::from(minutes) / dec!(60)).round_dp(2);
        let net = (total - self.break_hours).max(Decimal::ZERO);
        let working = net.min(self.regular_hours);
        let overtime = (net - self.regular_hours).max(Decimal::ZERO);
        (working, overtime)
    }
}

/// Daily attendance records. One row per user per day; hours are computed
/// at check-out by the configured [`WorkPolicy`].
pub struct AttendanceService {
    db_pool: Arc<DbPool>,
    policy: Arc<dyn WorkPolicy>,
}

impl AttendanceService {
    pub fn new(db_pool: Arc<DbPool>, policy: Arc<dyn WorkPolicy>) -> Self {
        Self { db_pool, policy }
    }

    /// Opens the user's attendance record for the day of `timestamp`.
    /// A second check-in on the same day is rejected.
    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        user_id: i32,
        timestamp: DateTime<Utc>,
        status: AttendanceStatus,
        notes: Option<String>,
    ) -> Result<attendance::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        User::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {}", user_id)))?;

        let date = timestamp.date_naive();
        let existing = Attendance::find()
            .filter(attendance::Column::UserId.eq(user_id))
            .filter(attendance::Column::AttendanceDate.eq(date))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "User {} already checked in on {}",
                user_id, date
            )));
        }

        let record = attendance::ActiveModel {
            user_id: Set(user_id),
            attendance_date: Set(date),
            check_in: Set(Some(timestamp)),
            check_out: Set(None),
            status: Set(status),
            working_hours: Set(None),
            overtime_hours: Set(None),
            notes: Set(notes),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(record)
    }

    /// Closes the user's attendance record for the day of `timestamp` and
    /// fills in working and overtime hours from the policy.
    #[instrument(skip(self))]
    pub async fn check_out(
        &self,
        user_id: i32,
        timestamp: DateTime<Utc>,
    ) -> Result<attendance::Model, ServiceError> {
        let db = self.db_pool.as_ref();
        let date = timestamp.date_naive();
        let record = Attendance::find()
            .filter(attendance::Column::UserId.eq(user_id))
            .filter(attendance::Column::AttendanceDate.eq(date))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Attendance for user {} on {}", user_id, date))
            })?;

        let check_in = record.check_in.ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "User {} has no check-in on {}",
                user_id, date
            ))
        })?;
        if record.check_out.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "User {} already checked out on {}",
                user_id, date
            )));
        }
        if timestamp < check_in {
            return Err(ServiceError::ValidationError(
                "Check-out must not precede check-in".to_string(),
            ));
        }

        let (working_hours, overtime_hours) = self.policy.split_hours(check_in, timestamp);
        let mut closed: attendance::ActiveModel = record.into();
        closed.check_out = Set(Some(timestamp));
        closed.working_hours = Set(Some(working_hours));
        closed.overtime_hours = Set(Some(overtime_hours));
        let record = closed.update(db).await?;

        Ok(record)
    }

    /// A user's attendance records over an inclusive date range.
    #[instrument(skip(self))]
    pub async fn records_for_user(
        &self,
        user_id: i32,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    ) -> Result<Vec<attendance::Model>, ServiceError> {
        let records = Attendance::find()
            .filter(attendance::Column::UserId.eq(user_id))
            .filter(attendance::Column::AttendanceDate.between(from, to))
            .all(self.db_pool.as_ref())
            .await?;
        Ok(records)
    }
}
