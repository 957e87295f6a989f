//! Block service — validates creation requests, derives timestamps, and
//! enforces the lead-time and overlap invariants.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use studybell_core::error::{Result, StudybellError};
use studybell_store::{BlockStore, NewStudyBlock, StudyBlock};

/// Minimum interval between creation and start: the reminder fires this many
/// minutes before the block, and must still be in the future at creation.
pub const NOTIFICATION_LEAD_MINUTES: i64 = 10;

/// Longest allowed block, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 480;

/// A validated-to-be creation request: wall-clock date and time of day,
/// interpreted in the service's configured timezone.
#[derive(Debug, Clone)]
pub struct CreateBlock {
    pub subject: String,
    /// "YYYY-MM-DD"
    pub date: String,
    /// "HH:MM", 24-hour
    pub start_time: String,
    pub duration_minutes: u32,
}

/// Owns block creation, listing and deletion.
pub struct BlockService {
    store: Arc<BlockStore>,
    timezone: Tz,
}

impl BlockService {
    pub fn new(store: Arc<BlockStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// Validate and persist a new block. Returns the generated id.
    pub fn create_block(
        &self,
        owner_id: &str,
        owner_email: &str,
        request: &CreateBlock,
    ) -> Result<String> {
        self.create_block_at(owner_id, owner_email, request, Utc::now())
    }

    /// Same as [`create_block`](Self::create_block) with an injected clock.
    pub fn create_block_at(
        &self,
        owner_id: &str,
        owner_email: &str,
        request: &CreateBlock,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let subject = request.subject.trim();
        if subject.is_empty() {
            return Err(StudybellError::InvalidInput("subject must not be empty".into()));
        }
        if request.duration_minutes < 1 || request.duration_minutes > MAX_DURATION_MINUTES {
            return Err(StudybellError::InvalidInput(format!(
                "durationMinutes must be between 1 and {MAX_DURATION_MINUTES}"
            )));
        }

        let start_time = self.parse_start_instant(&request.date, &request.start_time)?;
        let end_time = start_time + Duration::minutes(i64::from(request.duration_minutes));
        let notification_time = start_time - Duration::minutes(NOTIFICATION_LEAD_MINUTES);

        if notification_time <= now {
            return Err(StudybellError::TooSoon(format!(
                "block must be scheduled at least {NOTIFICATION_LEAD_MINUTES} minutes in advance"
            )));
        }

        if let Some(existing) = self.store.find_overlapping(owner_id, start_time, end_time)? {
            return Err(StudybellError::Conflict(format!(
                "overlaps existing block '{}' starting at {}",
                existing.subject,
                existing.start_time.to_rfc3339_opts(SecondsFormat::Secs, true)
            )));
        }

        let id = self.store.insert(&NewStudyBlock {
            owner_id: owner_id.to_string(),
            owner_email: owner_email.to_string(),
            subject: subject.to_string(),
            duration_minutes: request.duration_minutes,
            start_time,
            end_time,
            notification_time,
        })?;
        tracing::info!("📅 Block created: '{subject}' ({id})");
        Ok(id)
    }

    /// All blocks for the owner, start time ascending. Pure read.
    pub fn list_blocks(&self, owner_id: &str) -> Result<Vec<StudyBlock>> {
        self.store.list_by_owner(owner_id)
    }

    /// Delete an owned block. A missing id and a foreign-owned id are both
    /// `NotFound`, so existence never leaks to non-owners.
    pub fn delete_block(&self, owner_id: &str, block_id: &str) -> Result<()> {
        if self.store.delete_owned(owner_id, block_id)? {
            tracing::info!("🗑️ Block deleted: {block_id}");
            Ok(())
        } else {
            Err(StudybellError::NotFound("study block not found".into()))
        }
    }

    /// Parse wall-clock date + time of day in the configured timezone into
    /// a UTC instant. Local times that are ambiguous or skipped by a DST
    /// transition are rejected rather than guessed at.
    fn parse_start_instant(&self, date: &str, time: &str) -> Result<DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| StudybellError::InvalidInput("date must be YYYY-MM-DD".into()))?;
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|_| StudybellError::InvalidInput("startTime must be HH:MM".into()))?;
        let local = date.and_time(time);
        self.timezone
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                StudybellError::InvalidInput(format!(
                    "startTime is ambiguous or nonexistent in {}",
                    self.timezone
                ))
            })
    }
}
