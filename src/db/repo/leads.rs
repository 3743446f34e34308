//! Landing-page leads.

use crate::domain::{Lead, LeadStatus, LeadUpdate, NewLead, TimeMs};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{bool_col, opt_time_col, parse_col, Repository};

const LEAD_COLUMNS: &str = r#"
    id, full_name, email, phone, company, investment_size, message, consent_given,
    status, assigned_to, notes, source, follow_up_date, last_contact,
    language_preference, original_referrer, additional_data, created_at, updated_at
"#;

/// Stored JSON that is not an object is served as `{}`.
fn additional_data_col(row: &SqliteRow, id: i64) -> Result<Value, sqlx::Error> {
    let raw: String = row.try_get("additional_data")?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) if value.is_object() => Ok(value),
        _ => {
            warn!("Lead {} has malformed additional data, serving an empty object", id);
            Ok(Value::Object(Default::default()))
        }
    }
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    Ok(Lead {
        id,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        investment_size: row.try_get("investment_size")?,
        message: row.try_get("message")?,
        consent_given: bool_col(row, "consent_given")?,
        status: parse_col::<LeadStatus>(row, "status")?,
        assigned_to: row.try_get("assigned_to")?,
        notes: row.try_get("notes")?,
        source: row.try_get("source")?,
        follow_up_date: opt_time_col(row, "follow_up_date")?,
        last_contact: opt_time_col(row, "last_contact")?,
        language_preference: row.try_get("language_preference")?,
        original_referrer: row.try_get("original_referrer")?,
        additional_data: additional_data_col(row, id)?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
    })
}

impl Repository {
    /// Store a contact form submission with status `new`.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_lead(&self, lead: &NewLead, now: TimeMs) -> Result<Lead, sqlx::Error> {
        let additional_data = lead
            .additional_data
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO leads
            (full_name, email, phone, company, investment_size, message, consent_given,
             status, language_preference, original_referrer, additional_data,
             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.full_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(&lead.investment_size)
        .bind(&lead.message)
        .bind(LeadStatus::New.as_str())
        .bind(&lead.language_preference)
        .bind(&lead.original_referrer)
        .bind(additional_data)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        self.get_lead(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// All leads, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_leads(&self) -> Result<Vec<Lead>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM leads ORDER BY created_at DESC, id DESC",
            LEAD_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(lead_from_row).collect()
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_lead(&self, id: i64) -> Result<Option<Lead>, sqlx::Error> {
        let sql = format!("SELECT {} FROM leads WHERE id = ?", LEAD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    /// Apply an admin edit. Moving a lead to `contacted` stamps
    /// `last_contact`. Returns `None` when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_lead(
        &self,
        id: i64,
        update: &LeadUpdate,
        now: TimeMs,
    ) -> Result<Option<Lead>, sqlx::Error> {
        let last_contact = (update.status == LeadStatus::Contacted).then_some(now.as_ms());
        let additional_data = update.additional_data.as_ref().map(Value::to_string);

        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = ?,
                notes = CASE WHEN ? THEN ? ELSE notes END,
                assigned_to = CASE WHEN ? THEN ? ELSE assigned_to END,
                follow_up_date = CASE WHEN ? THEN ? ELSE follow_up_date END,
                additional_data = COALESCE(?, additional_data),
                last_contact = COALESCE(?, last_contact),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.notes.is_some())
        .bind(update.notes.clone().flatten())
        .bind(update.assigned_to.is_some())
        .bind(update.assigned_to.clone().flatten())
        .bind(update.follow_up_date.is_some())
        .bind(update.follow_up_date.flatten().map(|t| t.as_ms()))
        .bind(additional_data)
        .bind(last_contact)
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_lead(id).await
    }
}
