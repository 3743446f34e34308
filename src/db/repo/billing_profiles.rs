//! Billing profiles, one per wallet.

use crate::domain::{BillingDetails, BillingProfile, TimeMs, VerificationStatus, WalletAddress};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{bool_col, opt_time_col, parse_col, wallet_col, Repository};

const PROFILE_COLUMNS: &str = r#"
    id, wallet_address, full_name, company_name, tax_id, address, city, postal_code,
    country, phone_number, email, notes, is_default, verification_hash,
    verification_status, verification_timestamp, created_at, updated_at
"#;

fn profile_from_row(row: &SqliteRow) -> Result<BillingProfile, sqlx::Error> {
    Ok(BillingProfile {
        id: row.try_get("id")?,
        wallet_address: wallet_col(row, "wallet_address")?,
        full_name: row.try_get("full_name")?,
        company_name: row.try_get("company_name")?,
        tax_id: row.try_get("tax_id")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        phone_number: row.try_get("phone_number")?,
        email: row.try_get("email")?,
        notes: row.try_get("notes")?,
        is_default: bool_col(row, "is_default")?,
        verification_hash: row.try_get("verification_hash")?,
        verification_status: parse_col::<VerificationStatus>(row, "verification_status")?,
        verification_timestamp: opt_time_col(row, "verification_timestamp")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
    })
}

impl Repository {
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_billing_profiles(&self) -> Result<Vec<BillingProfile>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM billing_profiles ORDER BY created_at DESC, id DESC",
            PROFILE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(profile_from_row).collect()
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_billing_profile(
        &self,
        id: i64,
    ) -> Result<Option<BillingProfile>, sqlx::Error> {
        let sql = format!("SELECT {} FROM billing_profiles WHERE id = ?", PROFILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn billing_profile_by_wallet(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Option<BillingProfile>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM billing_profiles WHERE wallet_address = ?",
            PROFILE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(wallet.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    /// Create `wallet`'s profile, or merge `details` into the existing one.
    ///
    /// Absent fields keep their stored values. A new profile needs
    /// `full_name`; the insert fails on the NOT NULL constraint otherwise.
    /// SQLite checks NOT NULL before `ON CONFLICT`, so the inserted row falls
    /// back to the stored name.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_billing_profile(
        &self,
        wallet: &WalletAddress,
        details: &BillingDetails,
        now: TimeMs,
    ) -> Result<BillingProfile, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO billing_profiles
            (wallet_address, full_name, company_name, tax_id, address, city, postal_code,
             country, phone_number, email, notes, created_at, updated_at)
            VALUES (
                ?,
                COALESCE(?, (SELECT full_name FROM billing_profiles WHERE wallet_address = ?)),
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            )
            ON CONFLICT(wallet_address) DO UPDATE SET
                full_name = COALESCE(excluded.full_name, billing_profiles.full_name),
                company_name = COALESCE(excluded.company_name, billing_profiles.company_name),
                tax_id = COALESCE(excluded.tax_id, billing_profiles.tax_id),
                address = COALESCE(excluded.address, billing_profiles.address),
                city = COALESCE(excluded.city, billing_profiles.city),
                postal_code = COALESCE(excluded.postal_code, billing_profiles.postal_code),
                country = COALESCE(excluded.country, billing_profiles.country),
                phone_number = COALESCE(excluded.phone_number, billing_profiles.phone_number),
                email = COALESCE(excluded.email, billing_profiles.email),
                notes = COALESCE(excluded.notes, billing_profiles.notes),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(wallet.as_str())
        .bind(&details.full_name)
        .bind(wallet.as_str())
        .bind(&details.company_name)
        .bind(&details.tax_id)
        .bind(&details.address)
        .bind(&details.city)
        .bind(&details.postal_code)
        .bind(&details.country)
        .bind(&details.phone_number)
        .bind(&details.email)
        .bind(&details.notes)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        self.billing_profile_by_wallet(wallet)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Admin edit. Absent fields are kept; a changed `status` restamps
    /// `verification_timestamp`. Returns `None` when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_billing_profile(
        &self,
        id: i64,
        details: &BillingDetails,
        status: Option<VerificationStatus>,
        now: TimeMs,
    ) -> Result<Option<BillingProfile>, sqlx::Error> {
        let status = status.map(|s| s.as_str());
        let result = sqlx::query(
            r#"
            UPDATE billing_profiles
            SET full_name = COALESCE(?, full_name),
                company_name = COALESCE(?, company_name),
                tax_id = COALESCE(?, tax_id),
                address = COALESCE(?, address),
                city = COALESCE(?, city),
                postal_code = COALESCE(?, postal_code),
                country = COALESCE(?, country),
                phone_number = COALESCE(?, phone_number),
                email = COALESCE(?, email),
                notes = COALESCE(?, notes),
                verification_timestamp = CASE
                    WHEN ? IS NOT NULL AND ? != verification_status THEN ?
                    ELSE verification_timestamp
                END,
                verification_status = COALESCE(?, verification_status),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&details.full_name)
        .bind(&details.company_name)
        .bind(&details.tax_id)
        .bind(&details.address)
        .bind(&details.city)
        .bind(&details.postal_code)
        .bind(&details.country)
        .bind(&details.phone_number)
        .bind(&details.email)
        .bind(&details.notes)
        .bind(status)
        .bind(status)
        .bind(now.as_ms())
        .bind(status)
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_billing_profile(id).await
    }

    /// Set the verification outcome, and the signed-data hash when the owner
    /// verified the profile themselves. Returns `None` when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn set_billing_verification(
        &self,
        id: i64,
        status: VerificationStatus,
        hash: Option<&str>,
        now: TimeMs,
    ) -> Result<Option<BillingProfile>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE billing_profiles
            SET verification_status = ?,
                verification_hash = COALESCE(?, verification_hash),
                verification_timestamp = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(hash)
        .bind(now.as_ms())
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_billing_profile(id).await
    }

    /// Returns false when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_billing_profile(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM billing_profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{setup_repo, WALLET};
    use super::*;
    use std::str::FromStr;

    fn wallet() -> WalletAddress {
        WalletAddress::from_str(WALLET).unwrap()
    }

    fn details(name: &str) -> BillingDetails {
        BillingDetails {
            full_name: Some(name.to_string()),
            email: Some("billing@example.com".to_string()),
            country: Some("ES".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let (repo, _temp) = setup_repo().await;

        let created = repo
            .upsert_billing_profile(&wallet(), &details("Ada"), TimeMs::new(1))
            .await
            .unwrap();
        assert_eq!(created.full_name, "Ada");
        assert_eq!(created.verification_status, VerificationStatus::Pending);
        assert!(!created.is_default);

        let change = BillingDetails {
            tax_id: Some("B12345678".to_string()),
            ..Default::default()
        };
        let merged = repo
            .upsert_billing_profile(&wallet(), &change, TimeMs::new(2))
            .await
            .unwrap();
        assert_eq!(merged.id, created.id);
        assert_eq!(merged.full_name, "Ada");
        assert_eq!(merged.tax_id.as_deref(), Some("B12345678"));
        assert_eq!(merged.country.as_deref(), Some("ES"));
        assert_eq!(merged.created_at, TimeMs::new(1));
        assert_eq!(merged.updated_at, TimeMs::new(2));

        assert_eq!(repo.list_billing_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_profile_requires_full_name() {
        let (repo, _temp) = setup_repo().await;
        let result = repo
            .upsert_billing_profile(&wallet(), &BillingDetails::default(), TimeMs::new(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_admin_update_stamps_status_change_only() {
        let (repo, _temp) = setup_repo().await;
        let p = repo
            .upsert_billing_profile(&wallet(), &details("Ada"), TimeMs::new(1))
            .await
            .unwrap();

        let updated = repo
            .update_billing_profile(p.id, &details("Ada L."), None, TimeMs::new(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Ada L.");
        assert_eq!(updated.verification_timestamp, None);

        let updated = repo
            .update_billing_profile(
                p.id,
                &BillingDetails::default(),
                Some(VerificationStatus::Rejected),
                TimeMs::new(6),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.verification_status, VerificationStatus::Rejected);
        assert_eq!(updated.verification_timestamp, Some(TimeMs::new(6)));

        let unchanged = repo
            .update_billing_profile(
                p.id,
                &BillingDetails::default(),
                Some(VerificationStatus::Rejected),
                TimeMs::new(7),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.verification_timestamp, Some(TimeMs::new(6)));

        assert!(repo
            .update_billing_profile(999, &BillingDetails::default(), None, TimeMs::new(8))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_verification_and_delete() {
        let (repo, _temp) = setup_repo().await;
        let p = repo
            .upsert_billing_profile(&wallet(), &details("Ada"), TimeMs::new(1))
            .await
            .unwrap();

        let verified = repo
            .set_billing_verification(
                p.id,
                VerificationStatus::Verified,
                Some("abc123"),
                TimeMs::new(3),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(verified.verification_status, VerificationStatus::Verified);
        assert_eq!(verified.verification_hash.as_deref(), Some("abc123"));
        assert_eq!(verified.verification_timestamp, Some(TimeMs::new(3)));

        assert!(repo.delete_billing_profile(p.id).await.unwrap());
        assert!(!repo.delete_billing_profile(p.id).await.unwrap());
        assert!(repo.billing_profile_by_wallet(&wallet()).await.unwrap().is_none());
    }
}
