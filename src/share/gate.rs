//! Share validity state machine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::store::{ShareRecord, ShareStore};

/// SHA-256 hex digest used for stored share passwords.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Gate order is fixed: existence, expiry, quota, password. An expired
/// share with a wrong password reports `Expired`, never
/// `IncorrectPassword`.
pub struct ShareGate {
    shares: Arc<dyn ShareStore>,
}

impl ShareGate {
    pub fn new(shares: Arc<dyn ShareStore>) -> Self {
        Self { shares }
    }

    /// Non-consuming check without the password gate. Backs the
    /// metadata (`action=info`) path; never moves the counter.
    pub async fn peek(&self, token: &str, now: DateTime<Utc>) -> Result<ShareRecord> {
        let share = self
            .shares
            .get_share(token)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("share {}", token)))?;

        // Half-open boundary: a check exactly at expires_at is still
        // valid, strictly after is expired.
        if let Some(expires_at) = share.expires_at {
            if now > expires_at {
                return Err(AppError::Expired);
            }
        }

        if let Some(max) = share.max_downloads {
            if share.download_count >= max {
                return Err(AppError::QuotaExceeded);
            }
        }

        Ok(share)
    }

    /// Full gate check in order, without consuming quota.
    pub async fn validate(
        &self,
        token: &str,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ShareRecord> {
        let share = self.peek(token, now).await?;

        if let Some(stored_hash) = &share.password_hash {
            match password {
                None => return Err(AppError::PasswordRequired),
                Some(supplied) if &hash_password(supplied) != stored_hash => {
                    return Err(AppError::IncorrectPassword)
                }
                Some(_) => {}
            }
        }

        Ok(share)
    }

    /// Gate check plus one atomic quota consumption. The counter moves
    /// before the content body streams; an aborted download still
    /// costs quota. Under concurrency the store's guarded increment is
    /// the authority, so at most `max_downloads` consumptions ever
    /// succeed.
    pub async fn consume(
        &self,
        token: &str,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ShareRecord> {
        let share = self.validate(token, password, now).await?;

        if !self.shares.try_consume_download(token).await? {
            return Err(AppError::QuotaExceeded);
        }

        tracing::debug!(token, "Share download consumed");
        Ok(share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ShareTarget};
    use chrono::Duration;
    use uuid::Uuid;

    fn share(token: &str) -> ShareRecord {
        ShareRecord {
            token: token.to_string(),
            target: ShareTarget::File(Uuid::new_v4()),
            expires_at: None,
            max_downloads: None,
            password_hash: None,
            download_count: 0,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    async fn gate_with(records: Vec<ShareRecord>) -> ShareGate {
        let store = MemoryStore::new();
        for record in &records {
            crate::store::ShareStore::create_share(&store, record)
                .await
                .unwrap();
        }
        ShareGate::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_missing_share() {
        let gate = gate_with(vec![]).await;
        let err = gate.validate("nope", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_half_open() {
        let deadline = Utc::now();
        let mut record = share("t");
        record.expires_at = Some(deadline);
        let gate = gate_with(vec![record]).await;

        // Exactly at the deadline: still valid
        assert!(gate.validate("t", None, deadline).await.is_ok());

        // One unit later: expired
        let err = gate
            .validate("t", None, deadline + Duration::seconds(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Expired));
    }

    #[tokio::test]
    async fn test_expired_wins_over_wrong_password() {
        let mut record = share("t");
        record.expires_at = Some(Utc::now() - Duration::hours(1));
        record.password_hash = Some(hash_password("secret"));
        let gate = gate_with(vec![record]).await;

        let err = gate
            .validate("t", Some("wrong"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Expired));
    }

    #[tokio::test]
    async fn test_quota_wins_over_password() {
        let mut record = share("t");
        record.max_downloads = Some(1);
        record.download_count = 1;
        record.password_hash = Some(hash_password("secret"));
        let gate = gate_with(vec![record]).await;

        let err = gate.validate("t", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_password_required_then_incorrect_then_ok() {
        let mut record = share("t");
        record.password_hash = Some(hash_password("secret"));
        let gate = gate_with(vec![record]).await;

        let err = gate.validate("t", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::PasswordRequired));

        let err = gate
            .validate("t", Some("nope"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IncorrectPassword));

        assert!(gate.validate("t", Some("secret"), Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_peek_skips_password_and_quota_consumption() {
        let mut record = share("t");
        record.password_hash = Some(hash_password("secret"));
        record.max_downloads = Some(1);
        let gate = gate_with(vec![record]).await;

        let peeked = gate.peek("t", Utc::now()).await.unwrap();
        assert_eq!(peeked.download_count, 0);
    }

    #[tokio::test]
    async fn test_consume_moves_counter_once() {
        let mut record = share("t");
        record.max_downloads = Some(1);
        let gate = gate_with(vec![record]).await;

        assert!(gate.consume("t", None, Utc::now()).await.is_ok());
        let err = gate.consume("t", None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded));
    }
}
