//! Refresh-token revocation list.
//!
//! Each entry is keyed by the token's `jti` and lives until the token it
//! revokes would have expired anyway. A rotation records the successor `jti`
//! on the retired entry, so a logout presenting any token of a session can
//! walk forward and revoke whatever that session rotated into.
//!
//! Check-and-insert goes through `DashMap::entry`, which holds the shard lock
//! for that key: of two callers racing on the same `jti`, exactly one wins.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::metrics::REVOCATIONS_GAUGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Successor {
    pub jti: Uuid,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationEntry {
    pub expires_at: i64,
    pub successor: Option<Successor>,
}

pub struct SessionStore {
    revoked: DashMap<Uuid, RevocationEntry>,
    /// Write-through copy so a restart does not resurrect retired tokens.
    journal: Option<PgPool>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            revoked: DashMap::new(),
            journal: None,
        }
    }

    /// Load unexpired entries from `revoked_tokens` and keep writing to it.
    pub async fn with_journal(pool: PgPool) -> anyhow::Result<Self> {
        let rows: Vec<(Uuid, DateTime<Utc>, Option<Uuid>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT jti, expires_at, successor_jti, successor_expires_at
             FROM revoked_tokens WHERE expires_at > NOW()",
        )
        .fetch_all(&pool)
        .await?;

        let revoked = DashMap::with_capacity(rows.len());
        for (jti, expires_at, successor_jti, successor_expires_at) in rows {
            let successor = successor_jti.zip(successor_expires_at).map(|(jti, exp)| Successor {
                jti,
                expires_at: exp.timestamp(),
            });
            revoked.insert(
                jti,
                RevocationEntry {
                    expires_at: expires_at.timestamp(),
                    successor,
                },
            );
        }
        info!("Session store: loaded {} revocation entries", revoked.len());
        REVOCATIONS_GAUGE.set(revoked.len() as f64);

        Ok(Self {
            revoked,
            journal: Some(pool),
        })
    }

    pub fn is_revoked(&self, jti: &Uuid) -> bool {
        self.revoked.contains_key(jti)
    }

    pub fn get(&self, jti: &Uuid) -> Option<RevocationEntry> {
        self.revoked.get(jti).map(|e| *e)
    }

    /// Returns `true` if this call revoked the token, `false` if it already was.
    pub fn revoke(&self, jti: Uuid, expires_at: i64) -> bool {
        self.insert_if_absent(
            jti,
            RevocationEntry {
                expires_at,
                successor: None,
            },
        )
    }

    /// Retire `old` in favour of `next`. Fails if `old` was already revoked,
    /// whether by a concurrent refresh or by a logout.
    pub fn rotate(&self, old: Uuid, old_expires_at: i64, next: Successor) -> bool {
        self.insert_if_absent(
            old,
            RevocationEntry {
                expires_at: old_expires_at,
                successor: Some(next),
            },
        )
    }

    /// Revoke `jti` and every token it was rotated into. Returns how many
    /// entries this call created; `0` means the session was already dead.
    pub fn revoke_lineage(&self, jti: Uuid, expires_at: i64) -> usize {
        let mut created = 0;
        let mut next = Some(Successor { jti, expires_at });
        // Each hop moves to a freshly minted jti; the bound only guards
        // against a corrupted journal.
        let mut hops = self.revoked.len() + 1;

        while let Some(current) = next.take() {
            if hops == 0 {
                warn!("Session store: lineage walk from {jti} did not terminate");
                break;
            }
            hops -= 1;

            next = match self.revoked.entry(current.jti) {
                Entry::Occupied(existing) => existing.get().successor,
                Entry::Vacant(slot) => {
                    let entry = RevocationEntry {
                        expires_at: current.expires_at,
                        successor: None,
                    };
                    slot.insert(entry);
                    self.persist(current.jti, entry);
                    created += 1;
                    None
                }
            };
        }

        REVOCATIONS_GAUGE.set(self.revoked.len() as f64);
        created
    }

    /// Drop entries whose token expired strictly before `now`.
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.revoked.len();
        self.revoked.retain(|_, entry| entry.expires_at >= now);
        let purged = before.saturating_sub(self.revoked.len());
        REVOCATIONS_GAUGE.set(self.revoked.len() as f64);

        if let Some(pool) = self.journal.clone() {
            tokio::spawn(async move {
                let cutoff = DateTime::<Utc>::from_timestamp(now, 0).unwrap_or_else(Utc::now);
                if let Err(e) = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
                    .bind(cutoff)
                    .execute(&pool)
                    .await
                {
                    warn!("Session store: journal purge failed: {e}");
                }
            });
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }

    /// Spawn the periodic purge of expired entries.
    pub fn start_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = self.purge_expired(Utc::now().timestamp());
                if purged > 0 {
                    info!("Session store: purged {purged} expired revocation entries");
                }
            }
        })
    }

    fn insert_if_absent(&self, jti: Uuid, entry: RevocationEntry) -> bool {
        let inserted = match self.revoked.entry(jti) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                self.persist(jti, entry);
                true
            }
        };
        if inserted {
            REVOCATIONS_GAUGE.set(self.revoked.len() as f64);
        }
        inserted
    }

    /// Best-effort journal write; the in-memory entry is authoritative.
    fn persist(&self, jti: Uuid, entry: RevocationEntry) {
        let Some(pool) = self.journal.clone() else {
            return;
        };
        tokio::spawn(async move {
            let expires_at = DateTime::<Utc>::from_timestamp(entry.expires_at, 0);
            let successor_jti = entry.successor.map(|s| s.jti);
            let successor_expires_at = entry
                .successor
                .and_then(|s| DateTime::<Utc>::from_timestamp(s.expires_at, 0));
            let result = sqlx::query(
                "INSERT INTO revoked_tokens (jti, expires_at, successor_jti, successor_expires_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (jti) DO NOTHING",
            )
            .bind(jti)
            .bind(expires_at)
            .bind(successor_jti)
            .bind(successor_expires_at)
            .execute(&pool)
            .await;
            if let Err(e) = result {
                warn!("Session store: failed to journal revocation of {jti}: {e}");
            }
        });
    }
}
