// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transactional backup and restore over a metadata prefix.

A mutating operation snapshots the live metadata directory into a
timestamped sibling prefix before anything is written. On success the
backup is deleted; on failure the live prefix is rewound to the snapshot
and the backup is retained for inspection. Package objects are never part
of the snapshot.
*/

use {
    crate::{error::Result, storage::StorageBackend},
    chrono::Utc,
    slog::{info, warn, Logger},
};

/// Terminal disposition of a transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionOutcome {
    /// Still open.
    InFlight,
    /// Mutations published, backup deleted.
    Committed,
    /// Live prefix rewound from the backup; backup retained.
    Restored,
    /// Closed without mutations; backup deleted.
    Abandoned,
}

/// A begun transaction over one metadata prefix.
pub struct Transaction<'a> {
    storage: &'a dyn StorageBackend,
    logger: Logger,
    metadata_prefix: String,
    /// None when `behavior.backup` is disabled.
    backup_prefix: Option<String>,
    outcome: TransactionOutcome,
}

impl<'a> Transaction<'a> {
    /// Begin a transaction: detect stale backups, then snapshot every
    /// object under `metadata_prefix` into a timestamped sibling prefix.
    ///
    /// With `backup_enabled` false no snapshot is taken and commit/restore
    /// are no-ops; the operation runs without a restore point.
    pub async fn begin(
        storage: &'a dyn StorageBackend,
        metadata_prefix: &str,
        logger: &Logger,
        backup_enabled: bool,
    ) -> Result<Transaction<'a>> {
        let metadata_prefix = metadata_prefix.trim_matches('/').to_string();

        for stale in stale_backup_prefixes(storage, &metadata_prefix).await? {
            warn!(
                logger,
                "found backup from an interrupted operation: {}; \
                 inspect and remove it manually",
                stale
            );
        }

        let backup_prefix = if backup_enabled {
            let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
            let backup_prefix = format!("{}.backup-{}", metadata_prefix, timestamp);

            let objects = storage.list(&metadata_prefix, None).await?;
            for name in &objects {
                storage
                    .copy(
                        &format!("{}/{}", metadata_prefix, name),
                        &format!("{}/{}", backup_prefix, name),
                    )
                    .await?;
            }

            info!(
                logger,
                "backup created: {} ({} object(s))",
                backup_prefix,
                objects.len()
            );

            Some(backup_prefix)
        } else {
            None
        };

        Ok(Transaction {
            storage,
            logger: logger.clone(),
            metadata_prefix,
            backup_prefix,
            outcome: TransactionOutcome::InFlight,
        })
    }

    /// The backup prefix, if a snapshot was taken.
    pub fn backup_prefix(&self) -> Option<&str> {
        self.backup_prefix.as_deref()
    }

    pub fn outcome(&self) -> TransactionOutcome {
        self.outcome
    }

    /// Delete the backup and mark the transaction committed.
    pub async fn commit(&mut self) -> Result<()> {
        self.delete_backup().await?;
        self.outcome = TransactionOutcome::Committed;

        Ok(())
    }

    /// Close a transaction that performed no mutations. The backup is
    /// deleted; the live prefix was never touched.
    pub async fn abandon(&mut self) -> Result<()> {
        self.delete_backup().await?;
        self.outcome = TransactionOutcome::Abandoned;

        Ok(())
    }

    /// Rewind the live metadata prefix to the snapshot: copy every backup
    /// object back and delete live objects not present in the backup. The
    /// backup is retained for inspection.
    pub async fn restore(&mut self) -> Result<()> {
        let backup_prefix = match &self.backup_prefix {
            Some(prefix) => prefix.clone(),
            None => {
                warn!(self.logger, "no backup available to restore");
                self.outcome = TransactionOutcome::Restored;
                return Ok(());
            }
        };

        let backup_objects = self.storage.list(&backup_prefix, None).await?;
        let live_objects = self.storage.list(&self.metadata_prefix, None).await?;

        for name in &live_objects {
            if !backup_objects.contains(name) {
                self.storage
                    .delete(&format!("{}/{}", self.metadata_prefix, name))
                    .await?;
            }
        }

        for name in &backup_objects {
            self.storage
                .copy(
                    &format!("{}/{}", backup_prefix, name),
                    &format!("{}/{}", self.metadata_prefix, name),
                )
                .await?;
        }

        self.outcome = TransactionOutcome::Restored;

        warn!(
            self.logger,
            "metadata restored from backup; backup retained at {}", backup_prefix
        );

        Ok(())
    }

    async fn delete_backup(&mut self) -> Result<()> {
        if let Some(backup_prefix) = self.backup_prefix.take() {
            for name in self.storage.list(&backup_prefix, None).await? {
                self.storage
                    .delete(&format!("{}/{}", backup_prefix, name))
                    .await?;
            }
        }

        Ok(())
    }
}

/// Backup prefixes left behind by interrupted operations.
///
/// A backup prefix is a sibling of the metadata directory named
/// `<dir>.backup-<timestamp>`, so it shows up in a listing of the parent
/// prefix.
pub async fn stale_backup_prefixes(
    storage: &dyn StorageBackend,
    metadata_prefix: &str,
) -> Result<Vec<String>> {
    let metadata_prefix = metadata_prefix.trim_matches('/');

    let (parent, dir) = match metadata_prefix.rsplit_once('/') {
        Some((parent, dir)) => (parent, dir),
        None => ("", metadata_prefix),
    };

    let marker = format!("{}.backup-", dir);
    let mut prefixes = vec![];

    for name in storage.list(parent, None).await? {
        if let Some(rest) = name.strip_prefix(&marker) {
            if let Some((stamp, _)) = rest.split_once('/') {
                let prefix = if parent.is_empty() {
                    format!("{}{}", marker, stamp)
                } else {
                    format!("{}/{}{}", parent, marker, stamp)
                };

                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }
    }

    Ok(prefixes)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::storage::local::LocalBackend,
        slog::{o, Discard},
    };

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    async fn seeded_backend(dir: &std::path::Path) -> Result<LocalBackend> {
        let backend = LocalBackend::new(dir)?;
        backend
            .write_bytes(b"index", "el9/x86_64/repodata/repomd.xml")
            .await?;
        backend
            .write_bytes(b"primary", "el9/x86_64/repodata/aa-primary.xml.gz")
            .await?;
        Ok(backend)
    }

    #[tokio::test]
    async fn commit_deletes_backup() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = seeded_backend(dir.path()).await?;
        let logger = test_logger();

        let mut txn =
            Transaction::begin(&backend, "el9/x86_64/repodata", &logger, true).await?;

        let backup_prefix = txn.backup_prefix().unwrap().to_string();
        assert!(
            backend
                .exists(&format!("{}/repomd.xml", backup_prefix))
                .await?
        );

        txn.commit().await?;
        assert_eq!(txn.outcome(), TransactionOutcome::Committed);
        assert!(
            !backend
                .exists(&format!("{}/repomd.xml", backup_prefix))
                .await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn restore_rewinds_live_prefix() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = seeded_backend(dir.path()).await?;
        let logger = test_logger();

        let mut txn =
            Transaction::begin(&backend, "el9/x86_64/repodata", &logger, true).await?;

        // Simulate a partial publish: index overwritten, new file uploaded,
        // old file deleted.
        backend
            .write_bytes(b"broken", "el9/x86_64/repodata/repomd.xml")
            .await?;
        backend
            .write_bytes(b"new", "el9/x86_64/repodata/bb-primary.xml.gz")
            .await?;
        backend
            .delete("el9/x86_64/repodata/aa-primary.xml.gz")
            .await?;

        txn.restore().await?;
        assert_eq!(txn.outcome(), TransactionOutcome::Restored);

        assert_eq!(
            backend.read("el9/x86_64/repodata/repomd.xml").await?,
            b"index"
        );
        assert_eq!(
            backend
                .read("el9/x86_64/repodata/aa-primary.xml.gz")
                .await?,
            b"primary"
        );
        assert!(
            !backend
                .exists("el9/x86_64/repodata/bb-primary.xml.gz")
                .await?
        );

        // Backup is retained for inspection.
        let backup_prefix = txn.backup_prefix().unwrap();
        assert!(
            backend
                .exists(&format!("{}/repomd.xml", backup_prefix))
                .await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn disabled_backup_skips_snapshot() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = seeded_backend(dir.path()).await?;
        let logger = test_logger();

        let mut txn =
            Transaction::begin(&backend, "el9/x86_64/repodata", &logger, false).await?;
        assert!(txn.backup_prefix().is_none());

        txn.commit().await?;
        assert_eq!(txn.outcome(), TransactionOutcome::Committed);

        Ok(())
    }

    #[tokio::test]
    async fn stale_backups_are_detected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = seeded_backend(dir.path()).await?;

        backend
            .write_bytes(
                b"old",
                "el9/x86_64/repodata.backup-20240101-010101/repomd.xml",
            )
            .await?;

        let stale = stale_backup_prefixes(&backend, "el9/x86_64/repodata").await?;
        assert_eq!(
            stale,
            vec!["el9/x86_64/repodata.backup-20240101-010101".to_string()]
        );

        Ok(())
    }

    #[tokio::test]
    async fn begin_on_empty_prefix_backs_up_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = LocalBackend::new(dir.path())?;
        let logger = test_logger();

        let mut txn = Transaction::begin(&backend, "fresh/repodata", &logger, true).await?;
        assert!(txn.backup_prefix().is_some());

        txn.abandon().await?;
        assert_eq!(txn.outcome(), TransactionOutcome::Abandoned);

        Ok(())
    }
}
