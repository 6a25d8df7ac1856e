use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::archive::{ArchiveOutcome, Archiver};
use crate::error::{CoreError, CoreResult};
use crate::hash::file_md5;
use crate::storage::PasswordStore;

/// Brute-force candidates, offered in this order.
pub const CANDIDATE_PASSWORDS: &[&str] = &[
    "(duerumonstasu!)",
    "(H4mtar0!)",
    "(TeamKurosaki)",
    "by DarthMaster",
    "by_GfS",
    "ExcAlib444h!!",
    "https://www.teamkurosaki.net/",
    "M1rum0!!",
    "TeamKurosaki",
    "teamkurosaki.net",
    "TeamKurosaki-real89mx2",
    "TeamKurosaki-Rolando96",
    "TeamKurosaki-Shingeki",
    "www.mexanime.info",
    "www.teamkurosaki.net",
    "www.lascaricaturas.com",
    "Math",
    "80stvseries",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    Extracted { password: String },
    NoPasswordFound,
}

/// Resolves an archive's password and extracts it: cached password first,
/// then the candidate list in order. Only a brute-force hit is persisted;
/// a cache hit is already stored.
pub struct ExtractionEngine {
    archiver: Arc<dyn Archiver>,
    store: Arc<Mutex<Box<dyn PasswordStore>>>,
}

impl ExtractionEngine {
    pub fn new(archiver: Arc<dyn Archiver>, store: Arc<Mutex<Box<dyn PasswordStore>>>) -> Self {
        Self { archiver, store }
    }

    /// Extracts `first_volume` into `outdir`. Rejections move the candidate
    /// loop along; only a failure to run the tool aborts.
    pub fn extract(&self, first_volume: &Path, outdir: &Path) -> CoreResult<ExtractOutcome> {
        let filename = first_volume
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let hash = file_md5(first_volume)?;

        let cached = self
            .store
            .lock()
            .map_err(|_| CoreError::Storage("password store lock poisoned".to_string()))?
            .password_for(&hash)?;
        if let Some(password) = cached {
            debug!(filename = %filename, "trying cached password");
            match self.archiver.extract(first_volume, &password, outdir)? {
                ArchiveOutcome::Accepted => {
                    info!(filename = %filename, "extracted with cached password");
                    return Ok(ExtractOutcome::Extracted { password });
                }
                ArchiveOutcome::Rejected(detail) => {
                    warn!(filename = %filename, detail, "cached password no longer works");
                }
            }
        }

        for (index, candidate) in CANDIDATE_PASSWORDS.iter().enumerate() {
            match self.archiver.extract(first_volume, candidate, outdir)? {
                ArchiveOutcome::Accepted => {
                    info!(filename = %filename, "extracted after brute force");
                    if let Ok(mut store) = self.store.lock() {
                        if let Err(err) = store.save_password(&filename, &hash, candidate) {
                            warn!(%err, "failed to persist password");
                        }
                    }
                    return Ok(ExtractOutcome::Extracted {
                        password: candidate.to_string(),
                    });
                }
                ArchiveOutcome::Rejected(detail) => {
                    debug!(
                        filename = %filename,
                        candidate = index + 1,
                        total = CANDIDATE_PASSWORDS.len(),
                        detail,
                        "password rejected"
                    );
                }
            }
        }

        warn!(filename = %filename, "no candidate password opened the archive");
        Ok(ExtractOutcome::NoPasswordFound)
    }

    /// Trial-only variant: finds a working password without extracting.
    /// Reads the cache but never writes it back.
    pub fn find_password(&self, archive: &Path) -> CoreResult<Option<String>> {
        let hash = file_md5(archive)?;
        let cached = self
            .store
            .lock()
            .map_err(|_| CoreError::Storage("password store lock poisoned".to_string()))?
            .password_for(&hash)?;
        if let Some(password) = cached {
            if matches!(
                self.archiver.test(archive, &password)?,
                ArchiveOutcome::Accepted
            ) {
                return Ok(Some(password));
            }
        }
        for candidate in CANDIDATE_PASSWORDS {
            if matches!(
                self.archiver.test(archive, candidate)?,
                ArchiveOutcome::Accepted
            ) {
                return Ok(Some(candidate.to_string()));
            }
        }
        Ok(None)
    }
}
