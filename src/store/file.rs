//! File-backed [`GrantStore`] so signed-in principals survive restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{DelegatedGrant, PrincipalId},
	store::{CompareAndSwapOutcome, GrantStore, StoreError, StoreFuture},
};

/// Persists grants to a JSON file after each mutation.
///
/// The snapshot holds refresh tokens and assertions in clear text; restrict the file's
/// permissions accordingly.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<PrincipalId, DelegatedGrant>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the JSON snapshot.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<PrincipalId, DelegatedGrant>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let grants: Vec<DelegatedGrant> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(grants.into_iter().map(|grant| (grant.principal.clone(), grant)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(
		&self,
		contents: &HashMap<PrincipalId, DelegatedGrant>,
	) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut snapshot: Vec<_> = contents.values().collect();

		snapshot.sort_by(|a, b| a.principal.cmp(&b.principal));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl GrantStore for FileStore {
	fn save(&self, grant: DelegatedGrant) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut next = guard.clone();

			next.insert(grant.principal.clone(), grant);
			self.persist_locked(&next)?;
			*guard = next;

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, principal: &'a PrincipalId) -> StoreFuture<'a, Option<DelegatedGrant>> {
		Box::pin(async move { Ok(self.inner.read().get(principal).cloned()) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		principal: &'a PrincipalId,
		expected_secret: &'a str,
		replacement: DelegatedGrant,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let outcome = match guard.get(principal) {
				Some(existing) if existing.secret.expose() == expected_secret =>
					CompareAndSwapOutcome::Updated,
				Some(_) => CompareAndSwapOutcome::SecretMismatch,
				None => CompareAndSwapOutcome::Missing,
			};

			if matches!(outcome, CompareAndSwapOutcome::Updated) {
				let mut next = guard.clone();

				next.insert(principal.clone(), replacement);
				self.persist_locked(&next)?;
				*guard = next;
			}

			Ok(outcome)
		})
	}

	fn remove<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Option<DelegatedGrant>> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if !guard.contains_key(principal) {
				return Ok(None);
			}

			let mut next = guard.clone();
			let removed = next.remove(principal);

			self.persist_locked(&next)?;
			*guard = next;

			Ok(removed)
		})
	}
}
