use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Store;
use crate::error::{Result, StoreError};
use crate::key::KeyPath;
use crate::memory::MemoryStore;
use crate::tree::Node;
use crate::value::Value;

/// File-backed [`Store`].
///
/// The whole tree is read into memory on [`FileStore::open`] and written back
/// by [`Store::flush`] (and on drop) when it has changed. Writes go to a
/// temporary file in the same directory which is then renamed over the target,
/// so a crash mid-flush leaves the previous image intact.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	tree: MemoryStore,
	dirty: AtomicBool,
	flush_gate: Mutex<()>,
}

impl FileStore {
	/// Opens the store at `path`, starting empty if the file does not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let root = match std::fs::read(&path) {
			Ok(bytes) => postcard::from_bytes::<Node>(&bytes).map_err(|source| StoreError::Codec {
				path: path.clone(),
				source,
			})?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %path.display(), "store file absent, starting empty");
				Node::default()
			}
			Err(source) => return Err(StoreError::Io { path, source }),
		};
		Ok(Self {
			path,
			tree: MemoryStore::from_tree(root),
			dirty: AtomicBool::new(false),
			flush_gate: Mutex::new(()),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty.load(Ordering::Acquire)
	}

	fn touched<T>(&self, result: Result<T>) -> Result<T> {
		if result.is_ok() {
			self.dirty.store(true, Ordering::Release);
		}
		result
	}

	fn write_image(&self, image: &Node) -> Result<()> {
		let io_err = |source| StoreError::Io {
			path: self.path.clone(),
			source,
		};
		let bytes = postcard::to_stdvec(image).map_err(|source| StoreError::Codec {
			path: self.path.clone(),
			source,
		})?;
		let dir = match self.path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
			_ => PathBuf::from("."),
		};
		std::fs::create_dir_all(&dir).map_err(io_err)?;
		let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
		tmp.write_all(&bytes).map_err(io_err)?;
		tmp.as_file().sync_all().map_err(io_err)?;
		tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
		Ok(())
	}
}

impl Store for FileStore {
	fn add_subtree(&self, key: &KeyPath) -> Result<()> {
		self.touched(self.tree.add_subtree(key))
	}

	fn remove_subtree(&self, key: &KeyPath) -> Result<bool> {
		self.touched(self.tree.remove_subtree(key))
	}

	fn has_subtree(&self, key: &KeyPath) -> Result<bool> {
		self.tree.has_subtree(key)
	}

	fn get_value(&self, key: &KeyPath, name: &str) -> Result<Option<Value>> {
		self.tree.get_value(key, name)
	}

	fn set_value(&self, key: &KeyPath, name: &str, value: Value) -> Result<()> {
		self.touched(self.tree.set_value(key, name, value))
	}

	fn remove_value(&self, key: &KeyPath, name: &str) -> Result<bool> {
		self.touched(self.tree.remove_value(key, name))
	}

	fn subtrees(&self, key: &KeyPath) -> Result<Vec<String>> {
		self.tree.subtrees(key)
	}

	fn flush(&self) -> Result<()> {
		let _gate = self.flush_gate.lock();
		if !self.dirty.swap(false, Ordering::AcqRel) {
			return Ok(());
		}
		let image = self.tree.snapshot();
		if let Err(e) = self.write_image(&image) {
			self.dirty.store(true, Ordering::Release);
			return Err(e);
		}
		debug!(path = %self.path.display(), "store flushed");
		Ok(())
	}
}

impl Drop for FileStore {
	fn drop(&mut self) {
		if let Err(e) = self.flush() {
			warn!(path = %self.path.display(), error = %e, "failed to flush store on drop");
		}
	}
}
