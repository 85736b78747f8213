use std::fmt;

/// Path of raw segments addressing a node in the store tree.
///
/// Segments are stored verbatim, so they may contain `/`, `:` or any other
/// character (module locations and contract ids routinely do). The `/`-joined
/// [`Display`](fmt::Display) form is for diagnostics only and is never parsed.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath {
	segments: Vec<String>,
}

impl KeyPath {
	/// The root of the tree.
	pub fn root() -> Self {
		Self::default()
	}

	pub fn from_segments<I, S>(segments: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			segments: segments.into_iter().map(Into::into).collect(),
		}
	}

	/// Returns a new path with `segment` appended.
	pub fn child(&self, segment: impl Into<String>) -> Self {
		let mut segments = self.segments.clone();
		segments.push(segment.into());
		Self { segments }
	}

	pub fn parent(&self) -> Option<Self> {
		let (_, head) = self.segments.split_last()?;
		Some(Self { segments: head.to_vec() })
	}

	pub fn last(&self) -> Option<&str> {
		self.segments.last().map(String::as_str)
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}
}

impl fmt::Display for KeyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.segments.is_empty() {
			return f.write_str("/");
		}
		for segment in &self.segments {
			write!(f, "/{segment}")?;
		}
		Ok(())
	}
}

impl fmt::Debug for KeyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "KeyPath({:?})", self.segments)
	}
}
