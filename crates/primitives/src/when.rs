use std::fmt;

/// The instant at which a loader operation runs.
///
/// Loaders use this to decide how aggressive to be: [`When::Timer`] is an
/// early best-effort unload pass, [`When::Shutdown`] is the final mandatory one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum When {
	/// Process startup sweep.
	Startup,
	/// Explicit request for a single component or directory.
	Component,
	/// Periodic housekeeping.
	Timer,
	/// Manager teardown.
	Shutdown,
}

impl When {
	/// Whether modules must be released even if they ask to stay loaded.
	pub fn is_mandatory(self) -> bool {
		matches!(self, When::Shutdown)
	}
}

impl fmt::Display for When {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			When::Startup => "startup",
			When::Component => "component",
			When::Timer => "timer",
			When::Shutdown => "shutdown",
		};
		f.write_str(name)
	}
}
