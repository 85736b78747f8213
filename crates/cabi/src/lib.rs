#![allow(non_camel_case_types)]
//! `#[repr(C)]` types exchanged between the component host and native modules.
//!
//! A native module is a dynamic library exporting [`COMREG_MODULE_ENTRY_V1`].
//! The host calls it with a [`ComregHostV1`] and the module fills in a
//! [`ComregModuleV1`] describing its components and callbacks. Every pointer
//! handed across the boundary is borrowed for the duration of the call unless
//! documented otherwise; strings are UTF-8 without a terminator.

use core::ffi::c_void;

/// ABI revision understood by this host. Modules reporting anything else are rejected.
pub const COMREG_ABI_VERSION_V1: u32 = 1;

/// NUL-terminated name of the module entry point symbol.
pub const COMREG_MODULE_ENTRY_V1: &[u8] = b"comreg_module_entry_v1\0";

/// Status codes returned by every module callback.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComregStatus {
	Ok = 0,
	Failed = 1,
	Incompatible = 2,
	NoInterface = 3,
	Deferred = 4,
	NotFound = 5,
}

/// Borrowed UTF-8 string slice.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct ComregStr {
	pub ptr: *const u8,
	pub len: usize,
}

// SAFETY: a ComregStr is a read-only view; the bytes it points at are never
// written through it and must outlive every copy (statics in practice).
unsafe impl Send for ComregStr {}
unsafe impl Sync for ComregStr {}

impl ComregStr {
	pub const EMPTY: Self = Self {
		ptr: core::ptr::null(),
		len: 0,
	};

	/// Wraps a static string. Used by modules for their component tables.
	pub const fn from_static(s: &'static str) -> Self {
		Self {
			ptr: s.as_ptr(),
			len: s.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.ptr.is_null() || self.len == 0
	}

	/// Copies the slice into an owned string, replacing invalid UTF-8.
	///
	/// # Safety
	///
	/// `ptr` must be null or valid for reads of `len` bytes.
	pub unsafe fn to_string_lossy(&self) -> String {
		if self.is_empty() {
			return String::new();
		}
		let bytes = unsafe { core::slice::from_raw_parts(self.ptr, self.len) };
		String::from_utf8_lossy(bytes).into_owned()
	}
}

/// 128-bit identifier in big-endian byte order (the RFC 4122 layout).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComregCid {
	pub bytes: [u8; 16],
}

impl ComregCid {
	pub const fn from_u128(value: u128) -> Self {
		Self {
			bytes: value.to_be_bytes(),
		}
	}
}

/// One component exported by a module.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct ComregComponentV1 {
	pub cid: ComregCid,
	pub class_name: ComregStr,
	/// Empty when the component has no contract id.
	pub contract_id: ComregStr,
}

/// Services the host offers to modules.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ComregHostV1 {
	pub abi_version: u32,
	pub log: Option<extern "C" fn(message: ComregStr)>,
}

/// Creates an instance of `cid` exposing `iid`. On success `out` receives an
/// opaque handle that the host later passes to `release_instance`.
pub type ComregCreateInstanceV1 =
	unsafe extern "C" fn(cid: *const ComregCid, iid: *const ComregCid, out: *mut *mut c_void) -> ComregStatus;

/// Vtable a module fills in from its entry point.
///
/// The `components` and `requires` arrays must stay valid until `shutdown`
/// returns; modules normally point them at statics.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct ComregModuleV1 {
	pub abi_version: u32,
	pub components: *const ComregComponentV1,
	pub component_count: usize,
	/// Components that must be registered before this module can register.
	pub requires: *const ComregCid,
	pub require_count: usize,
	pub create_instance: Option<ComregCreateInstanceV1>,
	pub release_instance: Option<unsafe extern "C" fn(instance: *mut c_void)>,
	/// Returns true when the module holds no state and may be unmapped early.
	pub can_unload: Option<extern "C" fn() -> bool>,
	pub shutdown: Option<extern "C" fn()>,
}

impl ComregModuleV1 {
	/// A module table with no components and no callbacks.
	pub const fn empty() -> Self {
		Self {
			abi_version: 0,
			components: core::ptr::null(),
			component_count: 0,
			requires: core::ptr::null(),
			require_count: 0,
			create_instance: None,
			release_instance: None,
			can_unload: None,
			shutdown: None,
		}
	}

	/// # Safety
	///
	/// `components` must be null or valid for `component_count` elements.
	pub unsafe fn components(&self) -> &[ComregComponentV1] {
		if self.components.is_null() {
			return &[];
		}
		unsafe { core::slice::from_raw_parts(self.components, self.component_count) }
	}

	/// # Safety
	///
	/// `requires` must be null or valid for `require_count` elements.
	pub unsafe fn requires(&self) -> &[ComregCid] {
		if self.requires.is_null() {
			return &[];
		}
		unsafe { core::slice::from_raw_parts(self.requires, self.require_count) }
	}
}

/// Signature of [`COMREG_MODULE_ENTRY_V1`].
pub type ComregModuleEntryV1 = unsafe extern "C" fn(host: *const ComregHostV1, out_module: *mut ComregModuleV1) -> ComregStatus;
