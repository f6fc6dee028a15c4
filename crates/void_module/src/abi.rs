//! Shared-library entry contract
//!
//! A module library exports one function:
//!
//! ```text
//! extern "C" fn void_get_module_api(api_id: u64) -> *const c_void
//! ```
//!
//! Asked for [`MODULE_EXPORT_API_ID`] it returns a pointer to a static
//! [`ModuleVTable`]. Any other id may return a pointer to an engine-level
//! export the library chooses to publish, or null.
//!
//! The vtable holds plain Rust function pointers taking host types, so a
//! module library must be built with the same toolchain and the same
//! versions of the void crates as the host.

use std::ffi::c_void;

use void_core::id64;

use crate::cvar::CVarRegistry;
use crate::error::Result;
use crate::module::{Module, ModuleContext, ReloadState};

/// Bumped whenever [`ModuleVTable`] or [`ModuleContext`] change shape
pub const MODULE_ABI_VERSION: u32 = 1;

/// Id that asks an entry function for its [`ModuleVTable`]
pub const MODULE_EXPORT_API_ID: u64 = id64("void_module_api_v0");

/// Name of the exported entry function
pub const MODULE_ENTRY_SYMBOL: &str = "void_get_module_api";

/// Signature of the exported entry function
pub type GetModuleApiFn = unsafe extern "C" fn(api_id: u64) -> *const c_void;

pub type InitFn = fn(&mut ModuleContext<'_>) -> Result<()>;
pub type InitCVarFn = fn(&mut CVarRegistry) -> Result<()>;
pub type UpdateFn = fn(&mut ModuleContext<'_>, f32);
pub type ShutdownFn = fn(&mut ModuleContext<'_>);
pub type ReloadBeginFn = fn(&mut ModuleContext<'_>) -> Option<ReloadState>;
pub type ReloadEndFn = fn(&mut ModuleContext<'_>, Option<ReloadState>) -> Result<()>;

/// Lifecycle table exported by a module library
///
/// Build it in a `static` with [`ModuleVTable::new`] and struct update
/// syntax, then export it with [`export_module!`](crate::export_module):
///
/// ```
/// use void_module::{ModuleContext, ModuleVTable, Result};
///
/// fn init(_ctx: &mut ModuleContext<'_>) -> Result<()> {
///     Ok(())
/// }
///
/// fn update(_ctx: &mut ModuleContext<'_>, _dt: f32) {}
///
/// static VTABLE: ModuleVTable = ModuleVTable {
///     update: Some(update),
///     ..ModuleVTable::new("module_example", init)
/// };
/// # assert_eq!(VTABLE.name, "module_example");
/// ```
#[repr(C)]
pub struct ModuleVTable {
    pub abi_version: u32,
    pub name: &'static str,
    pub init: InitFn,
    pub init_api: Option<InitFn>,
    pub init_cvar: Option<InitCVarFn>,
    pub update: Option<UpdateFn>,
    pub after_update: Option<UpdateFn>,
    pub shutdown: Option<ShutdownFn>,
    pub reload_begin: Option<ReloadBeginFn>,
    pub reload_end: Option<ReloadEndFn>,
}

impl ModuleVTable {
    /// A table with only `init` filled in
    pub const fn new(name: &'static str, init: InitFn) -> Self {
        Self {
            abi_version: MODULE_ABI_VERSION,
            name,
            init,
            init_api: None,
            init_cvar: None,
            update: None,
            after_update: None,
            shutdown: None,
            reload_begin: None,
            reload_end: None,
        }
    }
}

/// Export a [`ModuleVTable`] from a `cdylib`
///
/// Extra `id => static` pairs publish engine-level exports that the host can
/// find with `ModuleLoader::find_export`.
///
/// ```ignore
/// void_module::export_module!(VTABLE);
/// void_module::export_module!(VTABLE, { void_core::id64("my_export") => MY_EXPORT });
/// ```
#[macro_export]
macro_rules! export_module {
    ($vtable:path) => {
        $crate::export_module!($vtable, {});
    };
    ($vtable:path, { $($id:expr => $export:path),* $(,)? }) => {
        #[no_mangle]
        pub unsafe extern "C" fn void_get_module_api(api_id: u64) -> *const ::core::ffi::c_void {
            if api_id == $crate::MODULE_EXPORT_API_ID {
                return &$vtable as *const $crate::ModuleVTable as *const ::core::ffi::c_void;
            }
            $(
                if api_id == $id {
                    return &$export as *const _ as *const ::core::ffi::c_void;
                }
            )*
            ::core::ptr::null()
        }
    };
}

/// Adapts a [`ModuleVTable`] to the [`Module`] trait
pub struct VTableModule {
    vtable: &'static ModuleVTable,
}

impl VTableModule {
    /// Wrap a table
    ///
    /// The table must stay valid for as long as the returned value lives. For
    /// tables inside a shared library the caller keeps the library loaded
    /// until this value is dropped.
    pub fn new(vtable: &'static ModuleVTable) -> Self {
        Self { vtable }
    }

    /// Name declared in the table
    pub fn name(&self) -> &'static str {
        self.vtable.name
    }
}

impl Module for VTableModule {
    fn init(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        (self.vtable.init)(ctx)
    }

    fn init_api(&mut self, ctx: &mut ModuleContext<'_>) -> Result<()> {
        match self.vtable.init_api {
            Some(f) => f(ctx),
            None => Ok(()),
        }
    }

    fn init_cvar(&mut self, cvars: &mut CVarRegistry) -> Result<()> {
        match self.vtable.init_cvar {
            Some(f) => f(cvars),
            None => Ok(()),
        }
    }

    fn update(&mut self, ctx: &mut ModuleContext<'_>, dt: f32) {
        if let Some(f) = self.vtable.update {
            f(ctx, dt);
        }
    }

    fn after_update(&mut self, ctx: &mut ModuleContext<'_>, dt: f32) {
        if let Some(f) = self.vtable.after_update {
            f(ctx, dt);
        }
    }

    fn shutdown(&mut self, ctx: &mut ModuleContext<'_>) {
        if let Some(f) = self.vtable.shutdown {
            f(ctx);
        }
    }

    fn reload_begin(&mut self, ctx: &mut ModuleContext<'_>) -> Option<ReloadState> {
        self.vtable.reload_begin.and_then(|f| f(ctx))
    }

    fn reload_end(&mut self, ctx: &mut ModuleContext<'_>, state: Option<ReloadState>) -> Result<()> {
        match self.vtable.reload_end {
            Some(f) => f(ctx, state),
            None => {
                self.init(ctx)?;
                self.init_api(ctx)
            }
        }
    }
}

/// Resolve the vtable behind an entry function and check its ABI version
///
/// # Safety
/// `entry` must follow the entry contract, and whatever code it lives in
/// must stay loaded while the returned reference is used.
pub(crate) unsafe fn resolve_vtable(
    entry: GetModuleApiFn,
    path: &std::path::Path,
) -> Result<&'static ModuleVTable> {
    let ptr = entry(MODULE_EXPORT_API_ID) as *const ModuleVTable;
    if ptr.is_null() {
        return Err(crate::ModuleError::load_error(path, "entry returned no module table"));
    }

    let vtable = &*ptr;
    if vtable.abi_version != MODULE_ABI_VERSION {
        return Err(crate::ModuleError::AbiMismatch {
            path: path.to_path_buf(),
            found: vtable.abi_version,
            expected: MODULE_ABI_VERSION,
        });
    }
    Ok(vtable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn init(_ctx: &mut ModuleContext<'_>) -> Result<()> {
        Ok(())
    }

    static GOOD: ModuleVTable = ModuleVTable::new("good", init);
    static OLD: ModuleVTable = ModuleVTable {
        abi_version: 0,
        ..ModuleVTable::new("old", init)
    };

    unsafe extern "C" fn good_entry(api_id: u64) -> *const c_void {
        if api_id == MODULE_EXPORT_API_ID {
            &GOOD as *const ModuleVTable as *const c_void
        } else {
            std::ptr::null()
        }
    }

    unsafe extern "C" fn old_entry(_api_id: u64) -> *const c_void {
        &OLD as *const ModuleVTable as *const c_void
    }

    unsafe extern "C" fn empty_entry(_api_id: u64) -> *const c_void {
        std::ptr::null()
    }

    #[test]
    fn test_resolve_vtable() {
        let vtable = unsafe { resolve_vtable(good_entry, Path::new("good")) }.unwrap();
        assert_eq!(vtable.name, "good");
        assert!(vtable.update.is_none());
    }

    #[test]
    fn test_abi_mismatch() {
        let err = unsafe { resolve_vtable(old_entry, Path::new("old")) }.err().unwrap();
        assert!(matches!(err, crate::ModuleError::AbiMismatch { found: 0, .. }));
    }

    #[test]
    fn test_missing_table() {
        let err = unsafe { resolve_vtable(empty_entry, Path::new("empty")) }.err().unwrap();
        assert!(matches!(err, crate::ModuleError::LoadError { .. }));
    }

    #[test]
    fn test_export_id_is_stable() {
        assert_eq!(MODULE_EXPORT_API_ID, id64("void_module_api_v0"));
    }
}
