use std::ffi::CString;
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr;

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::properties::DomainProperties;

type CoreClrInitialize = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    c_int,
    *const *const c_char,
    *const *const c_char,
    *mut *mut c_void,
    *mut c_uint,
) -> c_int;
type CoreClrCreateDelegate = unsafe extern "C" fn(
    *mut c_void,
    c_uint,
    *const c_char,
    *const c_char,
    *const c_char,
    *mut *mut c_void,
) -> c_int;
type CoreClrExecuteAssembly = unsafe extern "C" fn(
    *mut c_void,
    c_uint,
    c_int,
    *const *const c_char,
    *const c_char,
    *mut c_uint,
) -> c_int;
type CoreClrShutdown = unsafe extern "C" fn(*mut c_void, c_uint) -> c_int;
type CoreClrShutdown2 = unsafe extern "C" fn(*mut c_void, c_uint, *mut c_int) -> c_int;

const E_POINTER: i32 = 0x8000_4003_u32 as i32;

/// A native entry point into a managed static method.
///
/// `T` is the function pointer type of the method, e.g.
/// `unsafe extern "C" fn() -> i32`. The delegate cannot outlive the runtime
/// that created it.
pub struct ManagedDelegate<'clr, T: 'clr> {
    managed_pointer: *mut c_void,
    phantom: PhantomData<&'clr T>,
}

impl<'clr, T> Deref for ManagedDelegate<'clr, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // `create_delegate` only hands out delegates whose `T` is pointer sized.
        unsafe { &*(&self.managed_pointer as *const *mut c_void as *const T) }
    }
}

/// A running CoreCLR instance with one execution domain.
#[derive(Debug)]
pub struct CoreClr {
    library: Library,
    domain_id: c_uint,
    host_handle: *mut c_void,
    running: bool,
}

impl Drop for CoreClr {
    fn drop(&mut self) {
        if self.running {
            if let Err(err) = self.stop() {
                warn!(error = %err, "runtime did not shut down cleanly");
            }
        }
    }
}

impl CoreClr {
    /// Loads the runtime library at `library_path` and creates the
    /// execution domain `domain_name` with `properties`.
    pub fn initialize(
        library_path: &Path,
        exe_path: &str,
        domain_name: &str,
        properties: &DomainProperties,
    ) -> Result<CoreClr> {
        let exe_path_ptr = CString::new(exe_path)?;
        let domain_name_ptr = CString::new(domain_name)?;
        let mut keys = Vec::with_capacity(properties.len());
        let mut values = Vec::with_capacity(properties.len());
        for (key, value) in properties.iter() {
            keys.push(CString::new(key)?);
            values.push(CString::new(value)?);
        }
        let key_ptrs: Vec<*const c_char> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();

        let library = unsafe { Library::new(library_path) }.map_err(|source| Error::LibraryLoad {
            path: library_path.to_path_buf(),
            source,
        })?;
        debug!(path = %library_path.display(), "loaded runtime library");

        let mut host_handle = ptr::null_mut();
        let mut domain_id = 0;
        let result = {
            let initialize: Symbol<CoreClrInitialize> = symbol(&library, "coreclr_initialize")?;
            unsafe {
                initialize(
                    exe_path_ptr.as_ptr(),
                    domain_name_ptr.as_ptr(),
                    key_ptrs.len() as c_int,
                    key_ptrs.as_ptr(),
                    value_ptrs.as_ptr(),
                    &mut host_handle,
                    &mut domain_id,
                )
            }
        };
        check("coreclr_initialize", result)?;
        debug!(domain_id, domain = domain_name, "runtime initialized");

        Ok(CoreClr {
            library,
            domain_id,
            host_handle,
            running: true,
        })
    }

    pub fn domain_id(&self) -> u32 {
        self.domain_id
    }

    /// Creates a native callable pointer to a static managed method.
    ///
    /// # Panics
    ///
    /// If `T` is not the size of a pointer.
    pub fn create_delegate<'clr, T: 'clr>(
        &'clr self,
        assembly_name: &str,
        type_name: &str,
        method_name: &str,
    ) -> Result<ManagedDelegate<'clr, T>> {
        assert_eq!(
            mem::size_of::<T>(),
            mem::size_of::<*mut c_void>(),
            "delegate type must be a function pointer"
        );
        let create_delegate: Symbol<CoreClrCreateDelegate> =
            symbol(&self.library, "coreclr_create_delegate")?;
        let assembly_name_ptr = CString::new(assembly_name)?;
        let type_name_ptr = CString::new(type_name)?;
        let method_name_ptr = CString::new(method_name)?;
        let mut delegate_handle = ptr::null_mut();
        let result = unsafe {
            create_delegate(
                self.host_handle,
                self.domain_id,
                assembly_name_ptr.as_ptr(),
                type_name_ptr.as_ptr(),
                method_name_ptr.as_ptr(),
                &mut delegate_handle,
            )
        };
        check("coreclr_create_delegate", result)?;
        if delegate_handle.is_null() {
            return Err(Error::Hresult {
                call: "coreclr_create_delegate",
                code: E_POINTER,
            });
        }
        Ok(ManagedDelegate {
            managed_pointer: delegate_handle,
            phantom: PhantomData,
        })
    }

    /// Runs the entry point of the assembly at `assembly_path` and returns
    /// its exit code.
    pub fn execute_assembly(&self, assembly_path: &str, args: &[String]) -> Result<u32> {
        let execute: Symbol<CoreClrExecuteAssembly> =
            symbol(&self.library, "coreclr_execute_assembly")?;
        let assembly_path_ptr = CString::new(assembly_path)?;
        let args = args
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let arg_ptrs: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        let mut exit_code: c_uint = 0;
        let result = unsafe {
            execute(
                self.host_handle,
                self.domain_id,
                arg_ptrs.len() as c_int,
                arg_ptrs.as_ptr(),
                assembly_path_ptr.as_ptr(),
                &mut exit_code,
            )
        };
        check("coreclr_execute_assembly", result)?;
        Ok(exit_code)
    }

    /// Unloads the domain and stops the runtime, returning the latched exit
    /// code.
    pub fn shutdown(mut self) -> Result<i32> {
        self.stop()
    }

    fn stop(&mut self) -> Result<i32> {
        self.running = false;
        match symbol::<CoreClrShutdown2>(&self.library, "coreclr_shutdown_2") {
            Ok(shutdown) => {
                let mut latched: c_int = 0;
                let result = unsafe { shutdown(self.host_handle, self.domain_id, &mut latched) };
                check("coreclr_shutdown_2", result)?;
                Ok(latched)
            }
            Err(_) => {
                let shutdown: Symbol<CoreClrShutdown> =
                    symbol(&self.library, "coreclr_shutdown")?;
                let result = unsafe { shutdown(self.host_handle, self.domain_id) };
                check("coreclr_shutdown", result)?;
                Ok(0)
            }
        }
    }
}

fn symbol<'lib, T>(library: &'lib Library, name: &'static str) -> Result<Symbol<'lib, T>> {
    unsafe { library.get(name.as_bytes()) }.map_err(|source| Error::MissingExport {
        symbol: name,
        source,
    })
}

fn check(call: &'static str, status: c_int) -> Result<()> {
    if status < 0 {
        Err(Error::Hresult { call, code: status })
    } else {
        Ok(())
    }
}
