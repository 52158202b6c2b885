//! NI-DAQmx count-edges channel, bound at runtime from the vendor driver.

use crate::counter::CounterDevice;
use crate::error::CounterError;
use std::ffi::{c_char, c_void, CString};
use tracing::{debug, info};

type TaskHandle = *mut c_void;

type CreateTaskFn = unsafe extern "system" fn(*const c_char, *mut TaskHandle) -> i32;
type CreateCountEdgesChanFn =
    unsafe extern "system" fn(TaskHandle, *const c_char, *const c_char, i32, u32, i32) -> i32;
type TaskFn = unsafe extern "system" fn(TaskHandle) -> i32;
type ReadCounterScalarU32Fn = unsafe extern "system" fn(TaskHandle, f64, *mut u32, *mut u32) -> i32;
type GetErrorStringFn = unsafe extern "system" fn(i32, *mut c_char, u32) -> i32;

const DAQMX_VAL_FALLING: i32 = 10171;
const DAQMX_VAL_COUNT_UP: i32 = 10128;
const READ_TIMEOUT_SECS: f64 = 10.0;
const ERROR_BUFFER_LEN: u32 = 100;

#[cfg(windows)]
pub const DRIVER_LIBRARY: &str = "nicaiu.dll";
#[cfg(not(windows))]
pub const DRIVER_LIBRARY: &str = "libnidaqmx.so";

struct DaqApi {
    create_task: CreateTaskFn,
    create_count_edges_chan: CreateCountEdgesChanFn,
    start_task: TaskFn,
    read_counter_scalar_u32: ReadCounterScalarU32Fn,
    stop_task: TaskFn,
    clear_task: TaskFn,
    get_error_string: GetErrorStringFn,
    // Keeps the function pointers above valid.
    _library: sys::Library,
}

macro_rules! resolve {
    ($lib:expr, $name:literal, $ty:ty) => {{
        let ptr = $lib
            .symbol(concat!($name, "\0"))
            .ok_or(CounterError::MissingSymbol($name))?;
        // Signatures follow NIDAQmx.h.
        unsafe { std::mem::transmute::<*mut c_void, $ty>(ptr) }
    }};
}

impl DaqApi {
    fn load() -> Result<Self, CounterError> {
        let library = sys::Library::open(DRIVER_LIBRARY)?;
        info!(library = DRIVER_LIBRARY, "DAQ driver loaded");
        Ok(Self {
            create_task: resolve!(library, "DAQmxCreateTask", CreateTaskFn),
            create_count_edges_chan: resolve!(
                library,
                "DAQmxCreateCICountEdgesChan",
                CreateCountEdgesChanFn
            ),
            start_task: resolve!(library, "DAQmxStartTask", TaskFn),
            read_counter_scalar_u32: resolve!(
                library,
                "DAQmxReadCounterScalarU32",
                ReadCounterScalarU32Fn
            ),
            stop_task: resolve!(library, "DAQmxStopTask", TaskFn),
            clear_task: resolve!(library, "DAQmxClearTask", TaskFn),
            get_error_string: resolve!(library, "DAQmxGetErrorString", GetErrorStringFn),
            _library: library,
        })
    }

    fn check(&self, call: &'static str, status: i32) -> Result<(), CounterError> {
        if status >= 0 {
            return Ok(());
        }
        let mut buf = vec![0 as c_char; ERROR_BUFFER_LEN as usize];
        let message = unsafe {
            (self.get_error_string)(status, buf.as_mut_ptr(), ERROR_BUFFER_LEN);
            std::ffi::CStr::from_ptr(buf.as_ptr())
        }
        .to_string_lossy()
        .into_owned();
        Err(CounterError::Driver {
            call,
            code: status,
            message,
        })
    }
}

/// Falling-edge counter task on a named port such as `Dev3/ctr0`.
pub struct NiDaqCounter {
    api: DaqApi,
    task: TaskHandle,
    port: String,
    active: bool,
}

impl NiDaqCounter {
    /// Loads the driver, creates the task and starts counting from zero.
    pub fn open(port: &str) -> Result<Self, CounterError> {
        let api = DaqApi::load()?;
        let lines = CString::new(port).map_err(|_| CounterError::InvalidPort(port.to_string()))?;
        let empty = c"";

        let mut task: TaskHandle = std::ptr::null_mut();
        api.check("DAQmxCreateTask", unsafe {
            (api.create_task)(empty.as_ptr(), &mut task)
        })?;

        let mut counter = Self {
            api,
            task,
            port: port.to_string(),
            active: true,
        };
        counter.api.check("DAQmxCreateCICountEdgesChan", unsafe {
            (counter.api.create_count_edges_chan)(
                counter.task,
                lines.as_ptr(),
                empty.as_ptr(),
                DAQMX_VAL_FALLING,
                0,
                DAQMX_VAL_COUNT_UP,
            )
        })?;
        counter
            .api
            .check("DAQmxStartTask", unsafe { (counter.api.start_task)(counter.task) })?;
        info!(port, "DAQ counter started");
        Ok(counter)
    }
}

impl CounterDevice for NiDaqCounter {
    fn read(&mut self) -> Result<u32, CounterError> {
        if !self.active {
            return Err(CounterError::Released);
        }
        let mut value: u32 = 0;
        let status = unsafe {
            (self.api.read_counter_scalar_u32)(
                self.task,
                READ_TIMEOUT_SECS,
                &mut value,
                std::ptr::null_mut(),
            )
        };
        self.api.check("DAQmxReadCounterScalarU32", status)?;
        debug!(value, "DAQ counter read");
        Ok(value)
    }

    fn release(&mut self) -> Result<(), CounterError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let stopped = unsafe { (self.api.stop_task)(self.task) };
        let cleared = unsafe { (self.api.clear_task)(self.task) };
        info!(port = %self.port, "DAQ counter cleared");
        self.api.check("DAQmxStopTask", stopped)?;
        self.api.check("DAQmxClearTask", cleared)
    }

    fn name(&self) -> &str {
        &self.port
    }
}

impl Drop for NiDaqCounter {
    fn drop(&mut self) {
        // A failed open leaves a created task behind; clear it here.
        let _ = CounterDevice::release(self);
    }
}

#[cfg(unix)]
mod sys {
    use super::CounterError;
    use std::ffi::{c_void, CStr, CString};

    pub struct Library(*mut c_void);

    impl Library {
        pub fn open(name: &str) -> Result<Self, CounterError> {
            let unavailable = |reason: String| CounterError::LibraryUnavailable {
                library: name.to_string(),
                reason,
            };
            let c_name = CString::new(name).map_err(|e| unavailable(e.to_string()))?;
            let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW) };
            if handle.is_null() {
                let reason = unsafe {
                    let err = libc::dlerror();
                    if err.is_null() {
                        "dlopen failed".to_string()
                    } else {
                        CStr::from_ptr(err).to_string_lossy().into_owned()
                    }
                };
                return Err(unavailable(reason));
            }
            Ok(Self(handle))
        }

        /// `name` must be NUL terminated.
        pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
            let ptr = unsafe { libc::dlsym(self.0, name.as_ptr().cast()) };
            (!ptr.is_null()).then_some(ptr)
        }
    }

    impl Drop for Library {
        fn drop(&mut self) {
            unsafe {
                libc::dlclose(self.0);
            }
        }
    }
}

#[cfg(windows)]
mod sys {
    use super::CounterError;
    use std::ffi::{c_void, CString};
    use windows::core::PCSTR;
    use windows::Win32::Foundation::{FreeLibrary, HMODULE};
    use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};

    pub struct Library(HMODULE);

    impl Library {
        pub fn open(name: &str) -> Result<Self, CounterError> {
            let unavailable = |reason: String| CounterError::LibraryUnavailable {
                library: name.to_string(),
                reason,
            };
            let c_name = CString::new(name).map_err(|e| unavailable(e.to_string()))?;
            let module = unsafe { LoadLibraryA(PCSTR::from_raw(c_name.as_ptr().cast())) }
                .map_err(|e| unavailable(e.to_string()))?;
            Ok(Self(module))
        }

        /// `name` must be NUL terminated.
        pub fn symbol(&self, name: &str) -> Option<*mut c_void> {
            unsafe { GetProcAddress(self.0, PCSTR::from_raw(name.as_ptr())) }
                .map(|f| f as *mut c_void)
        }
    }

    impl Drop for Library {
        fn drop(&mut self) {
            unsafe {
                let _ = FreeLibrary(self.0);
            }
        }
    }
}
