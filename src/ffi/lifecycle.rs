//! Simulator creation, destruction, and frame queries.

use std::ffi::{c_char, CStr};

use crate::config::SimulationConfig;
use crate::simulator::FluidSimulator;

/// Creates a simulator with the default configuration.
///
/// # Returns
/// A pointer to a new simulator, or null on failure.
///
/// # Safety
/// The returned pointer must eventually be freed with `vf_destroy()`.
#[no_mangle]
pub extern "C" fn vf_create() -> *mut FluidSimulator {
    into_handle(SimulationConfig::default())
}

/// Creates a simulator from a JSON configuration. Missing keys take their
/// default values.
///
/// # Safety
/// - `json` must be a valid nul-terminated string, or null
/// - The returned pointer must eventually be freed with `vf_destroy()`
///
/// # Returns
/// A pointer to a new simulator, or null if `json` is null, not UTF-8, or
/// not a valid configuration.
#[no_mangle]
pub unsafe extern "C" fn vf_create_with_config(json: *const c_char) -> *mut FluidSimulator {
    if json.is_null() {
        return std::ptr::null_mut();
    }
    let text = match CStr::from_ptr(json).to_str() {
        Ok(text) => text,
        Err(err) => {
            log::error!("configuration is not UTF-8: {}", err);
            return std::ptr::null_mut();
        }
    };
    match SimulationConfig::from_json_str(text) {
        Ok(config) => into_handle(config),
        Err(err) => {
            log::error!("rejected configuration: {}", err);
            std::ptr::null_mut()
        }
    }
}

fn into_handle(config: SimulationConfig) -> *mut FluidSimulator {
    match FluidSimulator::new(config) {
        Ok(sim) => Box::into_raw(Box::new(sim)),
        Err(err) => {
            log::error!("could not create simulator: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Destroys a simulator and every chunk it owns.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by `vf_create*()`, or null
/// - `ptr` must not be used after this call
#[no_mangle]
pub unsafe extern "C" fn vf_destroy(ptr: *mut FluidSimulator) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

/// Gets the number of frames simulated so far.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The frame counter, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn vf_get_frame(ptr: *const FluidSimulator) -> u64 {
    if ptr.is_null() {
        return 0;
    }
    (*ptr).frame()
}
