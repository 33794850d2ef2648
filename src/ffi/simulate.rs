//! Ticking and dispatch control FFI functions.

use crate::dispatch::DispatchOverride;
use crate::simulator::FluidSimulator;

/// Advances the simulation by one frame.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The frame counter after the tick, or 0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn vf_tick(ptr: *mut FluidSimulator, dt: f32, gravity: f32) -> u64 {
    if ptr.is_null() {
        return 0;
    }
    let sim = &mut *ptr;
    sim.tick(dt, gravity);
    sim.frame()
}

/// Forces every awake chunk into one bucket.
/// 0 = none, 1 = cellular, 2 = grid2, 3 = pressure cell.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// 0 on success, -1 if ptr is null or the id is unknown.
#[no_mangle]
pub unsafe extern "C" fn vf_set_dispatch_override(ptr: *mut FluidSimulator, id: u8) -> i32 {
    if ptr.is_null() {
        return -1;
    }
    match DispatchOverride::from_id(id) {
        Some(forced) => {
            (*ptr).set_dispatch_override(forced);
            0
        }
        None => {
            log::error!("unknown dispatch override {}", id);
            -1
        }
    }
}

/// Gets the density scale applied at the end of the last tick.
///
/// # Safety
/// - `ptr` must be a valid pointer to a simulator, or null
///
/// # Returns
/// The ratio, or 0.0 if ptr is null.
#[no_mangle]
pub unsafe extern "C" fn vf_get_normalization_ratio(ptr: *const FluidSimulator) -> f32 {
    if ptr.is_null() {
        return 0.0;
    }
    (*ptr).environment().density.normalization_ratio
}
