//! Velocity half of the pipeline: forces, viscosity, projection, transport.

use super::advect::{advect, AdvectScratch, Flow};
use super::{diffuse_field, record, refresh_members, sanitize};
use crate::bounds::{self, Axis, BoundKind};
use crate::chunk::{ChunkStore, FieldKind};
use crate::config::SimulationConfig;
use crate::environment::Environment;
use crate::grid::{index, DIM};
use crate::solver::{kernels, solve, MultigridArena};

const COMPONENTS: [(FieldKind, FieldKind, Axis); 3] = [
    (FieldKind::U, FieldKind::U0, Axis::X),
    (FieldKind::V, FieldKind::V0, Axis::Y),
    (FieldKind::W, FieldKind::W0, Axis::Z),
];

/// Add gravity into the `v0` delta, add every delta into the live velocity,
/// then swap so the summed velocity becomes the source term.
pub fn add_forces(store: &mut ChunkStore, members: &[usize], env: &Environment, config: &SimulationConfig) {
    let backend = config.solver.backend;
    for &idx in members {
        let Some(chunk) = store.get_mut(idx) else {
            continue;
        };
        let f = &mut chunk.fields;
        kernels::add_scaled(backend, &mut f.v0, &env.border_mask, env.gravity);
        kernels::add_scaled(backend, &mut f.u, &f.u0, env.dt);
        kernels::add_scaled(backend, &mut f.v, &f.v0, env.dt);
        kernels::add_scaled(backend, &mut f.w, &f.w0, env.dt);
        for (field, _, _) in COMPONENTS {
            f.swap_scratch(field);
        }
    }
}

/// Implicit viscosity on each component.
pub fn diffuse(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    arena: &mut MultigridArena,
) {
    let a = env.dt * config.viscosity / (env.h * env.h);
    let c = 1.0 + 6.0 * a;
    for (field, scratch, axis) in COMPONENTS {
        diffuse_field(
            store,
            members,
            field,
            scratch,
            BoundKind::Vector(axis),
            a,
            c,
            arena,
            config.solver.diffuse_limits(),
        );
    }
}

/// `div = −0.5·h·(Δu + Δv + Δw)` with central differences, interior only.
pub fn compute_divergence(u: &[f32], v: &[f32], w: &[f32], div: &mut [f32], h: f32, dim: usize) {
    let plane = dim * dim;
    for k in 1..dim - 1 {
        for j in 1..dim - 1 {
            for i in 1..dim - 1 {
                let idx = index(i, j, k, dim);
                div[idx] = -0.5
                    * h
                    * ((u[idx + 1] - u[idx - 1]) + (v[idx + dim] - v[idx - dim]) + (w[idx + plane] - w[idx - plane]));
            }
        }
    }
}

/// Remove the central-difference gradient of `p` from the velocity.
pub fn subtract_gradient(u: &mut [f32], v: &mut [f32], w: &mut [f32], p: &[f32], h: f32, dim: usize) {
    let plane = dim * dim;
    let scale = 0.5 / h;
    for k in 1..dim - 1 {
        for j in 1..dim - 1 {
            for i in 1..dim - 1 {
                let idx = index(i, j, k, dim);
                u[idx] -= scale * (p[idx + 1] - p[idx - 1]);
                v[idx] -= scale * (p[idx + dim] - p[idx - dim]);
                w[idx] -= scale * (p[idx + plane] - p[idx - plane]);
            }
        }
    }
}

/// Make the velocity approximately divergence-free.
///
/// The divergence and the solved potential stay in each chunk's divergence
/// and pressure caches, which neighbors read for their own halos.
pub fn project(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    arena: &mut MultigridArena,
) {
    let h = env.h;

    for &idx in members {
        if let Some(chunk) = store.get_mut(idx) {
            let f = &mut chunk.fields;
            compute_divergence(&f.u, &f.v, &f.w, &mut f.divergence, h, DIM);
        }
    }
    refresh_members(store, members, FieldKind::Divergence, BoundKind::Scalar);

    let limits = config.solver.project_limits();
    for &idx in members {
        if store.get(idx).is_none() {
            continue;
        }
        let mut p = store.take_field(idx, FieldKind::Pressure);
        let div = store.take_field(idx, FieldKind::Divergence);
        p.fill(0.0);

        let stats = {
            let view: &ChunkStore = store;
            bounds::refresh_from(view, idx, &mut p, FieldKind::Pressure, BoundKind::Scalar);
            solve(arena, &mut p, &div, DIM, 1.0, 6.0, limits, |p| {
                bounds::refresh_from(view, idx, p, FieldKind::Pressure, BoundKind::Scalar)
            })
        };
        sanitize(&mut p, f32::INFINITY);

        store.restore_field(idx, FieldKind::Pressure, p);
        store.restore_field(idx, FieldKind::Divergence, div);
        if let Some(chunk) = store.get_mut(idx) {
            let s = &mut chunk.stats;
            record(&mut s.projection_iterations, &mut s.projection_residual, stats);
        }
    }
    refresh_members(store, members, FieldKind::Pressure, BoundKind::Scalar);

    for &idx in members {
        if let Some(chunk) = store.get_mut(idx) {
            let f = &mut chunk.fields;
            subtract_gradient(&mut f.u, &mut f.v, &mut f.w, &f.pressure, h, DIM);
            sanitize(&mut f.u, config.max_velocity);
            sanitize(&mut f.v, config.max_velocity);
            sanitize(&mut f.w, config.max_velocity);
        }
    }
    for (field, _, axis) in COMPONENTS {
        refresh_members(store, members, field, BoundKind::Vector(axis));
    }
}

/// Self-advect the velocity through a frozen copy of itself.
pub fn advect_velocity(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    scratch: &mut AdvectScratch,
) {
    for &idx in members {
        let Some(chunk) = store.get_mut(idx) else {
            continue;
        };
        let f = &mut chunk.fields;
        for (field, _, _) in COMPONENTS {
            f.swap_scratch(field);
        }

        let flow = Flow {
            u: &f.u0,
            v: &f.v0,
            w: &f.w0,
            dt0: env.dt / env.h,
            dim: DIM,
        };
        advect(config.advection, &mut f.u, &f.u0, &flow, scratch);
        advect(config.advection, &mut f.v, &f.v0, &flow, scratch);
        advect(config.advection, &mut f.w, &f.w0, &flow, scratch);

        sanitize(&mut f.u, config.max_velocity);
        sanitize(&mut f.v, config.max_velocity);
        sanitize(&mut f.w, config.max_velocity);
    }
    for (field, _, axis) in COMPONENTS {
        refresh_members(store, members, field, BoundKind::Vector(axis));
    }
}

/// Full velocity step for one frame.
pub fn step(
    store: &mut ChunkStore,
    members: &[usize],
    env: &Environment,
    config: &SimulationConfig,
    arena: &mut MultigridArena,
    scratch: &mut AdvectScratch,
) {
    add_forces(store, members, env, config);
    diffuse(store, members, env, config, arena);
    project(store, members, env, config, arena);
    advect_velocity(store, members, env, config, scratch);
    if config.reproject_after_advection {
        project(store, members, env, config, arena);
    }
}
