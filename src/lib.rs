//! # symheap: symbolic heap and path constraints
//!
//! **`symheap`** is the memory and constraint core of a dynamic symbolic execution engine.
//! It models a heap of arrays, lists, maps and sets whose contents, lengths and even object identities
//! may be symbolic, and it keeps the path condition of every execution state in a simplified form.
//!
//! ## Key Features
//!
//! - **Manager-Centric Expressions**: All expressions are created through one [`ExprContext`][crate::expr::ExprContext], which hash-conses nodes so that equal expressions are identical. The context is shared by all states and worker threads of an analysis run.
//! - **Guarded Writes**: Every memory write carries a boolean guard and is folded into the stored value as an `ite`, so one state can describe "written on one branch, untouched on the other".
//! - **Region Trees**: Updates of a collection are kept in a persistent [`RegionTree`][crate::regions::RegionTree], which localizes a read to the writes that may affect it and turns bulk copies into single entries.
//! - **Cheap Forks**: Memory and constraints are persistent maps, so forking an [`ExecutionState`][crate::state::ExecutionState] is a constant-time clone.
//! - **Constraint Stores**: Reference (dis)equalities live in a union-find with clique promotion, signed comparisons in an interval store that keeps the path condition small.
//!
//! ## Basic Usage
//!
//! ```rust
//! use symheap::collections::MapType;
//! use symheap::config::CoreConfig;
//! use symheap::expr::ExprContext;
//! use symheap::state::ExecutionState;
//! use symheap::types::Sort;
//!
//! let ctx = ExprContext::new();
//! let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
//! let ty = MapType::new("Map<int,int>", Sort::bv(32), Sort::bv(32));
//!
//! let m = state.map_new(&ctx, &ty);
//! let k = ctx.mk_const("k", Sort::bv(32));
//! state.map_put(&ctx, &ty, &m, &k, &ctx.mk_bv(1, 32), &ctx.mk_true());
//!
//! // A fresh map holds exactly one entry after one insertion.
//! assert_eq!(state.map_size(&ctx, &ty, &m), ctx.mk_bv(1, 32));
//! assert_eq!(state.map_get(&ctx, &ty, &m, &k), ctx.mk_bv(1, 32));
//! ```
//!
//! ## Core Components
//!
//! - **[`memory`]**: Symbolic collections and the per-state [`Memory`][crate::memory::Memory].
//! - **[`collections`]**: Lists, maps and sets as operations on an execution state.
//! - **[`constraints`]**: The equality, numeric and path constraint stores.
//! - **[`model`]**: Decoding of solver models into concrete, read-only memory views.

pub mod address;
pub mod collections;
pub mod config;
pub mod constraints;
pub mod error;
pub mod eval;
pub mod expr;
pub mod memory;
pub mod model;
pub mod regions;
pub mod solver;
pub mod state;
pub mod types;
pub mod utils;
