//! # engine_component
//!
//! Identity and storage primitives shared by the collection subsystem.
//!
//! This crate provides:
//!
//! - [`NameHash`]: FNV-1a 64-bit hashes for paths, message ids and sockets.
//! - [`Entity`] / [`EntityAllocator`]: runtime ids of spawned instances.
//! - [`ComponentPool`] / [`Handle`]: fixed-capacity, generational slot
//!   storage backing every component world.

pub mod entity;
pub mod hash;
pub mod pool;

pub use entity::{Entity, EntityAllocator};
pub use hash::NameHash;
pub use pool::{ComponentPool, Handle, PoolError};
