//! Lumen Core - Core types and utilities for the Lumen engine
//!
//! This crate provides the foundational types used throughout the engine:
//! - Mathematical primitives (re-exported from glam)
//! - Transform and Color value types shared by components and renderer
//! - Frame clock for per-tick delta time

pub mod time;
pub mod types;

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use time::{ClockConfig, FrameClock};
pub use types::{Color, Transform};
