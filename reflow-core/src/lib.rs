//! Reflow Core
//!
//! The reactive update and invalidation core of the Reflow UI toolkit.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects) with automatic
//!   dependency tracking and glitch-free batched propagation
//! - Owner scopes that dispose a widget's reactive state with the widget
//! - An invalidation tree that propagates layout and paint requests
//! - A layout cache keyed on constraints
//! - A frame driver that turns pending writes into dirty rectangles
//!
//! # Architecture
//!
//! - `graph`: dependency graph and topological scheduling
//! - `reactive`: runtime, handles, transactions and owners
//! - `invalidation`: widget tree with layout/paint flags
//! - `layout`: geometry, constraints and the measurement cache
//! - `widget`: the `Widget` trait and draw commands
//! - `frame`: the per-frame state machine and renderer seam
//!
//! # Example
//!
//! ```rust
//! use reflow_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//! let count = rt.create_signal(1);
//! let doubled = rt.create_computed(move |rt| Ok(count.get(rt)? * 2));
//!
//! let _log = rt
//!     .create_effect(move |rt| {
//!         println!("doubled = {}", doubled.get(rt)?);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! // Prints "doubled = 10"
//! count.set(&rt, 5).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod graph;
pub mod invalidation;
pub mod layout;
pub mod reactive;
pub mod widget;

pub use config::{Config, FrameConfig, RuntimeConfig};
pub use error::{ConfigError, FrameError, MeasureError, ReactiveError, RemoteClosed, TreeError};
pub use frame::{FrameDriver, FramePhase, FrameReport, Invalidator, RecordingRenderer, Renderer};
pub use graph::NodeId;
pub use invalidation::{InvalidationFlags, InvalidationTree, WidgetId};
pub use layout::{Constraints, Point, Rect, Size};
pub use reactive::{Computed, Effect, OwnerId, Runtime, Signal};
pub use widget::{Capabilities, DrawCommand, DrawList, Focusable, Widget};
