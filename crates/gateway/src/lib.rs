//! Gateway: the JSON-RPC HTTP endpoint in front of the signaling router.
//!
//! Lifecycle:
//! 1. Resolve the bind address from config
//! 2. Bind the listener (failure is fatal)
//! 3. Serve HTTP/1.1 connections under read, write and idle limits
//! 4. Stop accepting on Ctrl-C
//!
//! Room and peer logic lives behind [`SignalRouter`]; this crate only decodes
//! calls, dispatches them through [`MethodTable`] and renders envelopes.

pub mod conn;
pub mod cors;
pub mod methods;
pub mod params;
pub mod proxy;
pub mod render;
pub mod rooms;
pub mod server;
pub mod signal;

pub use {
    conn::{ConnectionLimits, serve},
    methods::{Method, MethodTable},
    rooms::LoopbackRouter,
    server::{AppState, GatewayError, build_gateway_app, start_gateway},
    signal::SignalRouter,
};
