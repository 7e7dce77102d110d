// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports
)]
#![doc(test(attr(deny(warnings))))]

//! loomhttp is the connection/pipeline processing core of an HTTP/1.1 server framework: a
//! non-blocking header-boundary detector that lets a small worker pool drive a large number
//! of keep-alive, pipelined TCP connections.
//!
//! The crate deliberately stops at the request header boundary. Everything past that —
//! method/URI/body parsing, routing, templating, TLS — is an external collaborator reached
//! through the single [`handler::RequestHandler`] boundary.
//!
//! ## Pieces
//!
//! - [`acceptor::Acceptor`] accepts sockets and configures them for HTTP keep-alive.
//! - [`pipeline::Pipeline`] owns one accepted socket, its streams, and its attribute bag.
//! - [`scanner::HeaderScanner`] runs the Boyer–Moore search for the CRLFCRLF terminator.
//! - [`poller::Poller`] drives one non-blocking header-read attempt per pipelined request.
//! - [`scheduler::Scheduler`] multiplexes many pollers onto a fixed worker pool with phased
//!   back-off for idle connections.
//! - [`server::Server`] wires the above together behind a [`config::ServerConfig`].
//!
//! ## Example
//!
//! See `demos/demo_server.rs` for a runnable echo-style server built on this core.

pub mod acceptor;
pub mod attributes;
pub mod buffered_output;
pub mod config;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod poller;
pub mod scanner;
pub mod scheduler;
pub mod server;
pub mod stream;
