//! Synthetic load generation for a metrics ingestion endpoint.
//!
//! Both generators post JSON samples of the form `{"device_id": ..., "value": ...}` and expect the
//! endpoint to answer with `202 Accepted`. Values are drawn from a *normal* range, with a
//! controllable share of anomalies drawn from an elevated range.
//!
//! - The [`bulk`] generator dispatches a fixed number of requests through a bounded pool of
//!   concurrent requests and reports the achieved throughput against a target.
//! - The [`trickle`] generator sends one request at a time at a fixed pace until it is
//!   interrupted, flagging every n-th sample as an anomaly.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod bulk;
pub mod cli;
pub mod config;
pub mod http;
pub mod observability;
pub mod sample;
pub mod trickle;

pub use crate::http::HttpRemote;
pub use crate::sample::SampleGenerator;
