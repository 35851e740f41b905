//! Arfa - local logging of AI agent activity.
//!
//! This crate provides the pieces behind the `arfa` binary:
//!
//! - [`sink::JsonlSink`] - writes classified entries as JSON Lines
//! - [`report`] - reads those logs back and renders session reports

pub mod report;
pub mod sink;
