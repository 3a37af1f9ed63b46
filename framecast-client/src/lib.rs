//! # framecast-client
//!
//! Command-line streaming client. Captures frames from a test pattern
//! or a raw video pipe, compresses them with zstd and streams them to
//! a framecast ingestion endpoint over a reconnecting TCP session.
//!
//! ## Usage
//!
//! - **Run**: `framecast --config framecast.toml`
//! - **Bootstrap**: `framecast --gen-config > framecast.toml`
//! - **Pipe**: `ffmpeg -i cam.mp4 -f rawvideo -pix_fmt rgb24 - | framecast`
//!   with `source.kind = "raw"`.

pub mod config;
pub mod service;
