//! vidshrink - batch HEVC transcoding
//!
//! Walks a folder of videos and re-encodes each one with ffmpeg, picking a
//! hardware HEVC encoder when the host has one and libx265 otherwise.

pub mod batch;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod format;
pub mod logging;
pub mod media;
pub mod output;
